use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info};

use crate::client::LokiClient;
use crate::error::{LokiError, Result, TransportError};
use crate::tools::{tool_definitions, LokiTools};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "loki-mcp";

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError { code, message }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct CancelParams {
    #[serde(rename = "requestId")]
    request_id: Value,
}

/// Handles one request. Notifications (requests without an id) produce no
/// response.
pub async fn process_request(tools: Arc<LokiTools>, req: RpcRequest) -> Option<RpcResponse> {
    process_request_cancellable(tools, req, std::future::pending()).await
}

/// As [`process_request`], aborting a `tools/call` once `cancel` resolves.
/// A cancelled call produces no response.
pub async fn process_request_cancellable<C>(
    tools: Arc<LokiTools>,
    req: RpcRequest,
    cancel: C,
) -> Option<RpcResponse>
where
    C: Future<Output = ()>,
{
    // No id means a notification: nothing to answer.
    if req.id.is_null() {
        debug!(method = %req.method, "notification");
        return None;
    }

    let method = req.method.clone();
    match method.as_str() {
        "initialize" => Some(handle_initialize(&req)),
        "ping" => Some(RpcResponse::ok(req.id, json!({}))),
        "tools/list" => Some(RpcResponse::ok(
            req.id,
            json!({ "tools": tool_definitions() }),
        )),
        "tools/call" => handle_call(&tools, req, cancel).await,
        _ => Some(RpcResponse::err(
            req.id,
            METHOD_NOT_FOUND,
            format!("method not found: {method}"),
        )),
    }
}

fn handle_initialize(req: &RpcRequest) -> RpcResponse {
    RpcResponse::ok(
        req.id.clone(),
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        }),
    )
}

async fn handle_call<C>(tools: &LokiTools, req: RpcRequest, cancel: C) -> Option<RpcResponse>
where
    C: Future<Output = ()>,
{
    let params: CallParams = match serde_json::from_value(req.params) {
        Ok(p) => p,
        Err(e) => {
            return Some(RpcResponse::err(
                req.id,
                INVALID_PARAMS,
                format!("invalid params: {e}"),
            ))
        }
    };

    debug!(tool = %params.name, "tools/call");
    match LokiClient::cancellable(tools.call(&params.name, params.arguments), cancel).await {
        Ok(value) => Some(RpcResponse::ok(req.id, tool_success(value))),
        Err(LokiError::Transport(TransportError::Cancelled)) => {
            info!(tool = %params.name, "tool call cancelled");
            None
        }
        Err(e) => {
            error!(tool = %params.name, error = %e, "tool call failed");
            Some(RpcResponse::ok(req.id, tool_failure(&e)))
        }
    }
}

fn tool_success(value: Value) -> Value {
    let text = serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": value,
        "isError": false
    })
}

fn tool_failure(err: &LokiError) -> Value {
    json!({
        "content": [{ "type": "text", "text": err.to_string() }],
        "isError": true
    })
}

type InFlight = Arc<Mutex<HashMap<String, oneshot::Sender<()>>>>;

/// Serves newline-delimited JSON-RPC over stdin/stdout until stdin closes.
pub async fn run_stdio(tools: Arc<LokiTools>) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin).lines();

    let (tx, mut rx) = mpsc::unbounded_channel::<RpcResponse>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(resp) = rx.recv().await {
            write_response(&mut stdout, &resp).await?;
        }
        Ok::<_, LokiError>(())
    });

    let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));
    info!("serving MCP over stdio");

    while let Some(line) = reader.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let req: RpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.send(RpcResponse::err(
                    Value::Null,
                    PARSE_ERROR,
                    format!("parse error: {e}"),
                ));
                continue;
            }
        };

        if req.method == "notifications/cancelled" {
            cancel_in_flight(&in_flight, &req.params).await;
            continue;
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let key = req.id.to_string();
        let tracked = req.method == "tools/call" && !req.id.is_null();
        if tracked {
            in_flight.lock().await.insert(key.clone(), cancel_tx);
        }

        let tools = tools.clone();
        let tx = tx.clone();
        let in_flight = in_flight.clone();
        tokio::spawn(async move {
            let cancel = async move {
                if cancel_rx.await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            let resp = process_request_cancellable(tools, req, cancel).await;
            if tracked {
                in_flight.lock().await.remove(&key);
            }
            if let Some(resp) = resp {
                let _ = tx.send(resp);
            }
        });
    }

    drop(tx);
    writer
        .await
        .map_err(|e| LokiError::Io(std::io::Error::other(e)))??;
    Ok(())
}

async fn cancel_in_flight(in_flight: &InFlight, params: &Value) {
    let Ok(p) = serde_json::from_value::<CancelParams>(params.clone()) else {
        return;
    };
    if let Some(cancel) = in_flight.lock().await.remove(&p.request_id.to_string()) {
        let _ = cancel.send(());
    }
}

async fn write_response<W>(out: &mut W, resp: &RpcResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = serde_json::to_string(resp)?;
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}
