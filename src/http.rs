use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{LokiError, Result};
use crate::mcp::{process_request, RpcRequest};
use crate::tools::LokiTools;

const DEFAULT_HTTP_PORT: u16 = 3000;

type Sessions = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Event>>>>;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
pub struct AppState {
    pub tools: Arc<LokiTools>,
    pub sessions: Sessions,
}

impl AppState {
    pub fn new(tools: Arc<LokiTools>) -> Self {
        Self {
            tools,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }
}

/// Unregisters an SSE session when its event stream is dropped.
struct SessionGuard {
    id: String,
    sessions: Sessions,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(&self.id);
        }
        debug!(session_id = %self.id, "SSE session closed");
    }
}

/// Process-unique: a counter disambiguates connects within one timestamp.
fn new_session_id() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
    let seq = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
    format!("{nanos:x}-{seq:x}")
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

/// Single-shot JSON-RPC: the response is the HTTP body.
async fn mcp_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RpcRequest>, JsonRejection>,
) -> axum::response::Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(e) => {
            return ErrorResponse {
                error: format!("invalid request body: {e}"),
            }
            .into_response()
        }
    };

    match process_request(state.tools.clone(), req).await {
        Some(resp) => (StatusCode::OK, Json(resp)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let session_id = new_session_id();

    let endpoint_url = format!("/message?session_id={session_id}");
    let _ = tx.send(Event::default().event("endpoint").data(endpoint_url));

    if let Ok(mut sessions) = state.sessions.write() {
        sessions.insert(session_id.clone(), tx);
    }
    debug!(%session_id, "SSE session opened");

    let guard = SessionGuard {
        id: session_id,
        sessions: state.sessions.clone(),
    };
    let stream = UnboundedReceiverStream::new(rx).map(move |event| {
        let _session = &guard;
        Ok::<_, axum::Error>(event)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
struct MessageQuery {
    session_id: String,
}

async fn message_handler(
    State(state): State<AppState>,
    Query(q): Query<MessageQuery>,
    Json(req): Json<RpcRequest>,
) -> impl IntoResponse {
    let sender = state
        .sessions
        .read()
        .ok()
        .and_then(|sessions| sessions.get(&q.session_id).cloned());

    let Some(sender) = sender else {
        return StatusCode::NOT_FOUND;
    };

    let tools = state.tools.clone();
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let Some(resp) = process_request(tools, req).await else {
            return;
        };
        let Ok(json_str) = serde_json::to_string(&resp) else {
            return;
        };
        if sender.send(Event::default().event("message").data(json_str)).is_err() {
            warn!(session_id = %q.session_id, "SSE session closed, dropping session");
            if let Ok(mut sessions) = sessions.write() {
                sessions.remove(&q.session_id);
            }
        }
    });
    StatusCode::ACCEPTED
}

async fn health_handler() -> &'static str {
    "ok"
}

pub fn build_router(tools: Arc<LokiTools>) -> Router {
    router(AppState::new(tools))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mcp", post(mcp_handler))
        .route("/sse", get(sse_handler))
        .route("/message", post(message_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

pub async fn serve_http(tools: Arc<LokiTools>, config: &ServerConfig) -> Result<()> {
    let router = build_router(tools);

    let addr = format!(
        "{}:{}",
        config.http_addr,
        config.http_port.unwrap_or(DEFAULT_HTTP_PORT)
    );
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| LokiError::Config(format!("bind {addr} failed: {e}")))?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, router).await?;
    Ok(())
}
