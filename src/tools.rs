//! Tool handlers: validate parameters, resolve time ranges, call Loki and
//! shape the result for an agent.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::client::LokiClient;
use crate::error::{LokiError, Result, ResultExt};
use crate::format::{
    format_labels_result, format_query_result, format_series_result, format_stats_result,
    LabelsKind,
};
use crate::model::LabelSet;
use crate::time::TimeRange;

pub const DEFAULT_LIMIT: u32 = 100;
pub const DEFAULT_DIRECTION: &str = "backward";

const READY_MESSAGE: &str = "Loki is ready";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    pub query: String,
    pub start: String,
    pub end: String,
    pub limit: i64,
    pub direction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(rename = "resultType")]
    pub result_type: String,
    pub count: usize,
    pub output: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LabelsParams {
    pub name: Option<String>,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelsResultType {
    LabelNames,
    LabelValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelsResult {
    #[serde(rename = "type")]
    pub kind: LabelsResultType,
    pub count: usize,
    pub labels: Vec<String>,
    pub output: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeriesParams {
    #[serde(rename = "match")]
    pub matchers: Vec<String>,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesResult {
    pub count: usize,
    pub series: Vec<LabelSet>,
    pub output: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatsParams {
    pub query: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResult {
    pub streams: u64,
    pub chunks: u64,
    pub bytes: u64,
    pub entries: u64,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyResult {
    pub ready: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigResult {
    pub config: String,
}

/// The set of Loki tools bound to one client.
#[derive(Debug, Clone)]
pub struct LokiTools {
    client: LokiClient,
}

impl LokiTools {
    pub fn new(client: LokiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &LokiClient {
        &self.client
    }

    pub async fn query(&self, params: QueryParams) -> Result<QueryResult> {
        if params.query.is_empty() {
            return Err(LokiError::QueryRequired);
        }
        let range = TimeRange::resolve(&params.start, &params.end)?;
        let limit = if params.limit <= 0 {
            DEFAULT_LIMIT
        } else {
            u32::try_from(params.limit).unwrap_or(u32::MAX)
        };
        let direction = if params.direction.is_empty() {
            DEFAULT_DIRECTION
        } else {
            params.direction.as_str()
        };

        let resp = self
            .client
            .query_range(&params.query, range.start, range.end, limit, direction)
            .await
            .context("query failed")?;

        Ok(QueryResult {
            output: format_query_result(&resp),
            count: resp.data.result.len(),
            result_type: resp.data.result_type,
        })
    }

    /// Label names, or the values of `name` when given.
    pub async fn labels(&self, params: LabelsParams) -> Result<LabelsResult> {
        let range = TimeRange::resolve(&params.start, &params.end)?;

        let (kind, resp) = match params.name.as_deref().filter(|n| !n.is_empty()) {
            None => (
                LabelsResultType::LabelNames,
                self.client.labels(range.start, range.end).await,
            ),
            Some(name) => (
                LabelsResultType::LabelValues,
                self.client.label_values(name, range.start, range.end).await,
            ),
        };
        let resp = resp.context("labels request failed")?;

        let output = format_labels_result(
            match kind {
                LabelsResultType::LabelNames => LabelsKind::Names,
                LabelsResultType::LabelValues => LabelsKind::Values,
            },
            &resp.data,
        );
        Ok(LabelsResult {
            kind,
            count: resp.data.len(),
            labels: resp.data,
            output,
        })
    }

    pub async fn series(&self, params: SeriesParams) -> Result<SeriesResult> {
        if params.matchers.is_empty() {
            return Err(LokiError::MatchRequired);
        }
        let range = TimeRange::resolve(&params.start, &params.end)?;

        let resp = self
            .client
            .series(&params.matchers, range.start, range.end)
            .await
            .context("series request failed")?;

        Ok(SeriesResult {
            count: resp.data.len(),
            output: format_series_result(&resp.data),
            series: resp.data,
        })
    }

    pub async fn stats(&self, params: StatsParams) -> Result<StatsResult> {
        if params.query.is_empty() {
            return Err(LokiError::QueryRequired);
        }
        let range = TimeRange::resolve(&params.start, &params.end)?;

        let resp = self
            .client
            .stats(&params.query, range.start, range.end)
            .await
            .context("stats request failed")?;

        let data = resp.data;
        Ok(StatsResult {
            streams: data.streams,
            chunks: data.chunks,
            bytes: data.bytes,
            entries: data.entries,
            output: format_stats_result(&data),
        })
    }

    /// Never fails: an unreachable or unready Loki yields `ready: false`.
    pub async fn ready(&self) -> ReadyResult {
        match self.client.ready().await {
            Ok(()) => ReadyResult {
                ready: true,
                message: READY_MESSAGE.to_string(),
            },
            Err(e) => {
                warn!(error = %e, "loki not ready");
                ReadyResult {
                    ready: false,
                    message: e.to_string(),
                }
            }
        }
    }

    pub async fn config(&self) -> Result<ConfigResult> {
        let config = self.client.config().await.context("failed to get config")?;
        Ok(ConfigResult { config })
    }

    /// Dispatches a tool by name with raw JSON arguments and returns the
    /// serialized result.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value> {
        let args = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };
        match name {
            "loki_query" => to_value(self.query(parse_args(args)?).await?),
            "loki_labels" => to_value(self.labels(parse_args(args)?).await?),
            "loki_series" => to_value(self.series(parse_args(args)?).await?),
            "loki_stats" => to_value(self.stats(parse_args(args)?).await?),
            "loki_ready" => to_value(self.ready().await),
            "loki_config" => to_value(self.config().await?),
            _ => Err(LokiError::InvalidRequest(format!("unknown tool: {name}"))),
        }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| LokiError::InvalidRequest(format!("invalid arguments: {e}")))
}

fn to_value<T: Serialize>(result: T) -> Result<Value> {
    Ok(serde_json::to_value(result)?)
}

const TIME_START_DESC: &str = "Start time (RFC3339, 'now', or relative like 1h, 30m, 7d). Default: 1h ago";
const TIME_END_DESC: &str = "End time (RFC3339, 'now', or relative like 1h). Default: now";

/// Tool metadata advertised through `tools/list`.
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "loki_query",
            "description": "Execute a LogQL query against Loki to search and analyze logs",
            "inputSchema": {
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": { "type": "string", "description": "LogQL query string" },
                    "start": { "type": "string", "description": TIME_START_DESC },
                    "end": { "type": "string", "description": TIME_END_DESC },
                    "limit": { "type": "integer", "description": "Maximum entries to return (default 100)" },
                    "direction": {
                        "type": "string",
                        "enum": ["forward", "backward"],
                        "description": "Log order (default backward)"
                    }
                }
            }
        }),
        json!({
            "name": "loki_labels",
            "description": "Get label names or values from Loki. Without 'name' returns all label names; with 'name' returns values for that label",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Label name to get values for" },
                    "start": { "type": "string", "description": TIME_START_DESC },
                    "end": { "type": "string", "description": TIME_END_DESC }
                }
            }
        }),
        json!({
            "name": "loki_series",
            "description": "Get log streams (series) from Loki that match the given label selectors",
            "inputSchema": {
                "type": "object",
                "required": ["match"],
                "properties": {
                    "match": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Series selectors (e.g. {app=\"nginx\"})"
                    },
                    "start": { "type": "string", "description": TIME_START_DESC },
                    "end": { "type": "string", "description": TIME_END_DESC }
                }
            }
        }),
        json!({
            "name": "loki_stats",
            "description": "Get index statistics from Loki for a given log selector",
            "inputSchema": {
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": { "type": "string", "description": "LogQL selector (e.g. {app=\"nginx\"})" },
                    "start": { "type": "string", "description": TIME_START_DESC },
                    "end": { "type": "string", "description": TIME_END_DESC }
                }
            }
        }),
        json!({
            "name": "loki_ready",
            "description": "Check if Loki is ready to accept requests",
            "inputSchema": { "type": "object", "properties": {} }
        }),
        json!({
            "name": "loki_config",
            "description": "Get Loki server configuration (YAML format)",
            "inputSchema": { "type": "object", "properties": {} }
        }),
    ]
}
