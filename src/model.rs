use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Label set of a stream or metric series. Ordered so serialized output is stable.
pub type LabelSet = BTreeMap<String, String>;

/// Treats an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Response of `/loki/api/v1/query_range`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub status: String,
    pub data: QueryData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryData {
    #[serde(rename = "resultType")]
    pub result_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub result: Vec<StreamResult>,
}

/// One entry of a query result: a log stream (`stream`) or an aggregated
/// series (`metric`), never both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<LabelSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<LabelSet>,
    /// Raw `[timestamp, value]` pairs. Log streams send string nanoseconds,
    /// matrix results send numeric seconds. Kept untyped so one malformed
    /// entry cannot fail the whole response.
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: Vec<Value>,
}

impl StreamResult {
    /// Stream labels, falling back to metric labels.
    pub fn labels(&self) -> Option<&LabelSet> {
        self.stream.as_ref().or(self.metric.as_ref())
    }

    /// `[timestamp, value]` pairs coerced to strings. Entries that are not
    /// arrays, are shorter than two elements, or hold anything but strings
    /// and numbers are skipped.
    pub fn get_values(&self) -> Vec<[String; 2]> {
        self.values
            .iter()
            .filter_map(Value::as_array)
            .filter(|entry| entry.len() >= 2)
            .filter_map(|entry| Some([coerce_scalar(&entry[0])?, coerce_scalar(&entry[1])?]))
            .collect()
    }
}

fn coerce_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Response of `/loki/api/v1/labels` and `/loki/api/v1/label/{name}/values`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelsResponse {
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<String>,
}

/// Response of `/loki/api/v1/series`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesResponse {
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<LabelSet>,
}

/// Response of `/loki/api/v1/index/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub status: String,
    pub data: StatsData,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsData {
    #[serde(default)]
    pub streams: u64,
    #[serde(default)]
    pub chunks: u64,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub entries: u64,
}

/// Error body Loki sends with 4xx/5xx statuses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub status: String,
    #[serde(rename = "errorType", default)]
    pub error_type: String,
    #[serde(default)]
    pub error: String,
}
