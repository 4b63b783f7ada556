//! Plain-text summaries returned alongside structured tool results.

use std::fmt::Write;

use crate::model::{LabelSet, QueryResponse, StatsData};

const EMPTY_LABELS: &str = "{}";
const BYTES_PER_KB: u64 = 1024;
const BYTES_PER_MB: u64 = BYTES_PER_KB * 1024;
const BYTES_PER_GB: u64 = BYTES_PER_MB * 1024;

/// Whether a labels listing holds label names or the values of one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelsKind {
    Names,
    Values,
}

pub fn format_query_result(resp: &QueryResponse) -> String {
    if resp.data.result.is_empty() {
        return "No results found.".to_string();
    }

    let mut out = String::new();
    for stream in &resp.data.result {
        let _ = writeln!(out, "Stream: {}", format_labels(stream.labels()));
        for [ts, value] in stream.get_values() {
            let _ = writeln!(out, "  {ts} | {value}");
        }
        out.push('\n');
    }
    out
}

pub fn format_labels(labels: Option<&LabelSet>) -> String {
    match labels {
        Some(labels) if !labels.is_empty() => {
            serde_json::to_string(labels).unwrap_or_else(|_| EMPTY_LABELS.to_string())
        }
        _ => EMPTY_LABELS.to_string(),
    }
}

pub fn format_labels_result(kind: LabelsKind, labels: &[String]) -> String {
    if labels.is_empty() {
        return "No labels found.".to_string();
    }

    let mut out = match kind {
        LabelsKind::Names => format!("Found {} label names:\n", labels.len()),
        LabelsKind::Values => format!("Found {} values:\n", labels.len()),
    };
    for label in labels {
        let _ = writeln!(out, "  - {label}");
    }
    out
}

pub fn format_series_result(series: &[LabelSet]) -> String {
    if series.is_empty() {
        return "No series found.".to_string();
    }

    let mut out = format!("Found {} series:\n", series.len());
    for (idx, item) in series.iter().enumerate() {
        let serialized = serde_json::to_string(item).unwrap_or_else(|_| EMPTY_LABELS.to_string());
        let _ = writeln!(out, "  {}. {}", idx + 1, serialized);
    }
    out
}

pub fn format_stats_result(stats: &StatsData) -> String {
    format!(
        "Index Statistics:\n  Streams: {}\n  Chunks: {}\n  Bytes: {}\n  Entries: {}",
        stats.streams,
        stats.chunks,
        format_bytes(stats.bytes),
        stats.entries,
    )
}

/// Scales to the largest binary unit not exceeding the value.
pub fn format_bytes(bytes: u64) -> String {
    match bytes {
        b if b >= BYTES_PER_GB => format!("{:.2} GB", b as f64 / BYTES_PER_GB as f64),
        b if b >= BYTES_PER_MB => format!("{:.2} MB", b as f64 / BYTES_PER_MB as f64),
        b if b >= BYTES_PER_KB => format!("{:.2} KB", b as f64 / BYTES_PER_KB as f64),
        b => format!("{b} B"),
    }
}
