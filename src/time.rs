use std::sync::OnceLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::error::{LokiError, Result, ResultExt};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)([smhd])$").expect("static regex"))
}

/// Parses `now`, an RFC3339 timestamp, or a relative offset such as `30m` or `7d`.
pub fn parse_time(input: &str) -> Result<DateTime<Utc>> {
    parse_time_at(input, Utc::now())
}

/// Same as [`parse_time`] with an explicit reference instant for `now`.
pub fn parse_time_at(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if input.is_empty() {
        return Err(LokiError::EmptyTimeString);
    }
    if input == "now" {
        return Ok(now);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    let invalid = || LokiError::InvalidTimeFormat {
        input: input.to_string(),
    };
    let caps = relative_re().captures(input).ok_or_else(invalid)?;
    let value: i64 = caps[1].parse().map_err(|_| invalid())?;
    let unit_seconds = match &caps[2] {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => SECONDS_PER_DAY,
    };
    value
        .checked_mul(unit_seconds)
        .and_then(Duration::try_seconds)
        .and_then(|offset| now.checked_sub_signed(offset))
        .ok_or_else(invalid)
}

pub fn parse_time_or_default(input: &str, default: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if input.is_empty() {
        return Ok(default);
    }
    parse_time(input)
}

/// Nanosecond Unix timestamp, the only time encoding Loki accepts here.
pub fn to_unix_nanos(ts: DateTime<Utc>) -> Result<i64> {
    ts.timestamp_nanos_opt().ok_or_else(|| LokiError::InvalidTimeFormat {
        input: ts.to_rfc3339(),
    })
}

/// Resolved `[start, end]` pair for the time-bounded tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Empty fields default to the last hour ending now.
    pub fn resolve(start: &str, end: &str) -> Result<Self> {
        let now = Utc::now();
        let start = parse_time_or_default(start, now - Duration::hours(1))
            .context("invalid start time")?;
        let end = parse_time_or_default(end, now).context("invalid end time")?;
        Ok(Self { start, end })
    }
}
