use thiserror::Error;

pub type Result<T> = std::result::Result<T, LokiError>;

#[derive(Debug, Error)]
pub enum LokiError {
    #[error("invalid time format: {input} (use RFC3339, 'now', or relative like 1h, 30m, 7d)")]
    InvalidTimeFormat { input: String },

    #[error("empty time string")]
    EmptyTimeString,

    #[error("request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("loki API error: {error_type}: {message}")]
    BackendApi { error_type: String, message: String },

    #[error("loki API error: status {status}: {body}")]
    BackendStatus { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("query parameter is required")]
    QueryRequired,

    #[error("match parameter is required")]
    MatchRequired,

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{context}: {source}")]
    Context {
        context: &'static str,
        #[source]
        source: Box<LokiError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures below the HTTP layer: connect, DNS, TLS, timeout, or a caller
/// abandoning the request.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("request cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for LokiError {
    fn from(e: reqwest::Error) -> Self {
        LokiError::Transport(TransportError::Http(e))
    }
}

impl LokiError {
    pub fn context(self, context: &'static str) -> Self {
        LokiError::Context {
            context,
            source: Box::new(self),
        }
    }

    /// Innermost error once every `Context` layer is stripped.
    pub fn root(&self) -> &LokiError {
        let mut current = self;
        while let LokiError::Context { source, .. } = current {
            current = source;
        }
        current
    }
}

/// Adds operation context to a failed result.
pub trait ResultExt<T> {
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|e| e.context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_wraps_message_and_keeps_root() {
        let err = LokiError::EmptyTimeString.context("invalid start time");
        assert_eq!(err.to_string(), "invalid start time: empty time string");
        assert!(matches!(err.root(), LokiError::EmptyTimeString));
    }

    #[test]
    fn nested_context_reaches_innermost() {
        let err = LokiError::BackendApi {
            error_type: "bad_data".into(),
            message: "invalid query syntax".into(),
        }
        .context("query failed")
        .context("loki_query");
        assert_eq!(
            err.to_string(),
            "loki_query: query failed: loki API error: bad_data: invalid query syntax"
        );
        assert!(matches!(err.root(), LokiError::BackendApi { .. }));
    }
}
