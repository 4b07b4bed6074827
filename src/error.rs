use thiserror::Error;

/// Engine error types
///
/// Validation errors are local: they block the action and never reach the
/// network. Network/HTTP/parse errors come back from the REST client and are
/// surfaced through the session's error field. `Cancelled` is swallowed at
/// the boundary where cancellation is expected (stream switch, teardown).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Filter operator outside the allowed set
    #[error("Invalid filter operator: {0}")]
    InvalidOperator(String),
    /// Custom SQL that is not a SELECT statement
    #[error("Only SELECT queries are allowed")]
    NotSelect,
    /// Free-text search requested before the stream schema loaded
    #[error("Search is unavailable until the stream schema has loaded")]
    SearchUnavailable,
    /// Transport-level failure (timeout, DNS, connection refused, TLS, I/O)
    #[error("Network error: {0}")]
    Network(String),
    /// Non-2xx HTTP response from the server
    #[error("HTTP {code}: {message}")]
    Http { code: u16, message: String },
    /// Malformed server payload
    #[error("Malformed server response: {0}")]
    Parse(String),
    /// Operation superseded by a stream switch or teardown; never user-visible
    #[error("Cancelled")]
    Cancelled,
}

impl EngineError {
    /// Stable machine-distinguishable tag, used by UI and tests to
    /// disambiguate causes without string matching on messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidOperator(_) => "invalid_operator",
            Self::NotSelect => "not_select",
            Self::SearchUnavailable => "search_unavailable",
            Self::Network(_) => "network_error",
            Self::Http { .. } => "http_error",
            Self::Parse(_) => "parse_error",
            Self::Cancelled => "cancelled",
        }
    }

    /// True for errors produced by local validation, before any I/O.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidOperator(_) | Self::NotSelect | Self::SearchUnavailable
        )
    }

    /// User-facing message with stable wording per HTTP status class.
    pub fn user_message(&self) -> String {
        match self {
            Self::Http { code, .. } => match code {
                401 => "Authentication failed. Please sign in again.".to_string(),
                403 => "You don't have permission to access this resource.".to_string(),
                404 => "The requested resource was not found.".to_string(),
                429 => "Too many requests. Please slow down and retry.".to_string(),
                500..=599 => "The server encountered an error. Please try again later.".to_string(),
                code => format!("Request failed with HTTP status {}", code),
            },
            Self::Network(_) => "Cannot reach the server. Check your connection.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Network(format!("request timed out: {}", err));
        }
        if err.is_connect() {
            return Self::Network(format!("connection failed: {}", err));
        }
        if err.is_decode() {
            return Self::Parse(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::Http {
                code: status.as_u16(),
                message: err.to_string(),
            };
        }
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
