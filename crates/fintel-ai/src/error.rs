//! Error types for fintel-ai

use thiserror::Error;

/// Result type alias using fintel-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the reasoning engine
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Request timed out
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Invalid or missing API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Request was aborted
    #[error("Request aborted")]
    Aborted,

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Check if this error is a rate limit / quota exhaustion
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Error::RateLimited { .. } => true,
            Error::Api {
                error_type,
                message,
            } => {
                let et = error_type.to_lowercase();
                let msg = message.to_lowercase();
                et.contains("rate_limit")
                    || et.contains("overloaded")
                    || msg.contains("rate limit")
                    || msg.contains("quota")
                    || msg.contains("too many requests")
                    || msg.contains("overloaded")
                    || msg.contains("529")
            }
            _ => false,
        }
    }

    /// Check if this error is a timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Http(e) => e.is_timeout(),
            Error::Api { message, .. } => message.to_lowercase().contains("timeout"),
            _ => false,
        }
    }

    /// Check if this error looks like a connectivity failure
    pub fn is_connectivity(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_request(),
            Error::Sse(msg) => {
                let m = msg.to_lowercase();
                m.contains("connect") || m.contains("reset") || m.contains("closed")
            }
            _ => false,
        }
    }

    /// Check if this error is a hard cancellation
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }

    /// Check if a retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        if self.is_aborted() {
            return false;
        }
        self.is_rate_limited() || self.is_timeout() || self.is_connectivity()
    }
}
