//! Classifier error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

/// Errors that can occur while calling the classification workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifierError {
    /// TCP/HTTP connection to the workflow endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The workflow endpoint did not respond within the configured timeout.
    #[error("classifier timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the workflow endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body (or its nested `output`) is not the expected shape.
    #[error("malformed classifier response: {reason}")]
    Malformed { reason: String },

    /// SSE stream read or parse error, or a terminal `error` status.
    #[error("stream error: {reason}")]
    StreamError { reason: String },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}

impl ClassifierError {
    /// Whether the workflow could not be reached or refused the request.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ClassifierError::ConnectionFailed { .. }
                | ClassifierError::Timeout { .. }
                | ClassifierError::HttpError { .. }
        )
    }

    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            ClassifierError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }
}
