//! API Error Types
//!
//! Errors returned by the telemetry API client. Views collapse all of them to
//! "request failed"; the variants exist for logging and for the few places
//! that care (the session gate, tests).

use thiserror::Error;

/// Errors that can occur when talking to the telemetry API
#[derive(Error, Debug)]
pub enum ApiError {
    /// No access token in the session; no request was sent
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Connection refused or host unreachable
    #[error("Telemetry API unavailable")]
    Unavailable,

    /// Request exceeded the configured timeout
    #[error("Request timeout")]
    Timeout,

    /// Transport-level failure
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("API error {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify a reqwest failure the way the rest of the crate reports it
    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_connect() {
            ApiError::Unavailable
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Request(e)
        }
    }

    /// HTTP status, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Missing token or a 401/403 from the server
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::NotAuthenticated)
            || matches!(self.status(), Some(401) | Some(403))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
