//! API error taxonomy
//!
//! Every failure the transport can surface is one of these variants. The retry
//! loop inspects [`ApiError::is_retryable`] instead of matching on the source
//! error type.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The connection could not be established or was interrupted
    #[error("Cannot reach the server: {0}")]
    Connectivity(String),

    /// No response within the configured request timeout
    #[error("The server did not answer within {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The server explicitly rejected the request
    #[error("{message}")]
    Application { status: u16, message: String },

    /// 2xx response whose body is not the expected JSON shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ApiError {
    /// Transient failures are retried by the transport; everything else is
    /// handed straight back to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Connectivity(_) | ApiError::Timeout(_) | ApiError::Unexpected(_)
        )
    }

    /// HTTP status for application errors
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Application { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the server refused the credential (expired or missing token)
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}
