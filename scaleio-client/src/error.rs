//! Error type for the ScaleIO request core

use scaleio_core::{ApiError, LinkNotFound};
use std::time::Duration;
use thiserror::Error;

/// Every failure the request core can surface.
///
/// Transport, domain, and decode failures are kept apart so callers can
/// react to each differently. Only [`ClientError::Unauthorized`] is ever
/// recovered locally, and only once.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connection refused, DNS or TLS failure
    #[error("HTTP transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Caller-supplied deadline elapsed
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP 401 on a resource call
    #[error("{0}")]
    Unauthorized(ApiError),

    /// Login rejected (bad credentials); never retried
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(ApiError),

    /// Any other non-2xx response
    #[error("{0}")]
    Api(ApiError),

    /// Success response whose body does not match the expected shape
    #[error("Failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Response body could not be read to the end
    #[error("Failed to read response body: {0}")]
    BodyRead(#[source] reqwest::Error),

    /// Request payload could not be encoded
    #[error("Failed to serialize request body: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Relation missing from a resource body
    #[error(transparent)]
    LinkNotFound(#[from] LinkNotFound),

    /// Invalid input or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Client construction errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for request core operations
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// Structured status/message pair, for errors that came from the array.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            ClientError::Unauthorized(err)
            | ClientError::AuthenticationFailed(err)
            | ClientError::Api(err) => Some(err),
            _ => None,
        }
    }

    /// HTTP status of the response that caused the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        self.api_error().map(|err| err.http_status_code)
    }

    /// Whether the executor would treat this as an expired session.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized(_))
    }
}
