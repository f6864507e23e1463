//! Error types shared by the ScaleIO client and its resource wrappers

use crate::types::ApiErrorBody;
use thiserror::Error;

/// Structured error produced from a non-2xx response.
///
/// Every resource call surfaces this same shape, so callers see a uniform
/// status/message pair regardless of which endpoint rejected them. The
/// `Display` output is the server message, unmodified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    /// HTTP status of the response that carried the error
    pub http_status_code: u16,
    /// Human-readable message from the array
    pub message: String,
    /// Array-specific error code, when the body carried one
    pub error_code: Option<i64>,
}

impl ApiError {
    /// Create an error with only a status and a message.
    pub fn new(http_status_code: u16, message: impl Into<String>) -> Self {
        Self {
            http_status_code,
            message: message.into(),
            error_code: None,
        }
    }

    /// Generic error used when the response body is not the expected error shape.
    pub fn unparseable(http_status_code: u16) -> Self {
        Self::new(
            http_status_code,
            format!("unparseable error response (HTTP {})", http_status_code),
        )
    }

    /// Classify a raw error body received with the given HTTP status.
    ///
    /// The status of the response is authoritative; the `httpStatusCode`
    /// field inside the body is only informational.
    pub fn from_body(http_status_code: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) => Self {
                http_status_code,
                message: parsed.message,
                error_code: parsed.error_code,
            },
            Err(_) => Self::unparseable(http_status_code),
        }
    }

    /// Whether this error is an HTTP 401.
    pub fn is_unauthorized(&self) -> bool {
        self.http_status_code == 401
    }
}

/// A requested link relation was not present in a resource body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Link not found: {rel}")]
pub struct LinkNotFound {
    /// The relation that was looked up
    pub rel: String,
}
