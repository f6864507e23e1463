//! Response decoding and error classification.
//!
//! Every function here takes the response by value: the body is read to the
//! end exactly once and dropped before returning.

use crate::error::{ClientError, Result};
use reqwest::Response;
use scaleio_core::ApiError;
use serde::de::DeserializeOwned;
use tracing::trace;

/// Strip surrounding whitespace and one layer of double quotes.
///
/// Scalar endpoints (login, version) answer with a bare JSON string literal
/// such as `"4.6"`. This is not a JSON decoder: escapes are left untouched.
pub fn trim_scalar(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('"').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('"').unwrap_or(trimmed);
    trimmed.to_string()
}

/// Map a non-2xx status and its raw body to the matching error variant.
pub fn classify_error(status: u16, body: &str) -> ClientError {
    let err = ApiError::from_body(status, body);
    if err.is_unauthorized() {
        ClientError::Unauthorized(err)
    } else {
        ClientError::Api(err)
    }
}

async fn read_body(response: Response) -> Result<String> {
    let text = response.text().await.map_err(ClientError::BodyRead)?;
    trace!(body = %text, "response body");
    Ok(text)
}

/// Decode a session token issued by login.
///
/// Same trimming as [`decode_scalar`], but only the token length is logged.
pub(crate) async fn decode_token(response: Response) -> Result<String> {
    let text = response.text().await.map_err(ClientError::BodyRead)?;
    let token = trim_scalar(&text);
    trace!(token_len = token.len(), "login response");
    Ok(token)
}

/// Decode a bare string result.
///
/// # Errors
///
/// Returns [`ClientError::BodyRead`] if the body cannot be fully consumed.
pub async fn decode_scalar(response: Response) -> Result<String> {
    let text = read_body(response).await?;
    Ok(trim_scalar(&text))
}

/// Decode a typed JSON document.
///
/// # Errors
///
/// Returns [`ClientError::BodyRead`] if the body cannot be read, or
/// [`ClientError::Decode`] if it does not match `T`.
pub async fn decode_json<T: DeserializeOwned>(response: Response, path: &str) -> Result<T> {
    let text = read_body(response).await?;
    serde_json::from_str(&text).map_err(|source| ClientError::Decode {
        path: path.to_string(),
        source,
    })
}

/// Drain a response whose body carries nothing the caller needs.
pub async fn discard(response: Response) -> Result<()> {
    read_body(response).await.map(|_| ())
}

/// Classify a non-2xx response.
///
/// A body that cannot be read is treated like one that cannot be parsed:
/// the result is a generic error carrying only the status.
pub async fn decode_error(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let text = read_body(response).await.unwrap_or_default();
    classify_error(status, &text)
}
