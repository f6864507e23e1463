//! Session state shared by every call made through one client.

use crate::error::{ClientError, Result};
use reqwest::Url;
use scaleio_core::Credentials;
use std::fmt;

/// Media type sent in both `Accept` and `Content-Type`.
pub const MEDIA_TYPE_JSON: &str = "application/json";

/// Where the protocol version of a session comes from.
///
/// `Unknown -> Resolved` is the only transition the client makes on its own,
/// the first time a call needs version-qualified headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionState {
    /// Supplied by configuration; never rediscovered
    Pinned(String),
    /// Not yet discovered
    Unknown,
    /// Discovered from the array and cached
    Resolved(String),
}

impl VersionState {
    /// Initial state for an optional configured version.
    pub fn from_config(version: Option<&str>) -> Self {
        match version.map(str::trim) {
            Some(v) if !v.is_empty() => VersionState::Pinned(v.to_string()),
            _ => VersionState::Unknown,
        }
    }

    /// The version string, if one is known.
    pub fn version(&self) -> Option<&str> {
        match self {
            VersionState::Pinned(v) | VersionState::Resolved(v) => Some(v),
            VersionState::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, VersionState::Unknown)
    }
}

/// `application/json`, suffixed with `;version=<v>` once a version is known.
pub fn media_type_for(version: Option<&str>) -> String {
    match version {
        Some(v) => format!("{};version={}", MEDIA_TYPE_JSON, v),
        None => MEDIA_TYPE_JSON.to_string(),
    }
}

/// Normalize a gateway endpoint.
///
/// Trailing slashes and a trailing `/api` segment are removed, so both
/// `https://gw` and `https://gw/api/` address `/api/...` paths the same way.
pub fn normalize_endpoint(endpoint: &str) -> Result<String> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix("/api").unwrap_or(trimmed);
    let trimmed = trimmed.trim_end_matches('/');

    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(ClientError::Config(format!(
            "Endpoint must start with http:// or https://, got '{}'",
            endpoint
        )));
    }
    Url::parse(trimmed)
        .map_err(|e| ClientError::Config(format!("Invalid endpoint '{}': {}", endpoint, e)))?;

    Ok(trimmed.to_string())
}

/// Token, endpoint, credential snapshot and version of one client.
///
/// A session is replaced wholesale by a successful `authenticate`; only the
/// token and the version are ever mutated in place.
#[derive(Clone)]
pub struct Session {
    endpoint: String,
    token: String,
    credentials: Option<Credentials>,
    version: VersionState,
    media_type: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.token.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("token", &token)
            .field("credentials", &self.credentials)
            .field("version", &self.version)
            .field("media_type", &self.media_type)
            .finish()
    }
}

impl Session {
    /// Create an unauthenticated session.
    pub fn new(endpoint: impl Into<String>, version: VersionState) -> Self {
        let media_type = media_type_for(version.version());
        Self {
            endpoint: endpoint.into(),
            token: String::new(),
            credentials: None,
            version,
            media_type,
        }
    }

    /// Create a session for a freshly issued token.
    pub fn authenticated(
        endpoint: impl Into<String>,
        version: VersionState,
        token: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            token: token.into(),
            credentials: Some(credentials),
            ..Self::new(endpoint, version)
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Credentials captured at the last successful authentication.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn version(&self) -> &VersionState {
        &self.version
    }

    /// Value of both the `Accept` and `Content-Type` headers.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn is_authenticated(&self) -> bool {
        !self.token.is_empty()
    }

    pub(crate) fn set_token(&mut self, token: impl Into<String>) {
        self.token = token.into();
    }

    pub(crate) fn set_version(&mut self, version: VersionState) {
        self.media_type = media_type_for(version.version());
        self.version = version;
    }

    /// Absolute URL for a path, which may already be absolute.
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.endpoint, path)
        } else {
            format!("{}/{}", self.endpoint, path)
        }
    }
}
