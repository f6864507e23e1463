//! Login and protocol version discovery.

use crate::client::ScaleIoClient;
use crate::decode::{decode_error, decode_token};
use crate::error::{ClientError, Result};
use crate::session::{Session, VersionState, MEDIA_TYPE_JSON};
use regex::Regex;
use reqwest::header::ACCEPT;
use reqwest::Method;
use scaleio_core::{ApiError, Credentials};
use std::sync::LazyLock;
use tracing::{debug, info};

/// Path of the credential exchange.
pub const LOGIN_PATH: &str = "/api/login";

/// Path of the version scalar.
pub const VERSION_PATH: &str = "/api/version";

/// Leading `major.minor` of a build string such as `4.6.0.0`.
static VERSION_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+\.\d+)").expect("Invalid version prefix regex"));

/// Reduce a raw version string to its `major.minor` prefix.
///
/// Strings without a dotted numeric prefix are returned unchanged.
pub fn extract_version_prefix(raw: &str) -> String {
    VERSION_PREFIX_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| raw.to_string(), |m| m.as_str().to_string())
}

impl ScaleIoClient {
    /// Log in and start a new session.
    ///
    /// The previous session is discarded: the new one holds the issued token,
    /// a snapshot of `credentials` (used later to recover from an expired
    /// token), and the configured version. When no version is pinned it is
    /// discovered right away, and a discovery failure fails the whole call.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Either credential field is empty
    /// - The array rejects the credentials ([`ClientError::AuthenticationFailed`])
    /// - The login or version call fails in transport or with another status
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<String> {
        credentials.validate().map_err(ClientError::InvalidInput)?;

        let token = self.login(credentials).await?;

        {
            let mut session = self.lock_session();
            let endpoint = session.endpoint().to_string();
            *session = Session::authenticated(
                endpoint,
                VersionState::from_config(self.pinned_version()),
                token.clone(),
                credentials.clone(),
            );
        }
        info!(user = %credentials.username, "authenticated");

        self.discover_version().await?;

        Ok(token)
    }

    /// Protocol version of the session, discovered at most once.
    ///
    /// Returns the pinned or cached version without network I/O. Otherwise
    /// fetches the version scalar, keeps its `major.minor` prefix, and caches
    /// it until the next [`authenticate`](Self::authenticate).
    pub async fn discover_version(&self) -> Result<String> {
        let cached = self.lock_session().version().version().map(str::to_string);
        if let Some(version) = cached {
            return Ok(version);
        }

        let raw = self
            .with_reauth(|| self.attempt_scalar(Method::GET, VERSION_PATH, None, false))
            .await?;
        let version = extract_version_prefix(&raw);
        info!(version = %version, raw = %raw, "resolved API version");

        self.lock_session()
            .set_version(VersionState::Resolved(version.clone()));

        Ok(version)
    }

    /// One Basic-auth credential exchange, returning the issued token.
    async fn login(&self, credentials: &Credentials) -> Result<String> {
        let url = self.lock_session().resolve_url(LOGIN_PATH);
        debug!(%url, user = %credentials.username, "logging in");

        let response = self
            .http()
            .get(&url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .header(ACCEPT, MEDIA_TYPE_JSON)
            .send()
            .await
            .map_err(ClientError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            // A 401 here means bad credentials, not an expired session
            return Err(match decode_error(response).await {
                ClientError::Unauthorized(err) => ClientError::AuthenticationFailed(err),
                other => other,
            });
        }

        let token = decode_token(response).await?;
        if token.is_empty() {
            return Err(ClientError::AuthenticationFailed(ApiError::new(
                status.as_u16(),
                "login returned an empty token",
            )));
        }
        Ok(token)
    }

    /// Replace the session token using the last captured credentials.
    ///
    /// Returns `Ok(false)` when the client never authenticated, in which case
    /// there is nothing to log in with.
    pub(crate) async fn reauthenticate(&self) -> Result<bool> {
        let credentials = self.lock_session().credentials().cloned();
        let Some(credentials) = credentials else {
            debug!("no captured credentials, not re-authenticating");
            return Ok(false);
        };

        info!(user = %credentials.username, "session token rejected, re-authenticating");
        let token = self.login(&credentials).await?;
        self.lock_session().set_token(token);

        Ok(true)
    }
}
