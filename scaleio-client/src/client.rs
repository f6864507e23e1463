//! Authenticated request executor for the ScaleIO REST API.

use crate::config::ClientConfig;
use crate::decode::{decode_error, decode_json, decode_scalar, discard};
use crate::error::{ClientError, Result};
use crate::session::{normalize_endpoint, Session, VersionState, MEDIA_TYPE_JSON};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Certificate, Client, Method, Response};
use scaleio_core::{find_link, Link};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

/// Bound any client operation by an overall deadline.
///
/// Works for calls without a dedicated `_with_deadline` variant, such as
/// [`ScaleIoClient::authenticate`] or [`ScaleIoClient::discover_version`]:
///
/// ```no_run
/// # use scaleio_client::{with_deadline, ScaleIoClient};
/// # use scaleio_core::Credentials;
/// # use std::time::Duration;
/// # async fn example(client: ScaleIoClient) -> scaleio_client::Result<()> {
/// let credentials = Credentials::new("admin", "Password123");
/// with_deadline(Duration::from_secs(10), client.authenticate(&credentials)).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns [`ClientError::Timeout`] when `deadline` elapses first; the
/// operation is dropped at its current await point.
pub async fn with_deadline<T, F>(deadline: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(deadline, operation)
        .await
        .map_err(|_| ClientError::Timeout(deadline))?
}

/// Client for a ScaleIO / PowerFlex gateway.
///
/// Every resource call goes through [`execute`](Self::execute) or one of its
/// siblings, which:
/// - Resolve the protocol version once, before the first versioned request
/// - Attach the session token and the version-qualified media type
/// - Classify non-2xx responses into [`ClientError`]
/// - Recover from an expired token by logging in again and replaying the
///   request exactly once
///
/// # Retry Logic
///
/// Only an HTTP 401 on a resource call is retried, and only once, with the
/// credentials captured by the last successful
/// [`authenticate`](Self::authenticate). The replay's outcome is returned
/// as-is. Transport failures, other statuses, and decode failures are never
/// retried. There is no backoff.
///
/// Clones share the same session, so a token refreshed by one clone is used
/// by all of them. Concurrent 401s may each log in again; the last successful
/// login wins.
///
/// # Examples
///
/// ```no_run
/// use scaleio_client::{ClientConfig, ScaleIoClient};
/// use scaleio_core::Credentials;
///
/// # async fn example() -> scaleio_client::Result<()> {
/// let config = ClientConfig {
///     endpoint: "https://10.0.0.5/api".to_string(),
///     insecure: true,
///     ..ClientConfig::default()
/// };
/// let client = ScaleIoClient::new(&config)?;
/// client.authenticate(&Credentials::new("admin", "Password123")).await?;
///
/// let systems: Vec<serde_json::Value> = client.get("/api/types/System/instances").await?;
/// println!("{} system(s), API version {}", systems.len(), client.discover_version().await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ScaleIoClient {
    http: Client,
    session: Arc<Mutex<Session>>,
    pinned_version: Option<String>,
    show_http: bool,
}

impl ScaleIoClient {
    /// Create a client from configuration.
    ///
    /// No network call is made; call [`authenticate`](Self::authenticate)
    /// before issuing resource calls.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The endpoint is not an http(s) URL
    /// - The CA bundle cannot be read or parsed
    /// - The HTTP client cannot be created
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let endpoint = normalize_endpoint(&config.endpoint)?;

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent(concat!("scaleio-client/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(config.insecure);

        if config.use_certs {
            if let Some(ref path) = config.ca_cert {
                let pem = std::fs::read(path).map_err(|e| {
                    ClientError::Config(format!(
                        "Failed to read CA bundle {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let cert = Certificate::from_pem(&pem).map_err(|e| {
                    ClientError::Config(format!("Invalid CA bundle {}: {}", path.display(), e))
                })?;
                builder = builder.add_root_certificate(cert);
            }
        }

        let http = builder
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let pinned_version = config
            .version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let session = Session::new(
            endpoint,
            VersionState::from_config(pinned_version.as_deref()),
        );

        Ok(Self {
            http,
            session: Arc::new(Mutex::new(session)),
            pinned_version,
            show_http: config.show_http,
        })
    }

    /// Create a client and log in with the configured credentials, if any.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let client = Self::new(config)?;
        if let Some(credentials) = config.credentials() {
            client.authenticate(&credentials).await?;
        }
        Ok(client)
    }

    /// Create a client from defaults, the config file and `GOSCALEIO_*`
    /// environment variables, logging in when credentials are present.
    pub async fn from_env() -> Result<Self> {
        let config = ClientConfig::builder()
            .with_env_overrides()
            .with_config_file(true)
            .and_then(|builder| builder.build())
            .map_err(|e| ClientError::Config(format!("{:#}", e)))?;

        if config.debug {
            crate::init_tracing(true);
        }

        Self::connect(&config).await
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn pinned_version(&self) -> Option<&str> {
        self.pinned_version.as_deref()
    }

    /// Lock the session; never held across an `.await`.
    pub(crate) fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.lock_session().clone()
    }

    /// Adopt a session obtained elsewhere, e.g. persisted from another client.
    pub fn restore_session(&self, session: Session) {
        *self.lock_session() = session;
    }

    /// Current session token (empty before the first login).
    pub fn token(&self) -> String {
        self.lock_session().token().to_string()
    }

    /// Replace the session token.
    pub fn set_token(&self, token: impl Into<String>) {
        self.lock_session().set_token(token);
    }

    /// Where the session's protocol version currently stands.
    pub fn version_state(&self) -> VersionState {
        self.lock_session().version().clone()
    }

    /// Normalized gateway endpoint.
    pub fn endpoint(&self) -> String {
        self.lock_session().endpoint().to_string()
    }

    /// Run `attempt`, and once more after logging in again if it hit a 401.
    ///
    /// This is the only place a request is ever retried. The second outcome,
    /// success or failure, is returned unchanged.
    pub(crate) async fn with_reauth<F, Fut, T>(&self, attempt: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match attempt().await {
            Err(ClientError::Unauthorized(rejected)) => {
                if !self.reauthenticate().await? {
                    return Err(ClientError::Unauthorized(rejected));
                }
                attempt().await
            }
            outcome => outcome,
        }
    }

    /// Build and send one request, classifying non-2xx responses.
    ///
    /// Headers are read from the session at call time, so a replay picks up a
    /// refreshed token.
    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
        versioned: bool,
    ) -> Result<Response> {
        let (url, token, media_type) = {
            let session = self.lock_session();
            let media_type = if versioned {
                session.media_type().to_string()
            } else {
                MEDIA_TYPE_JSON.to_string()
            };
            (session.resolve_url(path), session.token().to_string(), media_type)
        };

        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(ACCEPT, &media_type)
            .header(CONTENT_TYPE, &media_type);
        if !token.is_empty() {
            request = request.basic_auth("", Some(&token));
        }
        if let Some(bytes) = body {
            if self.show_http {
                debug!(%method, %url, body = %String::from_utf8_lossy(bytes), "request body");
            }
            request = request.body(bytes.to_vec());
        }

        debug!(%method, %url, accept = %media_type, "sending request");
        let response = request.send().await.map_err(ClientError::Transport)?;
        let status = response.status();
        debug!(%method, %url, status = status.as_u16(), "received response");

        if status.is_success() {
            Ok(response)
        } else {
            Err(decode_error(response).await)
        }
    }

    async fn attempt_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
    ) -> Result<T> {
        let response = self.send_once(method, path, body, true).await?;
        decode_json(response, path).await
    }

    pub(crate) async fn attempt_scalar(
        &self,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
        versioned: bool,
    ) -> Result<String> {
        let response = self.send_once(method, path, body, versioned).await?;
        let value = decode_scalar(response).await?;
        if self.show_http {
            debug!(%path, %value, "scalar response");
        }
        Ok(value)
    }

    async fn attempt_discard(
        &self,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
    ) -> Result<()> {
        let response = self.send_once(method, path, body, true).await?;
        discard(response).await
    }

    /// Resolve the protocol version if it is still unknown.
    async fn ensure_version(&self) -> Result<()> {
        let unknown = self.lock_session().version().is_unknown();
        if unknown {
            trace!("version unknown, discovering before first request");
            self.discover_version().await?;
        }
        Ok(())
    }

    /// Serialize a payload once; every attempt sends a copy of the buffer.
    fn encode_body<B: Serialize + ?Sized>(body: Option<&B>) -> Result<Option<Vec<u8>>> {
        body.map(serde_json::to_vec)
            .transpose()
            .map_err(ClientError::Serialization)
    }

    /// Issue a request and decode its JSON response into `T`.
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP verb
    /// * `path` - Absolute URL, or path relative to the endpoint
    /// * `body` - Optional JSON payload
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The array answers with a non-2xx status ([`ClientError::Api`]), or
    ///   with 401 again after re-authenticating ([`ClientError::Unauthorized`])
    /// - The connection fails ([`ClientError::Transport`])
    /// - The success body is not a valid `T` ([`ClientError::Decode`])
    pub async fn execute<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = Self::encode_body(body)?;
        self.ensure_version().await?;

        self.with_reauth(|| self.attempt_json(method.clone(), path, payload.as_deref()))
            .await
    }

    /// Issue a request whose response is a bare string.
    pub async fn execute_scalar<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<String>
    where
        B: Serialize + ?Sized,
    {
        let payload = Self::encode_body(body)?;
        self.ensure_version().await?;

        self.with_reauth(|| self.attempt_scalar(method.clone(), path, payload.as_deref(), true))
            .await
    }

    /// Issue a request whose response body is ignored (actions, deletes).
    pub async fn execute_discard<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let payload = Self::encode_body(body)?;
        self.ensure_version().await?;

        self.with_reauth(|| self.attempt_discard(method.clone(), path, payload.as_deref()))
            .await
    }

    /// [`execute`](Self::execute) bounded by an overall deadline.
    ///
    /// The deadline covers version discovery, the first attempt, the login,
    /// and the replay together.
    pub async fn execute_with_deadline<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        deadline: Duration,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        with_deadline(deadline, self.execute(method, path, body)).await
    }

    /// [`execute_scalar`](Self::execute_scalar) bounded by an overall deadline.
    pub async fn execute_scalar_with_deadline<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        deadline: Duration,
    ) -> Result<String>
    where
        B: Serialize + ?Sized,
    {
        with_deadline(deadline, self.execute_scalar(method, path, body)).await
    }

    /// [`execute_discard`](Self::execute_discard) bounded by an overall deadline.
    pub async fn execute_discard_with_deadline<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        deadline: Duration,
    ) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        with_deadline(deadline, self.execute_discard(method, path, body)).await
    }

    /// `GET` a JSON resource.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute::<(), T>(Method::GET, path, None).await
    }

    /// `GET` a bare string.
    pub async fn get_scalar(&self, path: &str) -> Result<String> {
        self.execute_scalar::<()>(Method::GET, path, None).await
    }

    /// `POST` a JSON payload and decode the JSON response.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(Method::POST, path, Some(body)).await
    }

    /// `PUT` a JSON payload and decode the JSON response.
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(Method::PUT, path, Some(body)).await
    }

    /// `DELETE` a resource, ignoring the response body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute_discard::<()>(Method::DELETE, path, None).await
    }

    /// Follow a relation found in a resource body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::LinkNotFound`] without any network call when
    /// `links` has no such relation.
    pub async fn follow_link<T: DeserializeOwned>(&self, links: &[Link], rel: &str) -> Result<T> {
        let link = find_link(links, rel)?;
        self.get(&link.href).await
    }
}
