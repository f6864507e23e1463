//! Mock ScaleIO gateway for integration testing
//!
//! Serves the login and version scalars, a few JSON resources, and error
//! bodies, while counting calls and recording the headers each resource call
//! carried.

#![allow(dead_code)]

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use scaleio_client::{ClientConfig, ScaleIoClient};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "Password123";

/// Headers seen on one resource request
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub authorization: String,
    pub accept: String,
    pub content_type: String,
    pub body: String,
}

/// Mock gateway state
#[derive(Debug, Clone)]
pub struct MockArrayState {
    /// Token accepted on resource calls; empty means none is
    pub current_token: Arc<Mutex<String>>,
    /// Password accepted by login
    pub password: Arc<Mutex<String>>,
    /// Raw string served by the version endpoint
    pub raw_version: Arc<Mutex<String>>,
    /// Reject every token, even freshly issued ones
    pub reject_all_tokens: Arc<AtomicBool>,
    /// Delay before answering a login, in milliseconds
    pub login_delay_ms: Arc<AtomicU64>,
    issued_tokens: Arc<AtomicUsize>,
    pub login_calls: Arc<AtomicUsize>,
    pub version_calls: Arc<AtomicUsize>,
    pub resource_calls: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
    pub version_accept: Arc<Mutex<Vec<String>>>,
}

impl Default for MockArrayState {
    fn default() -> Self {
        Self {
            current_token: Arc::new(Mutex::new(String::new())),
            password: Arc::new(Mutex::new(PASSWORD.to_string())),
            raw_version: Arc::new(Mutex::new("4.6.0.0".to_string())),
            reject_all_tokens: Arc::new(AtomicBool::new(false)),
            login_delay_ms: Arc::new(AtomicU64::new(0)),
            issued_tokens: Arc::new(AtomicUsize::new(0)),
            login_calls: Arc::new(AtomicUsize::new(0)),
            version_calls: Arc::new(AtomicUsize::new(0)),
            resource_calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            version_accept: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockArrayState {
    /// Invalidate the current token, as the gateway does after its idle timeout
    pub fn expire_token(&self) {
        self.current_token.lock().unwrap().clear();
    }

    pub fn logins(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn version_reads(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }

    pub fn resource_reads(&self) -> usize {
        self.resource_calls.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// `Authorization` value a client sends for a session token
pub fn token_header(token: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!(":{}", token)))
}

/// Decode `Basic base64(user:pass)`
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "Unauthorized", "httpStatusCode": 401, "errorCode": 0})),
    )
        .into_response()
}

fn token_is_valid(state: &MockArrayState, headers: &HeaderMap) -> bool {
    if state.reject_all_tokens.load(Ordering::SeqCst) {
        return false;
    }
    let current = state.current_token.lock().unwrap().clone();
    match basic_credentials(headers) {
        Some((user, token)) => user.is_empty() && !current.is_empty() && token == current,
        None => false,
    }
}

/// Count and record a resource request, then check its token
fn authorize(
    state: &MockArrayState,
    headers: &HeaderMap,
    path: &str,
    body: &str,
) -> Result<(), Response> {
    state.resource_calls.fetch_add(1, Ordering::SeqCst);
    state.requests.lock().unwrap().push(RecordedRequest {
        path: path.to_string(),
        authorization: header_value(headers, header::AUTHORIZATION),
        accept: header_value(headers, header::ACCEPT),
        content_type: header_value(headers, header::CONTENT_TYPE),
        body: body.to_string(),
    });

    if token_is_valid(state, headers) {
        Ok(())
    } else {
        Err(unauthorized())
    }
}

/// Mock gateway
#[derive(Debug, Default)]
pub struct MockArray {
    state: MockArrayState,
    port: u16,
}

impl MockArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the mock gateway and return its URL (with the `/api` suffix
    /// operators usually configure)
    pub async fn start(mut self) -> Result<(Self, String)> {
        let app = self.create_router();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        self.port = addr.port();

        let endpoint = format!("http://127.0.0.1:{}/api", self.port);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Mock gateway error: {}", e);
            }
        });

        // Give the server a moment to start and verify it's running
        for _ in 0..20 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        Ok((self, endpoint))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &MockArrayState {
        &self.state
    }

    fn create_router(&self) -> Router {
        Router::new()
            .route("/api/login", get(login_handler))
            .route("/api/version", get(version_handler))
            .route("/api/types/System/instances", get(list_systems_handler))
            .route(
                "/api/instances/System-1a2b/relationships/Statistics",
                get(statistics_handler),
            )
            .route("/api/types/Volume/instances", post(create_volume_handler))
            .route(
                "/api/instances/Volume-1/action/removeVolume",
                post(remove_volume_handler),
            )
            .route("/api/instances/System-1a2b/name", get(system_name_handler))
            .route("/api/bad-request", get(bad_request_handler))
            .route("/api/bad-gateway", get(bad_gateway_handler))
            .route("/api/malformed", get(malformed_handler))
            .route("/api/slow", get(slow_handler))
            .with_state(self.state.clone())
    }
}

/// Client for the mock gateway; `version` pins the protocol version
pub fn client_for(endpoint: &str, version: Option<&str>) -> ScaleIoClient {
    let config = ClientConfig {
        endpoint: endpoint.to_string(),
        version: version.map(str::to_string),
        timeout: 5,
        ..ClientConfig::default()
    };
    ScaleIoClient::new(&config).unwrap()
}

pub fn credentials() -> scaleio_core::Credentials {
    scaleio_core::Credentials::new(USERNAME, PASSWORD)
}

// Handler functions

async fn login_handler(State(state): State<MockArrayState>, headers: HeaderMap) -> Response {
    state.login_calls.fetch_add(1, Ordering::SeqCst);
    let delay = state.login_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let expected = state.password.lock().unwrap().clone();
    match basic_credentials(&headers) {
        Some((user, pass)) if user == USERNAME && pass == expected => {
            let n = state.issued_tokens.fetch_add(1, Ordering::SeqCst) + 1;
            let token = format!("token-{}", n);
            *state.current_token.lock().unwrap() = token.clone();
            (StatusCode::OK, format!("\"{}\"\n", token)).into_response()
        }
        _ => unauthorized(),
    }
}

async fn version_handler(State(state): State<MockArrayState>, headers: HeaderMap) -> Response {
    state.version_calls.fetch_add(1, Ordering::SeqCst);
    state
        .version_accept
        .lock()
        .unwrap()
        .push(header_value(&headers, header::ACCEPT));

    if !token_is_valid(&state, &headers) {
        return unauthorized();
    }
    let raw = state.raw_version.lock().unwrap().clone();
    (StatusCode::OK, format!("\"{}\"\n", raw)).into_response()
}

async fn list_systems_handler(State(state): State<MockArrayState>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers, "/api/types/System/instances", "") {
        return denied;
    }
    Json(json!([{
        "id": "1a2b",
        "name": "cluster1",
        "links": [
            {"rel": "self", "href": "/api/instances/System-1a2b"},
            {
                "rel": "/api/System/relationship/Statistics",
                "href": "/api/instances/System-1a2b/relationships/Statistics"
            }
        ]
    }]))
    .into_response()
}

async fn statistics_handler(State(state): State<MockArrayState>, headers: HeaderMap) -> Response {
    let path = "/api/instances/System-1a2b/relationships/Statistics";
    if let Err(denied) = authorize(&state, &headers, path, "") {
        return denied;
    }
    Json(json!({"numOfVolumes": 3, "capacityInUseInKb": 1024})).into_response()
}

async fn create_volume_handler(
    State(state): State<MockArrayState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Err(denied) = authorize(&state, &headers, "/api/types/Volume/instances", &body) {
        return denied;
    }
    Json(json!({"id": "Volume-1"})).into_response()
}

async fn remove_volume_handler(
    State(state): State<MockArrayState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let path = "/api/instances/Volume-1/action/removeVolume";
    if let Err(denied) = authorize(&state, &headers, path, &body) {
        return denied;
    }
    StatusCode::OK.into_response()
}

async fn system_name_handler(State(state): State<MockArrayState>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers, "/api/instances/System-1a2b/name", "") {
        return denied;
    }
    (StatusCode::OK, "\"cluster1\"\n").into_response()
}

async fn bad_request_handler(State(state): State<MockArrayState>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers, "/api/bad-request", "") {
        return denied;
    }
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"message": "bad request", "httpStatusCode": 400, "errorCode": 0})),
    )
        .into_response()
}

async fn bad_gateway_handler(State(state): State<MockArrayState>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers, "/api/bad-gateway", "") {
        return denied;
    }
    (StatusCode::BAD_GATEWAY, "<html>Bad Gateway</html>").into_response()
}

async fn malformed_handler(State(state): State<MockArrayState>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers, "/api/malformed", "") {
        return denied;
    }
    (StatusCode::OK, "{\"id\": ").into_response()
}

async fn slow_handler(State(state): State<MockArrayState>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers, "/api/slow", "") {
        return denied;
    }
    tokio::time::sleep(Duration::from_secs(2)).await;
    Json(json!({})).into_response()
}
