//! ScaleIO Client Library
//!
//! Authenticated request core for the ScaleIO / PowerFlex REST API. Resource
//! wrappers build a path and an optional payload and hand them to
//! [`client::ScaleIoClient`], which owns the session token, negotiates the
//! protocol version, and recovers once from an expired token.
//!
//! ```no_run
//! use scaleio_client::{ClientConfig, ScaleIoClient};
//!
//! # async fn example() -> scaleio_client::Result<()> {
//! let config = ClientConfig::builder()
//!     .with_endpoint("https://10.0.0.5/api")
//!     .and_then(|b| b.with_version("4.5"))
//!     .map(|b| b.with_credentials("admin", "Password123").with_insecure(true))
//!     .and_then(|b| b.build())
//!     .map_err(|e| scaleio_client::ClientError::Config(e.to_string()))?;
//!
//! let client = ScaleIoClient::connect(&config).await?;
//! let version = client.get_scalar("/api/version").await?;
//! println!("Gateway version: {}", version);
//! # Ok(())
//! # }
//! ```

mod auth;

/// Authenticated request executor.
pub mod client;

/// Connection settings and their sources.
pub mod config;

/// Response decoding and error classification.
pub mod decode;

/// Error types.
pub mod error;

/// Session state and endpoint handling.
pub mod session;

pub use auth::{extract_version_prefix, LOGIN_PATH, VERSION_PATH};
pub use client::{with_deadline, ScaleIoClient};
pub use config::{ClientConfig, ConfigBuilder};
pub use error::{ClientError, Result};
pub use session::{Session, VersionState};

/// Install a `tracing` subscriber for the process.
///
/// Uses `debug` level when `debug` is set and `info` otherwise; `RUST_LOG`
/// takes precedence over both. A subscriber already installed by the host
/// application is left in place.
pub fn init_tracing(debug: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
