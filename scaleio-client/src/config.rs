//! Client configuration management
//!
//! Handles loading the connection settings for a gateway from defaults, a
//! TOML file, and `GOSCALEIO_*` environment variables.

use anyhow::{Context, Result};
use scaleio_core::Credentials;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Connection settings for one gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Gateway URL, with or without a trailing `/api`
    pub endpoint: String,

    /// Login user
    pub username: String,

    /// Login password
    pub password: String,

    /// Pinned protocol version (discovered from the array when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Skip TLS certificate verification
    pub insecure: bool,

    /// Trust the CA bundle at `ca_cert` in addition to the built-in roots
    pub use_certs: bool,

    /// PEM bundle used when `use_certs` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Log request and response bodies
    pub show_http: bool,

    /// Install a debug-level tracing subscriber
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://localhost".to_string(),
            username: String::new(),
            password: String::new(),
            version: None,
            insecure: false,
            use_certs: false,
            ca_cert: None,
            timeout: 60,
            show_http: false,
            debug: false,
        }
    }
}

/// Parse the boolean forms accepted in environment variables
fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read client config file {}", path.display()))?;

        toml::from_str(&content).context("Failed to parse client config file")
    }

    /// Save configuration to a TOML file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize client config")?;

        std::fs::write(path, content).context("Failed to write client config file")?;

        Ok(())
    }

    /// Default configuration file path (`<config dir>/scaleio/client.toml`)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("scaleio")
            .join("client.toml")
    }

    /// Login credentials, when both user and password are configured
    pub fn credentials(&self) -> Option<Credentials> {
        if self.username.is_empty() || self.password.is_empty() {
            return None;
        }
        Some(Credentials::new(&self.username, &self.password))
    }

    /// Create a new builder for constructing configuration
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for client configuration with validation and priority chain support
///
/// Priority chain (lowest to highest):
/// 1. Defaults
/// 2. Config file
/// 3. Environment variables
/// 4. Explicit setters
///
/// Setters always overwrite. `with_env_overrides`, `with_config_file` and
/// `with_config_path` only fill fields that are still unset, so call the
/// setters first, then the environment, then the file.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    endpoint: Option<String>,
    username: Option<String>,
    password: Option<String>,
    version: Option<String>,
    insecure: Option<bool>,
    use_certs: Option<bool>,
    ca_cert: Option<PathBuf>,
    timeout: Option<u64>,
    show_http: Option<bool>,
    debug: Option<bool>,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set gateway endpoint (with validation)
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        Self::validate_endpoint(&url)?;
        self.endpoint = Some(url);
        Ok(self)
    }

    /// Set login credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Pin the protocol version (with validation)
    pub fn with_version(mut self, version: impl Into<String>) -> Result<Self> {
        let version = version.into();
        Self::validate_version(&version)?;
        self.version = Some(version);
        Ok(self)
    }

    /// Set TLS verification toggle
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = Some(insecure);
        self
    }

    /// Trust an extra CA bundle
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.use_certs = Some(true);
        self.ca_cert = Some(path.into());
        self
    }

    /// Set timeout (with validation)
    pub fn with_timeout(mut self, timeout: u64) -> Result<Self> {
        Self::validate_timeout(timeout)?;
        self.timeout = Some(timeout);
        Ok(self)
    }

    /// Set body logging flag
    pub fn with_show_http(mut self, show_http: bool) -> Self {
        self.show_http = Some(show_http);
        self
    }

    /// Set debug logging flag
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Load configuration from the default file location
    pub fn with_config_file(self, load_file: bool) -> Result<Self> {
        if !load_file {
            return Ok(self);
        }
        let path = ClientConfig::default_path();
        if !path.exists() {
            return Ok(self);
        }
        self.with_config_path(&path)
    }

    /// Load configuration from an explicit file
    pub fn with_config_path(self, path: &Path) -> Result<Self> {
        let config = ClientConfig::load_from(path)?;
        let builder = self;
        // Only use file values if they weren't already set (preserving priority)
        Ok(Self {
            endpoint: builder.endpoint.or(Some(config.endpoint)),
            username: builder.username.or(Some(config.username)),
            password: builder.password.or(Some(config.password)),
            version: builder.version.or(config.version),
            insecure: builder.insecure.or(Some(config.insecure)),
            use_certs: builder.use_certs.or(Some(config.use_certs)),
            ca_cert: builder.ca_cert.or(config.ca_cert),
            timeout: builder.timeout.or(Some(config.timeout)),
            show_http: builder.show_http.or(Some(config.show_http)),
            debug: builder.debug.or(Some(config.debug)),
        })
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(mut self) -> Self {
        // Only apply env vars if values weren't already set (preserving priority)
        if self.endpoint.is_none() {
            if let Ok(endpoint) = std::env::var("GOSCALEIO_ENDPOINT") {
                // Validate before applying
                if Self::validate_endpoint(&endpoint).is_ok() {
                    self.endpoint = Some(endpoint);
                }
            }
        }

        if self.username.is_none() {
            self.username = std::env::var("GOSCALEIO_USERNAME").ok();
        }

        if self.password.is_none() {
            self.password = std::env::var("GOSCALEIO_PASSWORD").ok();
        }

        if self.version.is_none() {
            if let Ok(version) = std::env::var("GOSCALEIO_VERSION") {
                if Self::validate_version(&version).is_ok() {
                    self.version = Some(version);
                }
            }
        }

        if self.insecure.is_none() {
            if let Ok(insecure) = std::env::var("GOSCALEIO_INSECURE") {
                self.insecure = Some(parse_flag(&insecure));
            }
        }

        if self.use_certs.is_none() {
            if let Ok(use_certs) = std::env::var("GOSCALEIO_USECERTS") {
                self.use_certs = Some(parse_flag(&use_certs));
            }
        }

        if self.ca_cert.is_none() {
            if let Ok(ca_cert) = std::env::var("GOSCALEIO_CACERT") {
                if !ca_cert.is_empty() {
                    self.ca_cert = Some(PathBuf::from(ca_cert));
                }
            }
        }

        if self.timeout.is_none() {
            if let Ok(timeout) = std::env::var("GOSCALEIO_TIMEOUT") {
                if let Ok(timeout) = timeout.parse() {
                    // Validate before applying
                    if Self::validate_timeout(timeout).is_ok() {
                        self.timeout = Some(timeout);
                    }
                }
            }
        }

        if self.show_http.is_none() {
            if let Ok(show_http) = std::env::var("GOSCALEIO_SHOWHTTP") {
                self.show_http = Some(parse_flag(&show_http));
            }
        }

        if self.debug.is_none() {
            if let Ok(debug) = std::env::var("GOSCALEIO_DEBUG") {
                self.debug = Some(parse_flag(&debug));
            }
        }

        self
    }

    /// Build the final configuration with validation
    pub fn build(self) -> Result<ClientConfig> {
        let defaults = ClientConfig::default();

        let endpoint = self.endpoint.unwrap_or(defaults.endpoint);
        let timeout = self.timeout.unwrap_or(defaults.timeout);
        let use_certs = self.use_certs.unwrap_or(defaults.use_certs);

        // Validate final values
        Self::validate_endpoint(&endpoint)?;
        Self::validate_timeout(timeout)?;
        if let Some(ref version) = self.version {
            Self::validate_version(version)?;
        }
        if use_certs && self.ca_cert.is_none() {
            return Err(anyhow::anyhow!(
                "use_certs is set but no CA bundle path was given"
            ));
        }

        Ok(ClientConfig {
            endpoint,
            username: self.username.unwrap_or(defaults.username),
            password: self.password.unwrap_or(defaults.password),
            version: self.version,
            insecure: self.insecure.unwrap_or(defaults.insecure),
            use_certs,
            ca_cert: self.ca_cert,
            timeout,
            show_http: self.show_http.unwrap_or(defaults.show_http),
            debug: self.debug.unwrap_or(defaults.debug),
        })
    }

    /// Validate URL format
    fn validate_endpoint(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(anyhow::anyhow!("Endpoint cannot be empty"));
        }

        // Basic URL validation - must start with http:// or https://
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(anyhow::anyhow!("Endpoint must start with http:// or https://"));
        }

        Ok(())
    }

    /// Validate pinned version
    fn validate_version(version: &str) -> Result<()> {
        if version.trim().is_empty() {
            return Err(anyhow::anyhow!("Version cannot be empty"));
        }
        Ok(())
    }

    /// Validate timeout value
    fn validate_timeout(timeout: u64) -> Result<()> {
        if timeout == 0 {
            return Err(anyhow::anyhow!("Timeout must be greater than 0"));
        }

        if timeout > 300 {
            return Err(anyhow::anyhow!(
                "Timeout must be less than or equal to 300 seconds"
            ));
        }

        Ok(())
    }
}
