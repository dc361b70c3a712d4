//! Configuration Management
//!
//! [`ClientConfig`] configures a [`Client`](crate::Client); [`CliConfig`] is the
//! persisted YAML file used by the `atlasclient` binary.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the server URL
pub const ENV_URL: &str = "ATLAS_URL";
/// Environment variable overriding the username
pub const ENV_USERNAME: &str = "ATLAS_USERNAME";
/// Environment variable overriding the password
pub const ENV_PASSWORD: &str = "ATLAS_PASSWORD";

/// Configuration for the Atlas client.
///
/// The `Debug` implementation masks the password.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the Atlas server (e.g. "http://localhost:21000")
    pub base_url: String,
    /// Basic-auth username
    pub username: Option<String>,
    /// Basic-auth password
    pub password: Option<String>,
    /// Request timeout (default: 30 seconds)
    pub timeout: Duration,
    /// Whether to verify TLS certificates (default: true)
    pub tls_verify: bool,
    /// User-Agent header value
    pub user_agent: String,
    /// Server version, e.g. "2.1.0". Resources newer than this are refused.
    pub server_version: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:21000".to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
            tls_verify: true,
            user_agent: format!("atlasclient/{}", env!("CARGO_PKG_VERSION")),
            server_version: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***REDACTED***"))
            .field("timeout", &self.timeout)
            .field("tls_verify", &self.tls_verify)
            .field("user_agent", &self.user_agent)
            .field("server_version", &self.server_version)
            .finish()
    }
}

impl ClientConfig {
    /// Minimum allowed timeout value.
    pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);

    /// Create a new configuration builder.
    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder::new(base_url)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(ClientError::Config("base_url cannot be empty".to_string()));
        }

        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| ClientError::Config(format!("Invalid base_url: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "base_url must be http or https, got '{}'",
                parsed.scheme()
            )));
        }

        if self.password.is_some() && self.username.is_none() {
            return Err(ClientError::Config(
                "password given without a username".to_string(),
            ));
        }

        if self.timeout < Self::MIN_TIMEOUT {
            return Err(ClientError::Config(format!(
                "timeout ({:?}) must be >= {:?}",
                self.timeout,
                Self::MIN_TIMEOUT
            )));
        }

        if let Some(version) = &self.server_version {
            if parse_version(version).is_none() {
                return Err(ClientError::Config(format!(
                    "server_version '{}' is not a dotted version",
                    version
                )));
            }
        }

        Ok(())
    }

    /// Base URL without a trailing slash
    pub fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Parse "2.1.0" into comparable numeric parts
pub(crate) fn parse_version(version: &str) -> Option<Vec<u64>> {
    version
        .trim()
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// Compare dotted versions, treating missing trailing parts as zero
/// ("2.2" == "2.2.0")
pub(crate) fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    let (mut a, mut b) = (parse_version(a)?, parse_version(b)?);
    let len = a.len().max(b.len());
    a.resize(len, 0);
    b.resize(len, 0);
    Some(a.cmp(&b))
}

/// Builder for client configuration.
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: ClientConfig {
                base_url: base_url.into(),
                ..Default::default()
            },
        }
    }

    /// Set basic-auth credentials.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set whether to verify TLS certificates.
    pub fn tls_verify(mut self, verify: bool) -> Self {
        self.config.tls_verify = verify;
        self
    }

    /// Set a custom User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Declare the server version, enabling the per-resource version gate.
    pub fn server_version(mut self, version: impl Into<String>) -> Self {
        self.config.server_version = Some(version.into());
        self
    }

    /// Build the configuration, validating all settings.
    pub fn build(self) -> Result<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Persisted CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CliConfig {
    /// Atlas server URL
    #[serde(default)]
    pub url: Option<String>,
    /// Basic-auth username
    #[serde(default)]
    pub username: Option<String>,
    /// Request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Server version for the version gate
    #[serde(default)]
    pub server_version: Option<String>,
}

impl CliConfig {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("atlasclient").join("config.yaml"))
    }

    /// Load configuration from disk, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &std::path::Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_yaml::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Get effective URL (CLI > env > config > default)
    pub fn effective_url(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| std::env::var(ENV_URL).ok())
            .or_else(|| self.url.clone())
            .unwrap_or_else(|| ClientConfig::default().base_url)
    }

    /// Get effective username (CLI > env > config)
    pub fn effective_username(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string)
            .or_else(|| std::env::var(ENV_USERNAME).ok())
            .or_else(|| self.username.clone())
    }

    /// Password is never persisted; env only
    pub fn effective_password(&self) -> Option<String> {
        std::env::var(ENV_PASSWORD).ok()
    }

    /// Build a validated client configuration
    pub fn to_client_config(
        &self,
        url: Option<&str>,
        username: Option<&str>,
    ) -> Result<ClientConfig> {
        let mut builder = ClientConfig::builder(self.effective_url(url));
        if let Some(user) = self.effective_username(username) {
            builder = builder.basic_auth(user, self.effective_password().unwrap_or_default());
        }
        if let Some(secs) = self.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(version) = &self.server_version {
            builder = builder.server_version(version.clone());
        }
        builder.build()
    }
}
