//! Configuration management for Yarl.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{ConfigurationError, Result, YarlError};
use crate::ratelimit::{Policy, Window};

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "YARL";
/// Separator between nested keys in environment variable names.
pub const ENV_SEPARATOR: &str = "__";

/// Main configuration for the Yarl service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YarlConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Namespace prepended to every counter key
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Requests allowed per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length, e.g. `1m` or `1h`
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,

    /// How request keys are derived
    #[serde(default)]
    pub key: KeyConfig,

    /// Counter store selection
    #[serde(default)]
    pub backend: BackendConfig,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            limit: default_limit(),
            window: default_window(),
            key: KeyConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl RateLimitingConfig {
    /// Validate the limit settings into a policy.
    pub fn policy(&self) -> std::result::Result<Policy, ConfigurationError> {
        let window = Window::try_from(self.window)?;
        Ok(Policy::new(self.prefix.clone(), self.limit, window))
    }
}

fn default_prefix() -> String {
    "rl".to_string()
}

fn default_limit() -> u64 {
    100
}

fn default_window() -> Duration {
    Duration::from_secs(60)
}

/// Which parts of a request identify the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Include the client IP address
    #[serde(default = "default_use_ip")]
    pub use_ip: bool,

    /// Request headers whose values are appended to the key
    #[serde(default)]
    pub headers: Vec<String>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            use_ip: default_use_ip(),
            headers: Vec::new(),
        }
    }
}

fn default_use_ip() -> bool {
    true
}

/// Available counter stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Bounded in-process LRU cache
    #[default]
    Memory,
    /// Redis through a multiplexed connection
    Redis,
    /// Redis or Valkey through a `fred` connection pool
    Fred,
}

/// How the Redis store sends `INCR` and `EXPIRE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedisMode {
    /// Plain pipeline, one round trip
    #[default]
    Pipeline,
    /// `MULTI`/`EXEC` transaction
    Transaction,
}

/// Counter store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Store to use
    #[serde(default)]
    pub kind: BackendKind,

    /// Maximum keys held by the memory store
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Server URL for remote stores
    #[serde(default = "default_url")]
    pub url: String,

    /// Logical database index (redis)
    #[serde(default)]
    pub database: i64,

    /// Increment mode (redis)
    #[serde(default)]
    pub mode: RedisMode,

    /// Connections in the pool (fred)
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Deadline for one remote increment
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            capacity: default_capacity(),
            url: default_url(),
            database: 0,
            mode: RedisMode::default(),
            pool_size: default_pool_size(),
            timeout: default_timeout(),
        }
    }
}

fn default_capacity() -> usize {
    10000
}

fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_pool_size() -> usize {
    4
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

impl YarlConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| YarlError::Config(ConfigurationError::Invalid(e.to_string())))
    }

    /// Load defaults, then the optional YAML file, then `YARL__*` environment
    /// overrides such as `YARL__RATE_LIMITING__LIMIT=50`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("rate_limiting.key.headers"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
