//! Error types for Yarl.

use std::time::Duration;
use thiserror::Error;

/// A counter store could not complete an increment.
///
/// Always surfaced to the caller of the limiter; it is never folded into an
/// allow or deny decision.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Redis client errors
    #[cfg(feature = "redis-store")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Fred client errors
    #[cfg(feature = "fred-store")]
    #[error("Fred error: {0}")]
    Fred(#[from] fred::error::Error),

    /// The store did not answer within the configured deadline
    #[error("Counter store timed out after {0:?}")]
    Timeout(Duration),

    /// The store replied with a value that is not a valid counter
    #[error("Bad counter value: {0}")]
    InvalidCounter(i64),

    /// Any other store failure
    #[error("Counter store unavailable: {0}")]
    Unavailable(String),
}

/// Invalid construction parameters, raised before any traffic is served.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Windows must be a positive whole number of seconds
    #[error("Invalid window duration {0:?}: must be a positive whole number of seconds")]
    InvalidWindow(Duration),

    /// The in-memory store needs room for at least one key
    #[error("Invalid capacity {0}: must be at least 1")]
    InvalidCapacity(usize),

    /// The requested store was not compiled in
    #[error("Unsupported backend '{0}': enable the matching cargo feature")]
    UnsupportedBackend(String),

    /// Any other invalid setting
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main error type for Yarl operations.
#[derive(Error, Debug)]
pub enum YarlError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigurationError),

    /// Counter store errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Settings loading errors
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Yarl operations.
pub type Result<T> = std::result::Result<T, YarlError>;
