//! Counter store contract.

use async_trait::async_trait;

use crate::error::BackendError;

/// A store that can atomically bump a counter.
///
/// Implementations must be safe to call concurrently for the same key and
/// for different keys. The limiter holds no counts of its own; the store is
/// the source of truth.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Add one to the counter stored under `key`, creating it at 1 if absent,
    /// and return the resulting value.
    ///
    /// `ttl_secs` is how long the key should stay retrievable. Stores without
    /// expiry may ignore it and rely on eviction instead. On any failure the
    /// call errors; it never returns a partial or estimated count.
    async fn increment(&self, key: &str, ttl_secs: u64) -> Result<u64, BackendError>;
}

/// Convert a raw reply from a remote store into a counter value.
///
/// Stores report counters as signed integers; a negative value means the key
/// holds something that is not one of our counters.
#[cfg_attr(
    not(any(feature = "redis-store", feature = "fred-store")),
    allow(dead_code)
)]
pub(crate) fn counter_from_reply(reply: i64) -> Result<u64, BackendError> {
    u64::try_from(reply).map_err(|_| BackendError::InvalidCounter(reply))
}

/// Clamp a TTL hint into the signed seconds remote stores expect.
#[cfg_attr(
    not(any(feature = "redis-store", feature = "fred-store")),
    allow(dead_code)
)]
pub(crate) fn expiry_secs(ttl_secs: u64) -> i64 {
    i64::try_from(ttl_secs).unwrap_or(i64::MAX)
}
