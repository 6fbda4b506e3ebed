//! Bounded in-process counter store.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::{BackendError, ConfigurationError};
use crate::ratelimit::CounterBackend;

/// Counter store backed by a fixed-size least-recently-used cache.
///
/// State is local to the process and lost on restart. TTL hints are
/// ignored: once the cache is full, the least recently incremented key is
/// evicted, and incrementing it again starts over at 1. Every access goes
/// through one lock.
pub struct MemoryStore {
    cache: Mutex<LruCache<String, u64>>,
}

impl MemoryStore {
    /// Create a store tracking at most `capacity` keys.
    pub fn new(capacity: usize) -> Result<Self, ConfigurationError> {
        let capacity =
            NonZeroUsize::new(capacity).ok_or(ConfigurationError::InvalidCapacity(capacity))?;
        Ok(Self {
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Maximum number of keys held at once.
    pub fn capacity(&self) -> usize {
        self.cache.lock().cap().get()
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Whether no key is held.
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

#[async_trait]
impl CounterBackend for MemoryStore {
    async fn increment(&self, key: &str, _ttl_secs: u64) -> Result<u64, BackendError> {
        let mut cache = self.cache.lock();

        if let Some(count) = cache.get_mut(key) {
            *count += 1;
            return Ok(*count);
        }

        if let Some((evicted, count)) = cache.push(key.to_owned(), 1) {
            trace!(key = %evicted, count = count, "Evicted counter");
        }
        Ok(1)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.lock();
        f.debug_struct("MemoryStore")
            .field("capacity", &cache.cap())
            .field("len", &cache.len())
            .finish()
    }
}
