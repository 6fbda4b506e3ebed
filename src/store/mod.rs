//! Counter store implementations.
//!
//! The in-memory store is always available. Remote stores are behind the
//! `redis-store` and `fred-store` features.

mod memory;
#[cfg(feature = "redis-store")]
mod redis;
#[cfg(feature = "fred-store")]
mod fred;

use std::sync::Arc;

use tracing::info;

use crate::config::{BackendConfig, BackendKind};
use crate::error::Result;
#[cfg(not(all(feature = "redis-store", feature = "fred-store")))]
use crate::error::ConfigurationError;
use crate::ratelimit::CounterBackend;

pub use memory::MemoryStore;
#[cfg(feature = "redis-store")]
pub use self::redis::RedisStore;
#[cfg(feature = "fred-store")]
pub use self::fred::FredStore;

/// Build the counter store described by `config`.
pub async fn connect(config: &BackendConfig) -> Result<Arc<dyn CounterBackend>> {
    info!(kind = ?config.kind, "Initializing counter store");

    match config.kind {
        BackendKind::Memory => Ok(Arc::new(MemoryStore::new(config.capacity)?)),

        #[cfg(feature = "redis-store")]
        BackendKind::Redis => {
            let store =
                RedisStore::connect(&config.url, config.database, config.mode, config.timeout)
                    .await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis-store"))]
        BackendKind::Redis => {
            Err(ConfigurationError::UnsupportedBackend("redis".to_string()).into())
        }

        #[cfg(feature = "fred-store")]
        BackendKind::Fred => {
            let store = FredStore::connect(&config.url, config.pool_size, config.timeout).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "fred-store"))]
        BackendKind::Fred => Err(ConfigurationError::UnsupportedBackend("fred".to_string()).into()),
    }
}
