//! Redis/Valkey counter store over a `fred` connection pool.

use std::time::Duration;

use async_trait::async_trait;
use fred::prelude::{Builder, ClientLike, Config, KeysInterface, Pool};
use tracing::debug;

use crate::error::BackendError;
use crate::ratelimit::backend::{counter_from_reply, expiry_secs};
use crate::ratelimit::CounterBackend;

/// Counter store that spreads increments over a pool of connections.
pub struct FredStore {
    pool: Pool,
    timeout: Duration,
}

impl FredStore {
    /// Connect a pool of `pool_size` clients to the server at `url`.
    pub async fn connect(
        url: &str,
        pool_size: usize,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let config = Config::from_url(url)?;
        let pool_size = pool_size.max(1);
        let pool = Builder::from_config(config).build_pool(pool_size)?;
        pool.init().await?;

        debug!(pool_size = pool_size, "Connected fred pool");

        Ok(Self::from_pool(pool, timeout))
    }

    /// Wrap an already initialised pool.
    pub fn from_pool(pool: Pool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl CounterBackend for FredStore {
    async fn increment(&self, key: &str, ttl_secs: u64) -> Result<u64, BackendError> {
        let pipeline = self.pool.next().pipeline();
        let _: () = pipeline.incr(key).await?;
        let _: () = pipeline.expire(key, expiry_secs(ttl_secs), None).await?;

        let reply = tokio::time::timeout(self.timeout, pipeline.all()).await;
        let (count, _): (i64, i64) = match reply {
            Ok(reply) => reply?,
            Err(_) => return Err(BackendError::Timeout(self.timeout)),
        };

        counter_from_reply(count)
    }
}
