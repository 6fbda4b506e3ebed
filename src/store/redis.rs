//! Redis counter store.
//!
//! Counters are bumped with `INCR` and their expiry refreshed with `EXPIRE`
//! in the same round trip, either as a plain pipeline or wrapped in
//! `MULTI`/`EXEC`. Atomicity of the increment itself comes from Redis; no
//! application-side locking is involved.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionInfo, IntoConnectionInfo, RedisResult};
use tracing::{debug, warn};

use crate::config::RedisMode;
use crate::error::BackendError;
use crate::ratelimit::backend::{counter_from_reply, expiry_secs};
use crate::ratelimit::CounterBackend;

/// Counter store backed by a multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    mode: RedisMode,
    timeout: Duration,
}

impl RedisStore {
    /// Connect to the Redis server at `url`, using logical database `database`.
    ///
    /// The connection is verified with a `PING` before returning.
    pub async fn connect(
        url: &str,
        database: i64,
        mode: RedisMode,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::open(connection_info(url, database)?).map_err(|e| {
            warn!(error = %e, "Failed to create Redis client");
            e
        })?;

        let mut connection = ConnectionManager::new(client).await.map_err(|e| {
            warn!(error = %e, "Failed to connect to Redis");
            e
        })?;

        redis::cmd("PING")
            .query_async::<String>(&mut connection)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to ping Redis");
                e
            })?;

        debug!(database = database, mode = ?mode, "Connected to Redis");

        Ok(Self::from_connection(connection, mode, timeout))
    }

    /// Wrap an existing connection manager.
    pub fn from_connection(
        connection: ConnectionManager,
        mode: RedisMode,
        timeout: Duration,
    ) -> Self {
        Self {
            connection,
            mode,
            timeout,
        }
    }
}

#[async_trait]
impl CounterBackend for RedisStore {
    async fn increment(&self, key: &str, ttl_secs: u64) -> Result<u64, BackendError> {
        let mut connection = self.connection.clone();

        let mut pipe = redis::pipe();
        if self.mode == RedisMode::Transaction {
            pipe.atomic();
        }
        pipe.incr(key, 1)
            .expire(key, expiry_secs(ttl_secs))
            .ignore();

        let reply: RedisResult<(i64,)> =
            match tokio::time::timeout(self.timeout, pipe.query_async(&mut connection)).await {
                Ok(reply) => reply,
                Err(_) => return Err(BackendError::Timeout(self.timeout)),
            };

        let (count,) = reply?;
        counter_from_reply(count)
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("mode", &self.mode)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Parse `url` and point it at logical database `database`.
fn connection_info(url: &str, database: i64) -> Result<ConnectionInfo, BackendError> {
    let mut info = url.into_connection_info()?;
    info.redis.db = database;
    Ok(info)
}
