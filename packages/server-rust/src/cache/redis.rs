//! Redis [`CacheBackend`].
//!
//! Holds a [`MultiplexedConnection`], which is cheap to clone and pipelines
//! concurrent commands over one socket. The connection is opened on first
//! use rather than at construction, so an unreachable Redis at startup only
//! costs cache misses until it comes back.

use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::info;

use super::backend::{CacheBackend, StoreError};

/// Redis-backed cache.
pub struct RedisCacheBackend {
    client: ::redis::Client,
    conn: OnceCell<MultiplexedConnection>,
}

impl RedisCacheBackend {
    /// Creates a backend for `url` without connecting.
    ///
    /// The URL format is `redis://[:<password>@]<host>:<port>[/<db>]`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the URL is malformed.
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(url)
            .map_err(|e| StoreError::Unavailable(format!("invalid Redis URL: {e}")))?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
        })
    }

    /// Opens the shared connection if it is not open yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if Redis cannot be reached. A later
    /// call retries.
    pub async fn connect(&self) -> Result<(), StoreError> {
        self.connection().await.map(|_| ())
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.conn
            .get_or_try_init(|| async {
                let conn = self
                    .client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| StoreError::Unavailable(format!("failed to connect to Redis: {e}")))?;
                info!("Redis connection established");
                Ok(conn)
            })
            .await
            .cloned()
    }
}

/// Redis expiry has one-second resolution; round up and never send zero.
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

fn command_error(key: &str, err: &::redis::RedisError) -> StoreError {
    StoreError::Command {
        key: key.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection().await?;
        ::redis::cmd("GET")
            .arg(key)
            .query_async::<Option<Vec<u8>>>(&mut conn)
            .await
            .map_err(|e| command_error(key, &e))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| command_error(key, &e))
    }
}
