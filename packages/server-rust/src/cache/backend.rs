use std::time::Duration;

use async_trait::async_trait;

/// Cache store connectivity and command failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache command failed for key {key}: {reason}")]
    Command { key: String, reason: String },
}

/// Raw key-value access to a remote cache.
///
/// Values are opaque bytes; expiry is delegated to the store. Implementations
/// must be safe for concurrent use from many tasks.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend name for log lines.
    fn name(&self) -> &'static str;

    /// Fetch the value stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value` under `key`, replacing any existing entry, expiring
    /// after `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    /// Release connections. Default is a no-op.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
