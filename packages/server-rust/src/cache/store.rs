//! Timeout-guarded access to a [`CacheBackend`].
//!
//! Every get and set runs under its own deadline. Failures of any kind are
//! logged and absorbed: a failed get looks exactly like a miss and a failed
//! set is a no-op. Cache trouble therefore never reaches callers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::backend::CacheBackend;
use crate::runtime::TimeoutGuard;

/// Shared cache handle used by the memoizing executor.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
}

impl CacheStore {
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Name of the underlying backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Fetches `key`, giving up after `timeout`.
    ///
    /// Returns `None` on a miss, an expired entry, a backend error or a
    /// timeout. Empty values are treated as misses.
    pub async fn get(&self, key: &str, timeout: Duration) -> Option<Vec<u8>> {
        let value = TimeoutGuard::new("cache get", timeout)
            .run(self.backend.get(key))
            .await
            .flatten()?;
        if value.is_empty() {
            debug!(key, "empty cache entry treated as miss");
            return None;
        }
        Some(value)
    }

    /// Stores `value` under `key` with `ttl`, giving up after `timeout`.
    ///
    /// Returns whether the write was acknowledged. Callers are free to
    /// ignore the result.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration, timeout: Duration) -> bool {
        TimeoutGuard::new("cache set", timeout)
            .run(self.backend.set(key, value, ttl))
            .await
            .is_some()
    }

    /// Releases the backend's connections.
    pub async fn close(&self) {
        match self.backend.close().await {
            Ok(()) => info!(backend = self.backend.name(), "cache store closed"),
            Err(e) => warn!(backend = self.backend.name(), error = %e, "cache close failed"),
        }
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("backend", &self.backend.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCacheBackend;
    use crate::cache::testing::BrokenBackend;

    const BUDGET: Duration = Duration::from_millis(70);

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let store = CacheStore::new(Arc::new(MemoryCacheBackend::new()));
        assert!(store.set("k", b"v", Duration::from_secs(60), BUDGET).await);
        assert_eq!(store.get("k", BUDGET).await.as_deref(), Some(&b"v"[..]));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = CacheStore::new(Arc::new(MemoryCacheBackend::new()));
        assert!(store.get("absent", BUDGET).await.is_none());
    }

    #[tokio::test]
    async fn empty_value_is_a_miss() {
        let store = CacheStore::new(Arc::new(MemoryCacheBackend::new()));
        store.set("k", b"", Duration::from_secs(60), BUDGET).await;
        assert!(store.get("k", BUDGET).await.is_none());
    }

    #[tokio::test]
    async fn failing_backend_is_absorbed() {
        let store = CacheStore::new(Arc::new(BrokenBackend::Failing));
        assert!(store.get("k", BUDGET).await.is_none());
        assert!(!store.set("k", b"v", Duration::from_secs(60), BUDGET).await);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_backend_is_cut_off_at_the_budget() {
        let store = CacheStore::new(Arc::new(BrokenBackend::Hanging));
        let start = tokio::time::Instant::now();
        assert!(store.get("k", BUDGET).await.is_none());
        assert_eq!(start.elapsed(), BUDGET);
        assert!(!store.set("k", b"v", Duration::from_secs(60), BUDGET).await);
        assert_eq!(start.elapsed(), BUDGET * 2);
    }
}
