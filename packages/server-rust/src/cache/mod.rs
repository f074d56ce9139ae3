//! Result caching for read operations.
//!
//! - [`backend`]: the raw key-value [`CacheBackend`] seam
//! - [`memory`] and `redis`: backend implementations
//! - [`store`]: timeout-guarded [`CacheStore`] that absorbs all failures
//! - [`memoize`]: the read-through [`MemoizingExecutor`]

pub mod backend;
pub mod memoize;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

pub use backend::{CacheBackend, StoreError};
pub use memoize::{CachePolicy, MemoizingExecutor, Operation};
pub use memory::MemoryCacheBackend;
#[cfg(feature = "redis")]
pub use self::redis::RedisCacheBackend;
pub use store::CacheStore;

use crate::service::config::CacheConfig;

/// Builds the backend selected by `config`.
///
/// A configured Redis URL selects Redis; otherwise the in-process backend is
/// used.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] for a malformed Redis URL, or when a
/// URL is configured but the `redis` feature is disabled.
pub fn backend_from_config(config: &CacheConfig) -> Result<Arc<dyn CacheBackend>, StoreError> {
    match config.redis_url.as_deref() {
        #[cfg(feature = "redis")]
        Some(url) => Ok(Arc::new(RedisCacheBackend::new(url)?)),
        #[cfg(not(feature = "redis"))]
        Some(_) => Err(StoreError::Unavailable(
            "built without the `redis` feature".to_string(),
        )),
        None => Ok(Arc::new(MemoryCacheBackend::new())),
    }
}
