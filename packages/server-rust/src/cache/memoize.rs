//! Read-through memoization of async operations.
//!
//! [`MemoizingExecutor`] derives a [`CacheKey`] from an operation's name and
//! arguments, returns the cached result when one decodes cleanly, and
//! otherwise runs the operation and stores its success. Absent results
//! (`None`, unit) are never stored, and an absent entry reads as a miss, so
//! a "not found" never outlives the lookup that produced it. The cache is an
//! optimization only: every cache failure degrades to running the
//! operation, and the operation's own error always reaches the caller
//! uncached.
//!
//! Concurrent misses for the same key each run the operation; there is no
//! in-flight deduplication.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use profile_core::{CacheKey, Codec, JsonCodec};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use super::store::CacheStore;
use crate::service::config::CacheConfig;

// ---------------------------------------------------------------------------
// CachePolicy
// ---------------------------------------------------------------------------

/// Expiry and per-call budget applied to one memoized operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// How long a stored result stays valid.
    pub ttl: Duration,
    /// Budget for each cache get and set.
    pub timeout: Duration,
}

impl CachePolicy {
    #[must_use]
    pub fn new(ttl: Duration, timeout: Duration) -> Self {
        Self { ttl, timeout }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CachePolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            ttl: config.default_ttl,
            timeout: config.default_timeout,
        }
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A named, memoizable async operation.
///
/// Implementors describe a pure-enough read whose result may be served from
/// cache for the policy's TTL.
#[async_trait]
pub trait Operation: Send + Sync {
    type Args: Serialize + Send + Sync;
    type Output: Serialize + DeserializeOwned + Send;
    type Error: Send;

    /// Name that scopes the cache key. Must stay the same across builds and
    /// restarts, so spell it out (e.g. `"profile::get_by_user_uuid"`).
    fn qualified_name(&self) -> &'static str;

    /// Overrides the executor's default policy for this operation.
    fn policy(&self) -> Option<CachePolicy> {
        None
    }

    async fn call(&self, args: &Self::Args) -> Result<Self::Output, Self::Error>;
}

// ---------------------------------------------------------------------------
// MemoizingExecutor
// ---------------------------------------------------------------------------

/// Wraps operations with a read-through cache.
#[derive(Debug, Clone)]
pub struct MemoizingExecutor<C = JsonCodec> {
    store: CacheStore,
    codec: C,
    key_prefix: String,
    policy: CachePolicy,
}

impl MemoizingExecutor<JsonCodec> {
    /// Creates an executor storing JSON-encoded results.
    #[must_use]
    pub fn new(store: CacheStore, config: &CacheConfig) -> Self {
        Self {
            store,
            codec: JsonCodec,
            key_prefix: config.key_prefix.clone(),
            policy: CachePolicy::from(config),
        }
    }
}

impl<C: Codec> MemoizingExecutor<C> {
    /// Swaps the result serializer. Entries written by the previous codec
    /// become undecodable and are treated as misses.
    #[must_use]
    pub fn with_codec<D: Codec>(self, codec: D) -> MemoizingExecutor<D> {
        MemoizingExecutor {
            store: self.store,
            codec,
            key_prefix: self.key_prefix,
            policy: self.policy,
        }
    }

    /// The policy used when a call does not supply its own.
    #[must_use]
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    #[must_use]
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Runs `op` through the cache under the default policy.
    ///
    /// # Errors
    ///
    /// Returns whatever `op` returns on a miss. Cache failures never surface.
    pub async fn cached<A, T, E, F, Fut>(&self, name: &str, args: &A, op: F) -> Result<T, E>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cache_with(name, args, self.policy, op).await
    }

    /// Runs `op` through the cache under `policy`.
    ///
    /// On a hit the decoded value is returned without calling `op`. On a
    /// miss (including a cache timeout, a store error, a stored null or an
    /// entry that fails to decode) `op` runs; a success is encoded and
    /// written back before it is returned, unless it encodes as null.
    ///
    /// # Errors
    ///
    /// Returns `op`'s error unchanged. Errors are never cached.
    pub async fn cache_with<A, T, E, F, Fut>(
        &self,
        name: &str,
        args: &A,
        policy: CachePolicy,
        op: F,
    ) -> Result<T, E>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = match CacheKey::derive(name, args) {
            Ok(key) => key.with_prefix(&self.key_prefix),
            Err(e) => {
                warn!(operation = name, error = %e, "arguments not cacheable, bypassing cache");
                return op().await;
            }
        };

        if let Some(bytes) = self.store.get(key.as_str(), policy.timeout).await {
            if self.codec.is_null(&bytes) {
                debug!(key = %key, "cached value is empty, treating as miss");
            } else {
                match self.codec.decode::<T>(&bytes) {
                    Ok(value) => {
                        debug!(key = %key, "cache hit");
                        metrics::counter!("cache_lookups_total", "result" => "hit").increment(1);
                        return Ok(value);
                    }
                    Err(e) => {
                        warn!(key = %key, codec = self.codec.name(), error = %e, "discarding undecodable cache entry");
                    }
                }
            }
        }

        debug!(key = %key, "cache miss");
        metrics::counter!("cache_lookups_total", "result" => "miss").increment(1);

        let value = op().await?;

        match self.codec.encode(&value) {
            Ok(bytes) if self.codec.is_null(&bytes) => {
                debug!(key = %key, "empty result, not cached");
            }
            Ok(bytes) => {
                self.store
                    .set(key.as_str(), &bytes, policy.ttl, policy.timeout)
                    .await;
            }
            Err(e) => {
                error!(key = %key, codec = self.codec.name(), error = %e, "result not cacheable");
            }
        }

        Ok(value)
    }

    /// Runs an [`Operation`] through the cache.
    ///
    /// # Errors
    ///
    /// Returns the operation's error unchanged.
    pub async fn call<O: Operation>(&self, op: &O, args: &O::Args) -> Result<O::Output, O::Error> {
        let policy = op.policy().unwrap_or(self.policy);
        self.cache_with(op.qualified_name(), args, policy, || op.call(args))
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
