//! Misbehaving backends shared by the cache tests.

use std::time::Duration;

use async_trait::async_trait;

use super::backend::{CacheBackend, StoreError};

/// Backend whose every call fails or never returns.
pub(crate) enum BrokenBackend {
    Failing,
    Hanging,
}

#[async_trait]
impl CacheBackend for BrokenBackend {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self {
            Self::Failing => Err(StoreError::Unavailable("connection refused".into())),
            Self::Hanging => std::future::pending().await,
        }
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), StoreError> {
        match self {
            Self::Failing => Err(StoreError::Unavailable("connection refused".into())),
            Self::Hanging => std::future::pending().await,
        }
    }
}
