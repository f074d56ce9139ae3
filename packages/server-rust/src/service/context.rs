//! Explicit dependency context shared by services and handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::config::ServiceConfig;
use crate::analytics::{AnalyticsStore, ClickHouseStore, DisabledAnalyticsStore};
use crate::broker::{transports_from_config, MessageConsumer, MessageProducer};
use crate::cache::{backend_from_config, CacheStore, MemoizingExecutor};
use crate::domain::{CachedProfileReader, MemoryProfileStore, ProfileStore};

/// Everything a service or request handler needs, built once at startup.
///
/// Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServiceConfig>,
    pub cache: CacheStore,
    pub executor: MemoizingExecutor,
    pub producer: Arc<MessageProducer>,
    pub consumer: Arc<MessageConsumer>,
    pub profiles: Arc<dyn ProfileStore>,
    pub analytics: Arc<dyn AnalyticsStore>,
    /// Root token; cancelling it stops every background loop.
    pub shutdown: CancellationToken,
}

impl AppContext {
    /// Wires backends from `config` without connecting to anything.
    ///
    /// Unset Redis, Kafka and `ClickHouse` endpoints fall back to in-process
    /// implementations.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed endpoint or one that needs a cargo
    /// feature this build lacks.
    pub fn from_config(config: ServiceConfig) -> anyhow::Result<Self> {
        let cache = CacheStore::new(backend_from_config(&config.cache)?);
        let executor = MemoizingExecutor::new(cache.clone(), &config.cache);

        let transports = transports_from_config(&config.broker)?;
        let producer = Arc::new(MessageProducer::new(
            transports.producer,
            config.broker.producer_topics.clone(),
        ));
        let consumer = Arc::new(MessageConsumer::new(transports.consumer));

        let analytics: Arc<dyn AnalyticsStore> = match ClickHouseStore::from_config(&config.analytics) {
            Some(store) => Arc::new(store),
            None => Arc::new(DisabledAnalyticsStore),
        };

        info!(
            node_id = %config.node_id,
            cache = cache.backend_name(),
            analytics = analytics.name(),
            "application context built"
        );

        Ok(Self {
            config: Arc::new(config),
            cache,
            executor,
            producer,
            consumer,
            profiles: Arc::new(MemoryProfileStore::new()),
            analytics,
            shutdown: CancellationToken::new(),
        })
    }

    /// Profile reads served through the memoizing executor.
    #[must_use]
    pub fn profile_reader(&self) -> CachedProfileReader {
        CachedProfileReader::new(Arc::clone(&self.profiles), self.executor.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_in_process_backends() {
        let ctx = AppContext::from_config(ServiceConfig::default()).unwrap();
        assert_eq!(ctx.cache.backend_name(), "memory");
        assert_eq!(ctx.analytics.name(), "disabled");
        assert!(!ctx.producer.is_connected());
        assert!(!ctx.shutdown.is_cancelled());
    }
}
