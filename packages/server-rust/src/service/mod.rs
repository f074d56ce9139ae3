//! Service wiring and lifecycle.
//!
//! 1. **Configuration** (`config`): [`ServiceConfig`] and its sections
//! 2. **Context** (`context`): [`AppContext`], the explicit dependency bundle
//! 3. **Registry** (`registry`): ordered start/stop of [`ManagedService`]s
//! 4. **Lifecycle** (`lifecycle`): the cache, producer, scheduler and
//!    consumer services

pub mod config;
pub mod context;
pub mod lifecycle;
pub mod registry;

pub use config::{
    AnalyticsConfig, BrokerConfig, CacheConfig, ConfigError, LogConfig, LogFormat,
    SchedulerConfig, ServiceConfig,
};
pub use context::AppContext;
pub use lifecycle::{
    standard_services, CacheService, ConsumerService, ProducerService, SchedulerService,
};
pub use registry::{ManagedService, ServiceRegistry};
