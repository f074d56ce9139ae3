use std::time::Duration;

use crate::network::NetworkConfig;

/// Top-level configuration for the profile service.
///
/// Constructed once at startup and shared by reference; there is no global
/// settings object.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Unique identifier for this service instance, used in log lines.
    pub node_id: String,
    pub network: NetworkConfig,
    pub cache: CacheConfig,
    pub broker: BrokerConfig,
    pub scheduler: SchedulerConfig,
    pub analytics: AnalyticsConfig,
    pub logging: LogConfig,
}

impl ServiceConfig {
    /// Checks cross-field constraints that defaults cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheduler = &self.scheduler;
        if scheduler.task_timeout.is_zero() {
            return Err(ConfigError::ZeroTaskTimeout);
        }
        if scheduler.backoff_min > scheduler.backoff_max {
            return Err(ConfigError::BackoffRange {
                min: scheduler.backoff_min,
                max: scheduler.backoff_max,
            });
        }
        if self.analytics.bootstrap_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.broker.register_topic.trim().is_empty() {
            return Err(ConfigError::EmptyRegisterTopic);
        }
        Ok(())
    }
}

/// Configuration constraint violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("scheduler task timeout must be greater than zero")]
    ZeroTaskTimeout,
    #[error("backoff minimum {min:?} exceeds maximum {max:?}")]
    BackoffRange { min: Duration, max: Duration },
    #[error("analytics bootstrap concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("register topic must not be empty")]
    EmptyRegisterTopic,
}

/// Remote cache store settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis connection URL. `None` selects the in-process cache.
    pub redis_url: Option<String>,
    /// Time-to-live applied to memoized results.
    pub default_ttl: Duration,
    /// Per-call budget for a single cache get or set.
    pub default_timeout: Duration,
    /// Namespace prepended to every key. Empty means no namespace.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            default_ttl: Duration::from_secs(60),
            default_timeout: Duration::from_millis(70),
            key_prefix: String::new(),
        }
    }
}

/// Message broker settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker host. `None` selects the in-process broker.
    pub host: Option<String>,
    pub port: u16,
    /// Consumer group used by the account-event consumer.
    pub group_id: String,
    /// Topics every produced message is published to, in order.
    pub producer_topics: Vec<String>,
    /// The single topic the account-event consumer subscribes to.
    pub register_topic: String,
    /// How long a publish may wait for the broker acknowledgement.
    pub publish_timeout: Duration,
}

impl BrokerConfig {
    /// `host:port` string for the broker bootstrap servers.
    #[must_use]
    pub fn bootstrap_servers(&self) -> Option<String> {
        self.host.as_ref().map(|host| format!("{host}:{}", self.port))
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 9092,
            group_id: "profile-service".to_string(),
            producer_topics: Vec::new(),
            register_topic: "register".to_string(),
            publish_timeout: Duration::from_secs(5),
        }
    }
}

/// Retrying scheduler timings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause after every iteration, successful or not.
    pub repeat_interval: Duration,
    /// Deadline for one iteration of the scheduled task.
    pub task_timeout: Duration,
    /// Lower bound of the randomized backoff added after a failed iteration.
    pub backoff_min: Duration,
    /// Upper bound of the randomized backoff.
    pub backoff_max: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            repeat_interval: Duration::from_secs(60),
            task_timeout: Duration::from_secs(5),
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(10),
        }
    }
}

/// Analytical store (`ClickHouse`) settings.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// HTTP endpoint, e.g. `http://localhost:8123`. `None` disables the
    /// table bootstrap.
    pub url: Option<String>,
    pub database: String,
    pub user: String,
    pub password: String,
    /// How many tables are created concurrently during bootstrap.
    pub bootstrap_concurrency: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            url: None,
            database: "default".to_string(),
            user: "default".to_string(),
            password: String::new(),
            bootstrap_concurrency: 10,
        }
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Fmt,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Fmt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(ServiceConfig::default().validate(), Ok(()));
    }

    #[test]
    fn cache_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(60));
        assert_eq!(config.default_timeout, Duration::from_millis(70));
        assert!(config.redis_url.is_none());
        assert!(config.key_prefix.is_empty());
    }

    #[test]
    fn scheduler_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.task_timeout, Duration::from_secs(5));
        assert_eq!(config.backoff_min, Duration::from_secs(1));
        assert_eq!(config.backoff_max, Duration::from_secs(10));
    }

    #[test]
    fn inverted_backoff_range_is_rejected() {
        let mut config = ServiceConfig::default();
        config.scheduler.backoff_min = Duration::from_secs(5);
        config.scheduler.backoff_max = Duration::from_secs(1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BackoffRange { .. })
        ));
    }

    #[test]
    fn zero_task_timeout_is_rejected() {
        let mut config = ServiceConfig::default();
        config.scheduler.task_timeout = Duration::ZERO;
        assert_eq!(config.validate(), Err(ConfigError::ZeroTaskTimeout));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = ServiceConfig::default();
        config.analytics.bootstrap_concurrency = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroConcurrency));
    }

    #[test]
    fn blank_register_topic_is_rejected() {
        let mut config = ServiceConfig::default();
        config.broker.register_topic = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyRegisterTopic));
    }

    #[test]
    fn bootstrap_servers_joins_host_and_port() {
        let config = BrokerConfig {
            host: Some("kafka".to_string()),
            ..BrokerConfig::default()
        };
        assert_eq!(config.bootstrap_servers().as_deref(), Some("kafka:9092"));
        assert!(BrokerConfig::default().bootstrap_servers().is_none());
    }
}
