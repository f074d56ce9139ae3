//! Profile service entry point.
//!
//! Parses flags (each backed by an environment variable), installs the log
//! subscriber, starts the managed services and serves HTTP until Ctrl-C or
//! a fatal consumer error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use profile_server::network::{AppState, NetworkConfig, NetworkModule, ShutdownController};
use profile_server::service::{
    standard_services, AnalyticsConfig, AppContext, BrokerConfig, CacheConfig, ConsumerService,
    LogConfig, LogFormat, SchedulerConfig, SchedulerService, ServiceConfig,
};

/// Command-line options.
#[derive(Parser, Debug)]
#[command(name = "profile-server", version, about = "Profile service")]
struct Args {
    /// Identifier used in log lines.
    #[arg(long, env = "PROFILE_NODE_ID", default_value = "profile-0")]
    node_id: String,

    #[arg(long, env = "PROFILE_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PROFILE_PORT", default_value_t = 8000)]
    port: u16,

    /// Redis URL; omit to use the in-process cache.
    #[arg(long, env = "PROFILE_REDIS_URL")]
    redis_url: Option<String>,

    /// Cache entry time-to-live, in seconds.
    #[arg(long, env = "PROFILE_CACHE_TTL_SECS", default_value_t = 60)]
    cache_ttl_secs: u64,

    /// Budget for a single cache get or set, in milliseconds.
    #[arg(long, env = "PROFILE_CACHE_TIMEOUT_MS", default_value_t = 70)]
    cache_timeout_ms: u64,

    #[arg(long, env = "PROFILE_CACHE_PREFIX", default_value = "")]
    cache_prefix: String,

    /// Kafka host; omit to use the in-process broker.
    #[arg(long, env = "PROFILE_KAFKA_HOST")]
    kafka_host: Option<String>,

    #[arg(long, env = "PROFILE_KAFKA_PORT", default_value_t = 9092)]
    kafka_port: u16,

    #[arg(long, env = "PROFILE_KAFKA_GROUP_ID", default_value = "profile-service")]
    kafka_group_id: String,

    /// Topic carrying account lifecycle events.
    #[arg(long, env = "PROFILE_KAFKA_REGISTER_TOPIC", default_value = "register")]
    register_topic: String,

    /// Comma-separated topics every produced message goes to.
    #[arg(long, env = "PROFILE_KAFKA_PRODUCER_TOPICS", value_delimiter = ',')]
    producer_topics: Vec<String>,

    /// Pause between table bootstrap runs, in seconds.
    #[arg(long, env = "PROFILE_REPEAT_INTERVAL_SECS", default_value_t = 60)]
    repeat_interval_secs: u64,

    /// Deadline for one bootstrap run, in seconds.
    #[arg(long, env = "PROFILE_TASK_TIMEOUT_SECS", default_value_t = 5)]
    task_timeout_secs: u64,

    /// `ClickHouse` HTTP endpoint; omit to skip real table creation.
    #[arg(long, env = "PROFILE_CLICKHOUSE_URL")]
    clickhouse_url: Option<String>,

    #[arg(long, env = "PROFILE_CLICKHOUSE_DATABASE", default_value = "default")]
    clickhouse_database: String,

    #[arg(long, env = "PROFILE_CLICKHOUSE_USER", default_value = "default")]
    clickhouse_user: String,

    #[arg(long, env = "PROFILE_CLICKHOUSE_PASSWORD", default_value = "", hide_env_values = true)]
    clickhouse_password: String,

    /// Default log filter; `RUST_LOG` overrides it.
    #[arg(long, env = "PROFILE_LOG", default_value = "info")]
    log_filter: String,

    #[arg(long, env = "PROFILE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Fmt)]
    log_format: LogFormat,
}

impl Args {
    fn into_config(self) -> ServiceConfig {
        ServiceConfig {
            node_id: self.node_id,
            network: NetworkConfig {
                host: self.host,
                port: self.port,
                ..NetworkConfig::default()
            },
            cache: CacheConfig {
                redis_url: self.redis_url,
                default_ttl: Duration::from_secs(self.cache_ttl_secs),
                default_timeout: Duration::from_millis(self.cache_timeout_ms),
                key_prefix: self.cache_prefix,
            },
            broker: BrokerConfig {
                host: self.kafka_host,
                port: self.kafka_port,
                group_id: self.kafka_group_id,
                producer_topics: self.producer_topics,
                register_topic: self.register_topic,
                ..BrokerConfig::default()
            },
            scheduler: SchedulerConfig {
                repeat_interval: Duration::from_secs(self.repeat_interval_secs),
                task_timeout: Duration::from_secs(self.task_timeout_secs),
                ..SchedulerConfig::default()
            },
            analytics: AnalyticsConfig {
                url: self.clickhouse_url,
                database: self.clickhouse_database,
                user: self.clickhouse_user,
                password: self.clickhouse_password,
                ..AnalyticsConfig::default()
            },
            logging: LogConfig {
                filter: self.log_filter,
                format: self.log_format,
            },
        }
    }
}

fn init_tracing(config: &LogConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .with_context(|| format!("invalid log filter {:?}", config.filter))?,
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.format {
        LogFormat::Fmt => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config();
    init_tracing(&config.logging)?;
    config.validate()?;

    let ctx = AppContext::from_config(config)?;
    let shutdown = Arc::new(ShutdownController::new(ctx.shutdown.clone()));

    let mut network = NetworkModule::new(ctx.config.network.clone(), Arc::clone(&shutdown));
    let port = network.start().await?;

    let registry = standard_services(&ctx);
    if let Err(e) = registry.init_all(&ctx).await {
        error!(error = %e, "startup failed");
        if let Err(cleanup) = registry.shutdown_all(true).await {
            warn!(error = %cleanup, "cleanup after failed startup was incomplete");
        }
        return Err(e);
    }
    info!(node_id = %ctx.config.node_id, port, "profile service started");

    let signals = Arc::clone(&shutdown);
    tokio::spawn(async move {
        let token = signals.token();
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("interrupt received, shutting down"),
                    Err(e) => error!(error = %e, "failed to listen for interrupt, shutting down"),
                }
                signals.trigger_shutdown();
            }
            () = token.cancelled() => {}
        }
    });

    let state = AppState {
        shutdown: Arc::clone(&shutdown),
        profiles: Arc::new(ctx.profile_reader()),
        scheduler: registry.get::<SchedulerService>(),
        start_time: Instant::now(),
    };
    let served = network.serve(state).await;

    if let Err(e) = registry.shutdown_all(false).await {
        warn!(error = %e, "shutdown finished with errors");
    }
    served?;

    if let Some(reason) = registry
        .get::<ConsumerService>()
        .and_then(|consumer| consumer.failure())
    {
        anyhow::bail!("account event consumer failed: {reason}");
    }
    info!("profile service stopped");
    Ok(())
}
