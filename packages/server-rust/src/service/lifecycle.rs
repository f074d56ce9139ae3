//! The managed services that make up the running profile service.
//!
//! Registered by [`standard_services`] in dependency order: cache, producer,
//! scheduler, consumer. Shutdown runs in reverse, so the consumer and
//! scheduler stop before the producer disconnects and the cache closes.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::context::AppContext;
use super::registry::{ManagedService, ServiceRegistry};
use crate::analytics::TableBootstrapTask;
use crate::broker::{MessageConsumer, MessageHandler, MessageProducer};
use crate::cache::CacheStore;
use crate::domain::AccountEventHandler;
use crate::runtime::{RetryingScheduler, ScheduledTask, SchedulerHandle};

/// Registers the standard service set for `ctx`.
#[must_use]
pub fn standard_services(ctx: &AppContext) -> ServiceRegistry {
    let registry = ServiceRegistry::new();
    registry.register(CacheService::new(ctx.cache.clone()));
    registry.register(ProducerService::new(Arc::clone(&ctx.producer)));
    registry.register(SchedulerService::new(
        Arc::new(TableBootstrapTask::new(
            Arc::clone(&ctx.analytics),
            ctx.config.analytics.bootstrap_concurrency,
        )),
        &ctx.shutdown,
    ));
    registry.register(ConsumerService::new(
        Arc::clone(&ctx.consumer),
        Arc::new(AccountEventHandler::new(Arc::clone(&ctx.profiles))),
        &ctx.shutdown,
    ));
    registry
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Owns the cache store's connections.
pub struct CacheService {
    cache: CacheStore,
}

impl CacheService {
    #[must_use]
    pub fn new(cache: CacheStore) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl ManagedService for CacheService {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn init(&self, _ctx: &AppContext) -> anyhow::Result<()> {
        info!(backend = self.cache.backend_name(), "cache ready");
        Ok(())
    }

    async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
        self.cache.close().await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

/// Connects the message producer for the service's lifetime.
pub struct ProducerService {
    producer: Arc<MessageProducer>,
}

impl ProducerService {
    #[must_use]
    pub fn new(producer: Arc<MessageProducer>) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl ManagedService for ProducerService {
    fn name(&self) -> &'static str {
        "producer"
    }

    async fn init(&self, _ctx: &AppContext) -> anyhow::Result<()> {
        self.producer.connect().await?;
        Ok(())
    }

    async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
        self.producer.disconnect().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Runs one [`ScheduledTask`] under a [`RetryingScheduler`].
pub struct SchedulerService {
    task: Arc<dyn ScheduledTask>,
    parent: CancellationToken,
    handle: Mutex<Option<Arc<SchedulerHandle>>>,
}

impl SchedulerService {
    #[must_use]
    pub fn new(task: Arc<dyn ScheduledTask>, parent: &CancellationToken) -> Self {
        Self {
            task,
            parent: parent.clone(),
            handle: Mutex::new(None),
        }
    }

    /// The running loop's handle, once started.
    #[must_use]
    pub fn handle(&self) -> Option<Arc<SchedulerHandle>> {
        self.handle.lock().clone()
    }
}

#[async_trait]
impl ManagedService for SchedulerService {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    async fn init(&self, ctx: &AppContext) -> anyhow::Result<()> {
        let handle = RetryingScheduler::spawn(
            Arc::clone(&self.task),
            ctx.config.scheduler.clone(),
            &self.parent,
        );
        *self.handle.lock() = Some(Arc::new(handle));
        Ok(())
    }

    async fn shutdown(&self, terminate: bool) -> anyhow::Result<()> {
        let Some(handle) = self.handle() else {
            return Ok(());
        };
        if terminate {
            handle.cancel();
        } else {
            handle.stop().await;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Subscribes to the register topic and runs the consume loop in the
/// background.
///
/// A loop that ends with an error cancels the root token: the whole
/// service shuts down and is expected to be restarted by its supervisor,
/// after which the broker redelivers the failed message.
pub struct ConsumerService {
    consumer: Arc<MessageConsumer>,
    handler: Arc<dyn MessageHandler>,
    root: CancellationToken,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl ConsumerService {
    #[must_use]
    pub fn new(
        consumer: Arc<MessageConsumer>,
        handler: Arc<dyn MessageHandler>,
        root: &CancellationToken,
    ) -> Self {
        Self {
            consumer,
            handler,
            root: root.clone(),
            cancel: root.child_token(),
            task: Mutex::new(None),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Why the consume loop failed, if it did.
    #[must_use]
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }
}

#[async_trait]
impl ManagedService for ConsumerService {
    fn name(&self) -> &'static str {
        "consumer"
    }

    async fn init(&self, ctx: &AppContext) -> anyhow::Result<()> {
        self.consumer.connect(&ctx.config.broker.register_topic).await?;

        let consumer = Arc::clone(&self.consumer);
        let handler = Arc::clone(&self.handler);
        let cancel = self.cancel.clone();
        let root = self.root.clone();
        let failure = Arc::clone(&self.failure);

        let task = tokio::spawn(async move {
            match consumer.init_consuming(handler.as_ref(), &cancel).await {
                Ok(()) => info!("consume loop finished"),
                Err(e) => {
                    error!(error = %e, "consume loop failed, shutting down");
                    *failure.lock() = Some(e.to_string());
                    root.cancel();
                }
            }
        });
        *self.task.lock() = Some(task);
        Ok(())
    }

    async fn shutdown(&self, terminate: bool) -> anyhow::Result<()> {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if terminate {
                task.abort();
            }
            // The loop must be gone before the session closes under it.
            match task.await {
                Err(e) if !e.is_cancelled() => {
                    warn!(error = %e, "consume task ended abnormally");
                }
                _ => {}
            }
        }
        self.consumer.disconnect().await?;
        Ok(())
    }
}
