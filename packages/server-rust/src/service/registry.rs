use std::any::{Any, TypeId};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{error, info};

use super::context::AppContext;

// ---------------------------------------------------------------------------
// ManagedService trait
// ---------------------------------------------------------------------------

/// A component with a start and stop step.
///
/// Services are registered with a [`ServiceRegistry`], started in
/// registration order and stopped in reverse, so a service may rely on
/// everything registered before it for its whole lifetime. The `Any` bound
/// enables typed lookup via [`ServiceRegistry::get`].
#[async_trait]
pub trait ManagedService: Send + Sync + Any {
    /// Unique name, used for lookup and in log lines.
    fn name(&self) -> &'static str;

    /// Start the service.
    async fn init(&self, ctx: &AppContext) -> anyhow::Result<()>;

    /// Stop the service. With `terminate` set, skip waiting for outstanding
    /// work.
    async fn shutdown(&self, terminate: bool) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Ordered collection of lifecycle-managed services.
pub struct ServiceRegistry {
    by_name: DashMap<&'static str, Arc<dyn ManagedService>>,
    by_type: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    init_order: RwLock<Vec<&'static str>>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_name: DashMap::new(),
            by_type: DashMap::new(),
            init_order: RwLock::new(Vec::new()),
        }
    }

    /// Register a service and return a shared handle to it.
    pub fn register<T: ManagedService>(&self, service: T) -> Arc<T> {
        let name = service.name();
        let arc = Arc::new(service);
        self.by_name.insert(name, arc.clone());
        self.by_type.insert(TypeId::of::<T>(), arc.clone());
        self.init_order.write().push(name);
        arc
    }

    /// Retrieve a service by its concrete type.
    #[must_use]
    pub fn get<T: ManagedService>(&self) -> Option<Arc<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn ManagedService>> {
        self.by_name.get(name).map(|entry| entry.value().clone())
    }

    /// Names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.init_order.read().clone()
    }

    /// Start every service in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first `init` failure. Services after it are not started;
    /// the caller should still run [`shutdown_all`](Self::shutdown_all).
    pub async fn init_all(&self, ctx: &AppContext) -> anyhow::Result<()> {
        for name in self.names() {
            if let Some(service) = self.get_by_name(name) {
                service
                    .init(ctx)
                    .await
                    .map_err(|e| e.context(format!("failed to start {name}")))?;
                info!(service = name, "service started");
            }
        }
        Ok(())
    }

    /// Stop every service in reverse registration order.
    ///
    /// A failing service does not prevent the ones registered before it
    /// from stopping.
    ///
    /// # Errors
    ///
    /// Returns the first `shutdown` failure after all services were asked to
    /// stop.
    pub async fn shutdown_all(&self, terminate: bool) -> anyhow::Result<()> {
        let mut first_error = None;
        for name in self.names().into_iter().rev() {
            let Some(service) = self.get_by_name(name) else {
                continue;
            };
            match service.shutdown(terminate).await {
                Ok(()) => info!(service = name, "service stopped"),
                Err(e) => {
                    error!(service = name, error = %format!("{e:#}"), "service failed to stop");
                    first_error.get_or_insert(e.context(format!("failed to stop {name}")));
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::service::config::ServiceConfig;

    type Log = Arc<Mutex<Vec<String>>>;

    struct TestService {
        svc_name: &'static str,
        fail_shutdown: bool,
        log: Log,
    }

    impl TestService {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                svc_name: name,
                fail_shutdown: false,
                log: Arc::clone(log),
            }
        }
    }

    #[async_trait]
    impl ManagedService for TestService {
        fn name(&self) -> &'static str {
            self.svc_name
        }

        async fn init(&self, _ctx: &AppContext) -> anyhow::Result<()> {
            self.log.lock().push(format!("init:{}", self.svc_name));
            Ok(())
        }

        async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
            self.log.lock().push(format!("shutdown:{}", self.svc_name));
            if self.fail_shutdown {
                anyhow::bail!("{} refused to stop", self.svc_name);
            }
            Ok(())
        }
    }

    struct AnotherService;

    #[async_trait]
    impl ManagedService for AnotherService {
        fn name(&self) -> &'static str {
            "another"
        }
        async fn init(&self, _ctx: &AppContext) -> anyhow::Result<()> {
            Ok(())
        }
        async fn shutdown(&self, _terminate: bool) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn three(log: &Log) -> ServiceRegistry {
        let registry = ServiceRegistry::new();
        registry.register(TestService::new("cache", log));
        registry.register(TestService::new("producer", log));
        registry.register(TestService::new("consumer", log));
        registry
    }

    #[test]
    fn lookup_by_name_and_type() {
        let registry = ServiceRegistry::new();
        registry.register(AnotherService);

        assert_eq!(registry.get_by_name("another").unwrap().name(), "another");
        assert!(registry.get::<AnotherService>().is_some());
        assert!(registry.get_by_name("missing").is_none());
        assert!(registry.get::<TestService>().is_none());
    }

    #[tokio::test]
    async fn init_all_runs_in_registration_order() {
        let log = Log::default();
        let registry = three(&log);
        let ctx = AppContext::from_config(ServiceConfig::default()).unwrap();

        registry.init_all(&ctx).await.unwrap();

        assert_eq!(*log.lock(), vec!["init:cache", "init:producer", "init:consumer"]);
    }

    #[tokio::test]
    async fn shutdown_all_runs_in_reverse_order() {
        let log = Log::default();
        let registry = three(&log);

        registry.shutdown_all(false).await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["shutdown:consumer", "shutdown:producer", "shutdown:cache"]
        );
    }

    #[tokio::test]
    async fn failed_shutdown_does_not_skip_the_rest() {
        let log = Log::default();
        let registry = ServiceRegistry::new();
        registry.register(TestService::new("cache", &log));
        registry.register(TestService {
            fail_shutdown: true,
            ..TestService::new("producer", &log)
        });

        let err = registry.shutdown_all(false).await.unwrap_err();

        assert!(format!("{err:#}").contains("producer refused to stop"));
        assert_eq!(*log.lock(), vec!["shutdown:producer", "shutdown:cache"]);
    }
}
