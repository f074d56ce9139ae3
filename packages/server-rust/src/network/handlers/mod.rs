//! HTTP handlers and the shared state they extract.

pub mod health;
pub mod profiles;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use profiles::profile_by_user_handler;

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::domain::CachedProfileReader;
use crate::service::SchedulerService;

/// Shared state passed to handlers via `State` extraction. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub shutdown: Arc<ShutdownController>,
    /// Memoized profile reads.
    pub profiles: Arc<CachedProfileReader>,
    /// The table bootstrap scheduler, when registered.
    pub scheduler: Option<Arc<SchedulerService>>,
    /// Process start time, for uptime.
    pub start_time: Instant,
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    use crate::service::{AppContext, ServiceConfig};

    let ctx = AppContext::from_config(ServiceConfig::default()).expect("default context");
    AppState {
        shutdown: Arc::new(ShutdownController::default()),
        profiles: Arc::new(ctx.profile_reader()),
        scheduler: None,
        start_time: Instant::now(),
    }
}
