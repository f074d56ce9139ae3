//! Health, liveness and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;
use crate::network::HealthState;

/// Detailed health as JSON.
///
/// Always 200; the `state` field says whether the service is actually
/// serving, so monitoring can tell "up but draining" from "down".
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let scheduler = state
        .scheduler
        .as_ref()
        .and_then(|service| service.handle())
        .map_or(Value::Null, |handle| {
            json!({
                "state": handle.state().as_str(),
                "attempts": handle.attempts(),
                "failures": handle.failures(),
                "timeouts": handle.timeouts(),
            })
        });

    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "scheduler": scheduler,
    }))
}

/// Liveness probe: 200 while the process can answer at all.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 only in the `Ready` state.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::network::handlers::test_state;
    use crate::runtime::task_fn;
    use crate::service::{AppContext, ManagedService, SchedulerService, ServiceConfig};

    #[tokio::test]
    async fn health_reports_state_and_counters() {
        let state = test_state();
        state.shutdown.set_ready();
        let _guard = state.shutdown.in_flight_guard();

        let Json(body) = health_handler(State(state)).await;

        assert_eq!(body["state"], "ready");
        assert_eq!(body["in_flight"], 1);
        assert!(body["uptime_secs"].is_number());
        assert!(body["scheduler"].is_null());
    }

    #[tokio::test]
    async fn health_includes_scheduler_state() {
        let ctx = AppContext::from_config(ServiceConfig::default()).unwrap();
        let scheduler = Arc::new(SchedulerService::new(
            Arc::new(task_fn("noop", || async { Ok(()) })),
            &ctx.shutdown,
        ));
        scheduler.init(&ctx).await.unwrap();

        let state = AppState {
            scheduler: Some(Arc::clone(&scheduler)),
            ..test_state()
        };
        let Json(body) = health_handler(State(state)).await;
        assert_eq!(body["scheduler"]["state"], "running");

        scheduler.shutdown(false).await.unwrap();
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_health_state() {
        let state = test_state();
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.shutdown.set_ready();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);

        state.shutdown.trigger_shutdown();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
