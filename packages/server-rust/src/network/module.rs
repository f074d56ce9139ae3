//! HTTP server with a deferred startup lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the listener and
//! `serve()` accepts connections until the root token is cancelled. The
//! split lets services start between binding and serving.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    health_handler, liveness_handler, profile_by_user_handler, readiness_handler, AppState,
};
use super::middleware::{apply_http_layers, track_in_flight};
use super::shutdown::ShutdownController;

/// Owns the listener and the shutdown controller for the HTTP surface.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    #[must_use]
    pub fn new(config: NetworkConfig, shutdown: Arc<ShutdownController>) -> Self {
        Self {
            config,
            listener: None,
            shutdown,
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles routes and middleware.
    ///
    /// - `GET /health`, `/health/live`, `/health/ready`: probes
    /// - `GET /profiles/{user_uuid}`: memoized profile lookup
    pub fn build_router(&self, state: AppState) -> Router {
        let probes = Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler));

        let api = Router::new()
            .route("/profiles/{user_uuid}", get(profile_by_user_handler))
            .layer(axum::middleware::from_fn_with_state(
                Arc::clone(&self.shutdown),
                track_in_flight,
            ));

        apply_http_layers(probes.merge(api), &self.config).with_state(state)
    }

    /// Binds the listener and returns the bound port, which differs from the
    /// configured one when that is 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "TCP listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until the root token is cancelled, then drains in-flight
    /// requests for up to the configured drain timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(self, state: AppState) -> anyhow::Result<()> {
        let router = self.build_router(state);
        let Self {
            config,
            listener,
            shutdown,
        } = self;
        let listener =
            listener.ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;

        shutdown.set_ready();
        info!("serving HTTP");

        let token = shutdown.token();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;

        shutdown.trigger_shutdown();
        if shutdown.wait_for_drain(config.drain_timeout).await {
            info!("in-flight requests drained");
        } else {
            warn!(
                in_flight = shutdown.in_flight_count(),
                "drain timeout expired with requests outstanding"
            );
        }
        Ok(())
    }
}
