//! # HTTP Server Module
//!
//! Binds the listener and assembles the axum application: a handful of
//! gateway-local endpoints plus a fallback that sends everything else through
//! the [`GatewayPipeline`].

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router as AxumRouter,
};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::gateway::pipeline::GatewayPipeline;

/// Shared state for axum handlers
#[derive(Clone)]
pub struct ServerState {
    pub pipeline: GatewayPipeline,
    pub started_at: Instant,
}

/// The gateway's HTTP server
pub struct GatewayServer {
    config: GatewayConfig,
    state: ServerState,
}

impl GatewayServer {
    /// Build the server and every pipeline stage; fails fast on bad configuration
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let pipeline = GatewayPipeline::new(&config)?;

        Ok(Self {
            config,
            state: ServerState {
                pipeline,
                started_at: Instant::now(),
            },
        })
    }

    pub fn pipeline(&self) -> &GatewayPipeline {
        &self.state.pipeline
    }

    /// The axum application, without a listener
    pub fn app(&self) -> AxumRouter {
        AxumRouter::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/gateway/routes", get(list_routes))
            .fallback(handle_request)
            .with_state(self.state.clone())
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Bind the configured address and serve until SIGINT/SIGTERM
    #[instrument(skip(self))]
    pub async fn start(self) -> GatewayResult<()> {
        let addr = self.config.listen_addr()?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            GatewayError::internal(format!("Failed to bind gateway server to {}: {}", addr, e))
        })?;

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an existing listener until `shutdown` resolves
    ///
    /// After the shutdown signal, in-flight requests get `server.shutdown_grace`
    /// to finish before remaining connections are dropped.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        let grace = self.config.server.shutdown_grace;
        let app = self.app();

        info!(
            listen_address = %local_addr,
            routes = self.state.pipeline.routes().len(),
            "Gateway HTTP server listening"
        );

        let shutdown_started = Arc::new(Notify::new());
        let notifier = shutdown_started.clone();

        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutdown signal received, draining in-flight requests");
            notifier.notify_one();
        });

        tokio::select! {
            result = server.into_future() => {
                result.map_err(|e| GatewayError::internal(format!("Gateway server error: {}", e)))?;
            }
            _ = grace_period_elapsed(shutdown_started, grace) => {
                warn!(grace_ms = grace.as_millis() as u64, "Shutdown grace period elapsed, dropping remaining connections");
            }
        }

        info!("Gateway HTTP server stopped");
        Ok(())
    }
}

async fn grace_period_elapsed(started: Arc<Notify>, grace: Duration) {
    started.notified().await;
    tokio::time::sleep(grace).await;
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Everything that is not a gateway-local endpoint
async fn handle_request(State(state): State<ServerState>, request: Request) -> Response {
    state.pipeline.handle(request).await
}

/// Liveness
pub async fn health_check(State(state): State<ServerState>) -> impl IntoResponse {
    let health_info = serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });

    (StatusCode::OK, Json(health_info))
}

/// Readiness: the pipeline is built once the server exists, so this reports the route count
pub async fn readiness_check(State(state): State<ServerState>) -> impl IntoResponse {
    let readiness_info = serde_json::json!({
        "status": "ready",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "routes": state.pipeline.routes().len(),
    });

    (StatusCode::OK, Json(readiness_info))
}

/// Route table enumeration in declaration order
pub async fn list_routes(State(state): State<ServerState>) -> impl IntoResponse {
    let routes: Vec<_> = state
        .pipeline
        .routes()
        .routes()
        .iter()
        .map(|route| route.as_ref().clone())
        .collect();

    Json(routes)
}
