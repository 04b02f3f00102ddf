//! # Mission Gateway - Main Entry Point
//!
//! Startup order matters: configuration is loaded first so logging can honour
//! the configured level and format, then the metrics exporter is installed,
//! then the server builds every pipeline stage. A missing JWT secret or an
//! invalid route table stops the process here, before the port is bound.

use anyhow::Context;
use tracing::{error, info};

use mission_gateway::core::config::GatewayConfig;
use mission_gateway::gateway::server::GatewayServer;
use mission_gateway::observability::{init_logging, metrics};

const DEFAULT_CONFIG_PATH: &str = "config/gateway.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("GATEWAY_CONFIG_PATH")
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = GatewayConfig::load_or_default(&config_path)
        .await
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    init_logging(&config.observability.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %config_path,
        routes = config.routes.len(),
        "Starting mission gateway"
    );

    metrics::install_exporter(&config.observability.metrics)
        .context("failed to start metrics exporter")?;

    let server = GatewayServer::new(config).map_err(|e| {
        error!(error = %e, "Gateway construction failed");
        e
    })?;

    server.start().await.context("gateway server failed")?;

    info!("Mission gateway shutdown complete");
    Ok(())
}
