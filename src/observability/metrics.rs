//! # Metrics
//!
//! Request metrics recorded through the `metrics` facade. Without an installed
//! recorder every call is a no-op, so the pipeline records unconditionally and
//! the Prometheus exporter is installed only when enabled.
//!
//! | Metric | Kind | Labels |
//! |---|---|---|
//! | `gateway_requests_total` | counter | `route`, `status` |
//! | `gateway_request_duration_seconds` | histogram | `route` |
//! | `gateway_auth_rejections_total` | counter | `reason` |

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use tracing::info;

use crate::core::config::MetricsConfig;
use crate::core::error::{GatewayError, GatewayResult};

/// Latency buckets in seconds
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Install the Prometheus recorder and its scrape listener
///
/// Returns `Ok(false)` when metrics are disabled.
pub fn install_exporter(config: &MetricsConfig) -> GatewayResult<bool> {
    if !config.enabled {
        return Ok(false);
    }

    let addr: SocketAddr = config.listen_address.parse().map_err(|e| {
        GatewayError::config(format!(
            "Invalid metrics listen address '{}': {}",
            config.listen_address, e
        ))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("gateway_request_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )
        .map_err(|e| GatewayError::config(format!("Failed to set histogram buckets: {}", e)))?
        .install()
        .map_err(|e| GatewayError::internal(format!("Failed to install metrics exporter: {}", e)))?;

    info!(listen_address = %addr, "Prometheus exporter listening");
    Ok(true)
}

/// Record a finished request
pub fn record_request(route: &str, status: u16, duration: Duration) {
    metrics::counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "gateway_request_duration_seconds",
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a request turned away by the authentication gate
pub fn record_auth_rejection(reason: &'static str) {
    metrics::counter!("gateway_auth_rejections_total", "reason" => reason).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_exporter_is_not_installed() {
        assert!(!install_exporter(&MetricsConfig::default()).unwrap());
    }

    #[test]
    fn test_invalid_listen_address() {
        let config = MetricsConfig {
            enabled: true,
            listen_address: "not-an-address".to_string(),
        };
        assert!(matches!(
            install_exporter(&config),
            Err(GatewayError::Configuration { .. })
        ));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_request("mission", 200, Duration::from_millis(12));
        record_auth_rejection("missing_token");
    }
}
