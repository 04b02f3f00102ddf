//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` takes precedence over
//! the configured level; output is JSON (one object per line, with the current
//! span's fields) or human-readable text.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::config::LoggingConfig;

/// Map a configured level name to a tracing level, defaulting to `info`
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = parse_level(&config.level).to_string().to_lowercase();
        EnvFilter::new(format!("mission_gateway={level},tower_http={level},{level}"))
    })
}

/// Initialize the tracing subscriber
///
/// Returns `false` when a subscriber was already installed (tests, embedding).
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = env_filter(config);

    let result = if config.format.eq_ignore_ascii_case("text") {
        Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    } else {
        Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already initialized, skipping initialization");
        return false;
    }

    tracing::info!(
        level = %config.level,
        format = %config.format,
        "Structured logging initialized"
    );
    true
}
