//! # Observability
//!
//! Structured logging and request metrics.

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
