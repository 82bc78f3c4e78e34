//! # Stream Telemetry
//!
//! Observability for the stream ingestion pipeline.
//!
//! ## Components
//!
//! - Structured logging through `tracing-subscriber` (pretty or JSON)
//! - Prometheus counters and histograms for pass outcomes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stream_telemetry::{init_logging, register_metrics, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_logging(&config)?;
//! let metrics = register_metrics()?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `STREAM_SERVICE_NAME` | `stream-mirror` | Service name in logs |
//! | `STREAM_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `STREAM_JSON_LOGS` | `false` | Emit JSON lines |
//! | `STREAM_METRICS_PORT` | `9100` | Prometheus scrape port |

#![warn(missing_docs)]

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    register_metrics, MetricsHandle, FAULTS, FILES_ACCEPTED, FILES_SKIPPED,
    LAST_ACCEPTED_TIMESTAMP, PASS_DURATION, SIGNATURE_VERIFICATIONS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Subscriber could not be installed
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Metric registration failed
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Record a counter increment with labels.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
