//! # Forge Telemetry
//!
//! Observability for the Forge pipeline.
//!
//! ## Components
//!
//! - **Logs**: `tracing` with a `tracing-subscriber` registry, pretty or JSON
//! - **Metrics**: Prometheus counters, gauges and histograms
//!
//! ## Usage
//!
//! ```rust,ignore
//! use forge_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env())?;
//!     // Application code here
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `FORGE_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `FORGE_JSON_LOGS` | `false` | Emit JSON log lines |
//! | `FORGE_CONSOLE_OUTPUT` | `true` | Write logs to stderr |
//! | `FORGE_LOG_SOURCE` | `false` | Include file and line |
//! | `FORGE_SERVICE_NAME` | `forge` | Service name |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, MetricsHandle, BUS_EVENTS_PUBLISHED,
    BUS_HANDLER_FAILURES, BUS_PENDING_HANDLERS, LLM_REQUESTS, LLM_REQUEST_DURATION, LLM_RETRIES,
    REGISTRY, STAGE_SKIPS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Initialize metrics first (synchronous)
    let metrics_handle = register_metrics()?;

    init_logging(&config)?;

    Ok(TelemetryGuard {
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::HistogramTimer::new(&$histogram)
    };
}
