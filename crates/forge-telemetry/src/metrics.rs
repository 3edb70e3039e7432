//! Prometheus metrics for the Forge pipeline.
//!
//! All metrics follow the naming convention: `forge_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g. events_published_total)
//! - **Gauge**: Value that can go up or down (e.g. pending_handlers)
//! - **Histogram**: Distribution of values (e.g. llm_request_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // EVENT BUS
    // =========================================================================

    /// Events published, by topic
    pub static ref BUS_EVENTS_PUBLISHED: CounterVec = CounterVec::new(
        Opts::new("forge_bus_events_published_total", "Total events published to the bus"),
        &["topic"]
    ).expect("metric creation failed");

    /// Handler invocations that returned an error or panicked
    pub static ref BUS_HANDLER_FAILURES: CounterVec = CounterVec::new(
        Opts::new("forge_bus_handler_failures_total", "Total failed handler invocations"),
        &["topic", "kind"]  // kind: error/panic
    ).expect("metric creation failed");

    /// Handler invocations currently in flight
    pub static ref BUS_PENDING_HANDLERS: Gauge = Gauge::new(
        "forge_bus_pending_handlers",
        "Number of handler invocations in flight"
    ).expect("metric creation failed");

    // =========================================================================
    // LLM
    // =========================================================================

    /// LLM requests by final outcome
    pub static ref LLM_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("forge_llm_requests_total", "Total LLM completions by outcome"),
        &["outcome"]  // outcome: success/failure/cancelled
    ).expect("metric creation failed");

    /// Retries performed after transient LLM failures
    pub static ref LLM_RETRIES: Counter = Counter::new(
        "forge_llm_retries_total",
        "Total LLM request retries"
    ).expect("metric creation failed");

    /// LLM request latency, including rate-limit waits and retries
    pub static ref LLM_REQUEST_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "forge_llm_request_duration_seconds",
            "Time spent in LLM completions"
        ).buckets(exponential_buckets(0.05, 2.0, 12).expect("valid buckets"))
    ).expect("metric creation failed");

    // =========================================================================
    // STAGES
    // =========================================================================

    /// Units of work for which a stage withheld its output
    pub static ref STAGE_SKIPS: CounterVec = CounterVec::new(
        Opts::new("forge_stage_skips_total", "Total units of work withheld by a stage"),
        &["stage"]
    ).expect("metric creation failed");
}

/// Handle proving metrics were registered.
#[derive(Debug, Clone, Copy)]
pub struct MetricsHandle {
    _registered: (),
}

/// Register all metrics with the global registry.
///
/// Call once at start-up. A second call fails with `MetricsInit`.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Event bus
        Box::new(BUS_EVENTS_PUBLISHED.clone()),
        Box::new(BUS_HANDLER_FAILURES.clone()),
        Box::new(BUS_PENDING_HANDLERS.clone()),
        // LLM
        Box::new(LLM_REQUESTS.clone()),
        Box::new(LLM_RETRIES.clone()),
        Box::new(LLM_REQUEST_DURATION.clone()),
        // Stages
        Box::new(STAGE_SKIPS.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle { _registered: () })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
