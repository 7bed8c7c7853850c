//! Prometheus metrics for the encryption pipeline.
//!
//! All metrics follow the naming convention: `etx_<area>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Instant;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PIPELINE STAGES
    // =========================================================================

    /// Stage outcomes. stage: key_fetch/encrypt/submit, outcome: ok/error kind
    pub static ref STAGE_OUTCOMES: IntCounterVec = IntCounterVec::new(
        Opts::new("etx_pipeline_stage_total", "Pipeline stage executions by outcome"),
        &["stage", "outcome"]
    ).expect("metric creation failed");

    /// Stage latency
    pub static ref STAGE_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "etx_pipeline_stage_duration_seconds",
            "Time spent in each pipeline stage"
        ).buckets(exponential_buckets(0.001, 2.0, 15).expect("valid buckets")),
        &["stage"]
    ).expect("metric creation failed");

    /// Transactions accepted by the node
    pub static ref TRANSACTIONS_SUBMITTED: IntCounter = IntCounter::new(
        "etx_transactions_submitted_total",
        "Encrypted transactions accepted by the node"
    ).expect("metric creation failed");

    // =========================================================================
    // ENCRYPTION MODULE
    // =========================================================================

    /// Module instances created
    pub static ref MODULE_INSTANCES: IntCounter = IntCounter::new(
        "etx_module_instances_total",
        "Encryption module instances created"
    ).expect("metric creation failed");

    /// Buffers allocated inside module memory
    pub static ref MODULE_BUFFERS_ALLOCATED: IntCounter = IntCounter::new(
        "etx_module_buffers_allocated_total",
        "Input buffers allocated in encryption module memory"
    ).expect("metric creation failed");

    /// Buffers released back to the module
    pub static ref MODULE_BUFFERS_FREED: IntCounter = IntCounter::new(
        "etx_module_buffers_freed_total",
        "Input buffers released back to the encryption module"
    ).expect("metric creation failed");
}

static REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();

/// Register all metrics with the global registry.
///
/// Idempotent: later calls return the outcome of the first registration,
/// including its error.
pub fn register_metrics() -> Result<(), TelemetryError> {
    registration_outcome(&REGISTERED, &REGISTRY)
}

fn registration_outcome(
    outcome: &OnceLock<Result<(), String>>,
    registry: &Registry,
) -> Result<(), TelemetryError> {
    outcome
        .get_or_init(|| register_all(registry))
        .clone()
        .map_err(TelemetryError::MetricsInit)
}

fn register_all(registry: &Registry) -> Result<(), String> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(STAGE_OUTCOMES.clone()),
        Box::new(STAGE_DURATION.clone()),
        Box::new(TRANSACTIONS_SUBMITTED.clone()),
        Box::new(MODULE_INSTANCES.clone()),
        Box::new(MODULE_BUFFERS_ALLOCATED.clone()),
        Box::new(MODULE_BUFFERS_FREED.clone()),
    ];

    for metric in metrics {
        registry.register(metric).map_err(|e| e.to_string())?;
    }
    Ok(())
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

/// Record the outcome of a pipeline stage.
pub fn record_stage(stage: &str, outcome: &str) {
    STAGE_OUTCOMES.with_label_values(&[stage, outcome]).inc();
}

/// Timer guard observing a stage duration on drop.
pub struct StageTimer {
    stage: &'static str,
    start: Instant,
}

impl StageTimer {
    /// Start timing `stage`.
    pub fn start(stage: &'static str) -> Self {
        Self {
            stage,
            start: Instant::now(),
        }
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        STAGE_DURATION
            .with_label_values(&[self.stage])
            .observe(self.start.elapsed().as_secs_f64());
    }
}
