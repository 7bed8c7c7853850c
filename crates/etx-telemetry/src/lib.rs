//! # etx Telemetry
//!
//! Logging and metrics shared by the etx crates.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` registry, pretty or JSON output
//! - **Metrics**: Prometheus counters and histograms for pipeline stages
//!
//! ## Usage
//!
//! ```rust,ignore
//! use etx_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     init_telemetry(&TelemetryConfig::from_env()).expect("telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `ETX_SERVICE_NAME` | `etx` | Service name in logs |
//! | `ETX_LOG_LEVEL` | `info` | Log level filter |
//! | `ETX_JSON_LOGS` | `false` | JSON log output |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_tracing;
pub use metrics::{encode_metrics, record_stage, register_metrics, StageTimer};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("failed to initialize tracing: {0}")]
    TracerInit(String),

    #[error("failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Register metrics and install the tracing subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_tracing(config)
}
