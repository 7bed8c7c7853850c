//! Tracing subscriber setup.
//!
//! Installs a global registry with an `EnvFilter` and either a pretty or a
//! JSON formatting layer.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::{TelemetryConfig, TelemetryError};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_level`. Fails with
/// [`TelemetryError::TracerInit`] if a global subscriber is already set.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::TracerInit(e.to_string()))?;

    let fmt_layer = if !config.console_output {
        None
    } else if config.json_logs {
        // JSON output for containers/production
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        )
    } else {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(true)
                .boxed(),
        )
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::TracerInit(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "tracing initialized"
    );

    Ok(())
}
