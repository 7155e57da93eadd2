//! # Structured Logging
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` plus a JSON or plain-text
//! `fmt` layer. `RUST_LOG` wins over the configured level when it is set.

use crate::core::config::{LogFormat, LoggingConfig};
use crate::core::error::{GatewayError, GatewayResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter used when `RUST_LOG` is unset
pub fn default_directives(level: &str) -> String {
    format!("catalog_gateway={},tower_http={}", level, level)
}

fn build_filter(config: &LoggingConfig) -> GatewayResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(default_directives(&config.level))
        .map_err(|e| GatewayError::config(format!("Invalid log level '{}': {}", config.level, e)))
}

/// Initialize the global subscriber. Calling it twice is not an error; the first
/// subscriber stays installed.
pub fn init_logging(config: &LoggingConfig) -> GatewayResult<()> {
    let filter = build_filter(config)?;

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init(),
    };

    if result.is_err() {
        tracing::warn!("Tracing subscriber already initialized, skipping initialization");
    }

    Ok(())
}
