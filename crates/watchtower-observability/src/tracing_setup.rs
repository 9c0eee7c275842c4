//! Structured logging setup
//!
//! Installs a global `tracing` subscriber configured from [`LoggingSettings`].

use crate::{ObservabilityError, Result};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use watchtower_core::{LoggingSettings, ObservabilityConfig};

/// Environment filter: `RUST_LOG` when set, otherwise the configured level
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<()> {
    let subscriber = tracing_subscriber::registry().with(build_filter(&settings.level));

    if settings.json {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        subscriber
            .with(fmt_layer)
            .try_init()
            .map_err(|e| ObservabilityError::LoggingInit(e.to_string()))?;
    } else {
        let mut layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false);

        if settings.span_events {
            layer = layer.with_span_events(FmtSpan::ENTER | FmtSpan::EXIT);
        }

        if !settings.colored {
            layer = layer.with_ansi(false);
        }

        subscriber
            .with(layer)
            .try_init()
            .map_err(|e| ObservabilityError::LoggingInit(e.to_string()))?;
    }

    Ok(())
}

/// Install logging from a full configuration and announce the service
pub fn init_from_config(config: &ObservabilityConfig) -> Result<()> {
    init_logging(&config.logging)?;

    tracing::info!(
        service = %config.service_name,
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "Logging initialized"
    );

    Ok(())
}

/// Parse a level name, defaulting to INFO
pub fn get_log_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
