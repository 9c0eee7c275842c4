//! Observability primitives for Watchtower
//!
//! This crate provides:
//! - Head-based, deterministic sampling keyed on the request correlation id
//! - Error fingerprinting with alert deduplication and severity escalation
//! - Correlation context propagation
//! - Structured logging setup
//! - A monitor facade tying metrics, traces, alerts, health checks and logs together

pub mod correlation;
pub mod error_handling;
pub mod monitor;
pub mod sampling;
pub mod tracing_setup;

pub use correlation::*;
pub use error_handling::*;
pub use monitor::*;
pub use sampling::*;
pub use tracing_setup::*;

use thiserror::Error;
use watchtower_core::CoreError;

/// Observability errors
#[derive(Error, Debug)]
pub enum ObservabilityError {
    #[error("Invalid environment: {0} (expected development, staging or production)")]
    InvalidEnvironment(String),

    #[error("Invalid sampling rate: {0} (must be within [0.0, 1.0])")]
    InvalidRate(f64),

    #[error("Invalid alert cooldown: {0}s (must be >= 0)")]
    InvalidCooldown(f64),

    #[error("Invalid escalation threshold: {0} (must be >= 1)")]
    InvalidThreshold(u32),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Logging initialization failed: {0}")]
    LoggingInit(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ObservabilityError {
    /// True for rejected configuration values, false for internal failures
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Self::InvalidEnvironment(_)
            | Self::InvalidRate(_)
            | Self::InvalidCooldown(_)
            | Self::InvalidThreshold(_)
            | Self::Configuration(_) => true,
            Self::Core(CoreError::InvalidEnvironment(_))
            | Self::Core(CoreError::Configuration(_)) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ObservabilityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ObservabilityError::InvalidRate(1.5).is_configuration_error());
        assert!(ObservabilityError::InvalidThreshold(0).is_configuration_error());
        assert!(ObservabilityError::InvalidEnvironment("qa".into()).is_configuration_error());
        assert!(!ObservabilityError::Internal("boom".into()).is_configuration_error());
        let missing = ObservabilityError::Core(CoreError::NotFound("alert".into()));
        assert!(!missing.is_configuration_error());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ObservabilityError::InvalidRate(1.5).to_string(),
            "Invalid sampling rate: 1.5 (must be within [0.0, 1.0])"
        );
    }
}
