//! Core error types

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by models, repositories and configuration loading
#[derive(Error, Debug)]
pub enum CoreError {
    /// A record failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Unknown deployment environment name
    #[error("Invalid environment: {0} (expected development, staging or production)")]
    InvalidEnvironment(String),

    /// Invalid state transition on an entity
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Entity not found in a repository
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CoreError::Validation(errors.to_string())
    }
}
