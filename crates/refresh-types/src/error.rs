//! Error types shared across the refresh system.

use thiserror::Error;

/// Errors raised while loading or validating process-wide state.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<config::ConfigError> for RefreshError {
    fn from(err: config::ConfigError) -> Self {
        RefreshError::Config(err.to_string())
    }
}
