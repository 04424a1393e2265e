//! Configuration Error Types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating [`super::DagflowConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Explicitly requested configuration file does not exist
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// The layered sources could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// A value parsed but is out of range
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
