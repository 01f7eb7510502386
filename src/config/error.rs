//! Configuration errors

use thiserror::Error;

/// Failures while loading or validating [`DispatcherConfig`](super::DispatcherConfig)
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// A source could not be read or did not deserialize
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Explicitly requested configuration file does not exist
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// A field holds a value outside its allowed range
    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl ConfigurationError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
