//! Configuration Error Types
//!
//! Error handling for configuration loading and validation, with specific,
//! actionable messages for each failure scenario.

use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Layered sources could not be read or merged
    #[error("Failed to load configuration for environment '{environment}': {error}")]
    LoadError { environment: String, error: String },

    /// Merged configuration did not match the expected structure
    #[error("Failed to deserialize configuration: {error}")]
    DeserializationError { error: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// Configuration validation errors
    #[error("Configuration validation failed in [{section}]: {error}")]
    ValidationError { section: String, error: String },
}

impl ConfigurationError {
    /// Create a load error
    pub fn load_error(environment: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::LoadError {
            environment: environment.into(),
            error: error.to_string(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            context: context.into(),
        }
    }

    /// Create a validation error for one config section
    pub fn validation_error(section: impl Into<String>, error: impl Into<String>) -> Self {
        Self::ValidationError {
            section: section.into(),
            error: error.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(err: config::ConfigError) -> Self {
        ConfigurationError::DeserializationError {
            error: err.to_string(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;
