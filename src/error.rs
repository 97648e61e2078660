//! # Relay Error Types
//!
//! Crate-level error that aggregates the component error types. Component code
//! returns its own error (`MessagingError`, `StorageError`, `ConfigurationError`);
//! [`crate::bootstrap`] and the relay binary work with `RelayError`.

use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

pub type RelayResult<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_errors_convert() {
        let err: RelayError = MessagingError::connection("refused").into();
        assert!(matches!(err, RelayError::Messaging(_)));
        assert!(err.to_string().contains("refused"));

        let err: RelayError = StorageError::not_found("abc").into();
        assert!(matches!(err, RelayError::Storage(_)));
        assert!(err.to_string().contains("abc"));
    }
}
