//! # Storage Error Types
//!
//! Errors raised by failure stores. Conversions from `sqlx` and `serde_json`
//! keep the store implementations free of manual mapping; file I/O errors go
//! through [`StorageError::io`] so they carry the offending path.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("File store I/O error: {path}: {message}")]
    Io { path: String, message: String },

    #[error("Record serialization error: {message}")]
    Serialization { message: String },

    #[error("Failure record not found: {id}")]
    NotFound { id: String },

    #[error("Invalid identifier: {identifier}: {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    #[error("Store unavailable: {store}: {message}")]
    Unavailable { store: String, message: String },
}

impl StorageError {
    /// Create a database query error
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a file I/O error tied to a path
    pub fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an invalid identifier error
    pub fn invalid_identifier(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Create an unavailable error
    pub fn unavailable(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            store: store.into(),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::database("query", "No rows found"),
            sqlx::Error::Database(db_err) => StorageError::database("database", db_err.to_string()),
            sqlx::Error::PoolTimedOut => StorageError::DatabaseConnection {
                message: "Timed out acquiring a database connection".to_string(),
            },
            sqlx::Error::PoolClosed => StorageError::DatabaseConnection {
                message: "Database pool is closed".to_string(),
            },
            _ => StorageError::DatabaseConnection {
                message: err.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization {
            message: err.to_string(),
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
