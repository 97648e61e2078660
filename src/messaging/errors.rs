//! # Messaging Error Types
//!
//! Structured broker error types using thiserror instead of
//! `Box<dyn Error>` patterns.

use thiserror::Error;

/// Broker and delivery errors
#[derive(Error, Debug, Clone)]
pub enum MessagingError {
    #[error("Broker connection error: {message}")]
    Connection { message: String },

    #[error("Publish failed for pattern {pattern}: {message}")]
    Publish { pattern: String, message: String },

    #[error("Broker not ready: {component}")]
    NotReady { component: String },

    #[error("Circuit breaker is open for component: {component}")]
    CircuitOpen { component: String },

    #[error("Message serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },
}

impl MessagingError {
    /// Create a broker connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a publish error
    pub fn publish(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Create a not-ready error
    pub fn not_ready(component: impl Into<String>) -> Self {
        Self::NotReady {
            component: component.into(),
        }
    }

    /// Create a circuit breaker open error
    pub fn circuit_open(component: impl Into<String>) -> Self {
        Self::CircuitOpen {
            component: component.into(),
        }
    }

    /// Create a message serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// True when delivery was skipped without touching the network
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, Self::NotReady { .. } | Self::CircuitOpen { .. })
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::serialization(err.to_string())
    }
}

impl From<lapin::Error> for MessagingError {
    fn from(err: lapin::Error) -> Self {
        MessagingError::connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_circuit_classification() {
        assert!(MessagingError::not_ready("broker").is_short_circuit());
        assert!(MessagingError::circuit_open("broker").is_short_circuit());
        assert!(!MessagingError::publish("menu.created", "timeout").is_short_circuit());
        assert!(!MessagingError::connection("refused").is_short_circuit());
    }

    #[test]
    fn test_error_display() {
        let err = MessagingError::publish("menu.created", "channel closed");
        assert_eq!(
            err.to_string(),
            "Publish failed for pattern menu.created: channel closed"
        );
    }
}
