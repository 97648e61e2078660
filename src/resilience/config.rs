//! # Circuit Breaker Configuration
//!
//! Thresholds for the broker circuit breaker. Durations are carried as
//! milliseconds so they can be set from TOML files and environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the broker circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed publishes before the circuit opens
    pub failure_threshold: u32,

    /// Time the circuit stays open before closing on its own
    pub reset_timeout_ms: u64,
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.reset_timeout_ms == 0 {
            return Err("reset_timeout_ms must be greater than 0".to_string());
        }

        if self.reset_timeout() > Duration::from_secs(300) {
            return Err("reset_timeout_ms should not exceed 300 seconds".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
        }
    }
}
