//! # Circuit Breaker Metrics
//!
//! Counters and state snapshot for the broker circuit breaker.

use crate::resilience::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Publishes that ended in delivery
    pub success_count: u64,

    /// Publishes that exhausted their attempts
    pub failure_count: u64,

    /// Current consecutive failure count
    pub consecutive_failures: u64,

    /// Closed -> Open transitions
    pub times_opened: u64,

    /// Open -> Closed transitions
    pub times_closed: u64,

    /// When the circuit last opened, if it is open
    pub opened_at: Option<DateTime<Utc>>,

    /// Current circuit breaker state
    pub current_state: CircuitState,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            times_opened: 0,
            times_closed: 0,
            opened_at: None,
            current_state: CircuitState::Closed,
        }
    }

    /// Get human-readable state description
    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Queueing all events",
        }
    }

    /// Format metrics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Successes: {} | Failures: {} | Consecutive: {} | Opened: {}x",
            self.state_description(),
            self.success_count,
            self.failure_count,
            self.consecutive_failures,
            self.times_opened
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
