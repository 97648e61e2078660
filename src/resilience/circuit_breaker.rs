//! # Circuit Breaker Implementation
//!
//! Fast-fails broker delivery after repeated failed publishes so a known-down
//! broker is not hammered. Two states:
//!
//! - **Closed**: deliveries go through; failed publishes are counted.
//! - **Open**: no delivery is attempted; events are queued directly.
//!
//! The circuit opens when consecutive failed publishes reach the threshold or
//! when the connection monitor reports the connection lost. It closes when the
//! reset timeout has elapsed or the monitor sees the connection come back,
//! whichever happens first. Closing resets the failure counter.
//!
//! The breaker counts whole publishes, not individual emit attempts: the
//! publisher records one failure only after its in-call retries are spent.

use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - deliveries are attempted
    Closed = 0,
    /// Failure mode - deliveries are skipped and events queued
    Open = 1,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    metrics: CircuitBreakerMetrics,
    opened_at: Option<Instant>,
}

/// Broker circuit breaker with atomic state
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    /// Current circuit state (atomic for lock-free reads)
    state: AtomicU8,

    config: CircuitBreakerConfig,

    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            reset_timeout_ms = config.reset_timeout_ms,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            inner: Mutex::new(BreakerInner {
                metrics: CircuitBreakerMetrics::new(),
                opened_at: None,
            }),
        }
    }

    /// Raw state, without applying the reset timeout
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a delivery may be attempted now
    ///
    /// An open circuit whose reset timeout has elapsed is closed here.
    pub async fn allows_delivery(&self) -> bool {
        if self.state() == CircuitState::Closed {
            return true;
        }

        let mut inner = self.inner.lock().await;
        // Another caller may have closed it while we waited for the lock
        if self.state() == CircuitState::Closed {
            return true;
        }

        match inner.opened_at {
            Some(opened) if opened.elapsed() >= self.config.reset_timeout() => {
                self.close_locked(&mut inner, "reset timeout elapsed");
                true
            }
            Some(_) => false,
            None => {
                warn!(component = %self.name, "Circuit open but no timestamp recorded");
                self.close_locked(&mut inner, "missing open timestamp");
                true
            }
        }
    }

    /// Record a publish that reached the broker
    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.metrics.success_count += 1;
        inner.metrics.consecutive_failures = 0;

        debug!(component = %self.name, "🟢 Publish succeeded");
    }

    /// Record a publish whose in-call attempts were all spent
    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.metrics.failure_count += 1;

        if self.state() == CircuitState::Open {
            return;
        }

        inner.metrics.consecutive_failures += 1;
        warn!(
            component = %self.name,
            consecutive_failures = inner.metrics.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            "🔴 Publish failed"
        );

        if inner.metrics.consecutive_failures >= u64::from(self.config.failure_threshold) {
            self.open_locked(&mut inner, "failure threshold reached");
        }
    }

    /// Open the circuit immediately, e.g. when the broker connection is lost
    pub async fn force_open(&self, reason: &str) {
        let mut inner = self.inner.lock().await;
        if self.state() == CircuitState::Open {
            return;
        }
        warn!(component = %self.name, reason = %reason, "🚨 Circuit breaker forced open");
        self.open_locked(&mut inner, reason);
    }

    /// Close the circuit immediately, e.g. when the connection is re-established
    pub async fn force_closed(&self, reason: &str) {
        let mut inner = self.inner.lock().await;
        if self.state() == CircuitState::Closed {
            inner.metrics.consecutive_failures = 0;
            return;
        }
        self.close_locked(&mut inner, reason);
    }

    /// Get current metrics snapshot
    pub async fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock().await;
        let mut snapshot = inner.metrics.clone();
        snapshot.current_state = self.state();
        snapshot
    }

    fn open_locked(&self, inner: &mut BreakerInner, reason: &str) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        inner.opened_at = Some(Instant::now());
        inner.metrics.opened_at = Some(Utc::now());
        inner.metrics.times_opened += 1;

        error!(
            component = %self.name,
            reason = %reason,
            consecutive_failures = inner.metrics.consecutive_failures,
            reset_timeout_ms = self.config.reset_timeout_ms,
            "🔴 Circuit breaker opened (queueing events)"
        );
    }

    fn close_locked(&self, inner: &mut BreakerInner, reason: &str) {
        self.state.store(CircuitState::Closed as u8, Ordering::Release);
        inner.opened_at = None;
        inner.metrics.opened_at = None;
        inner.metrics.consecutive_failures = 0;
        inner.metrics.times_closed += 1;

        info!(
            component = %self.name,
            reason = %reason,
            "🟢 Circuit breaker closed (recovered)"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    fn config(threshold: u32, timeout_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout_ms: timeout_ms,
        }
    }

    #[tokio::test]
    async fn test_opens_at_threshold() {
        let circuit = CircuitBreaker::new("broker", config(3, 1_000));

        circuit.record_failure().await;
        circuit.record_failure().await;
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(circuit.allows_delivery().await);

        circuit.record_failure().await;
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.allows_delivery().await);

        let metrics = circuit.metrics().await;
        assert_eq!(metrics.times_opened, 1);
        assert_eq!(metrics.failure_count, 3);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let circuit = CircuitBreaker::new("broker", config(2, 1_000));

        circuit.record_failure().await;
        circuit.record_success().await;
        circuit.record_failure().await;

        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.metrics().await.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_closes_after_reset_timeout() {
        let circuit = CircuitBreaker::new("broker", config(1, 50));

        circuit.record_failure().await;
        assert!(!circuit.allows_delivery().await);

        sleep(Duration::from_millis(60)).await;

        assert!(circuit.allows_delivery().await);
        assert_eq!(circuit.state(), CircuitState::Closed);
        let metrics = circuit.metrics().await;
        assert_eq!(metrics.consecutive_failures, 0);
        assert_eq!(metrics.times_closed, 1);
    }

    #[tokio::test]
    async fn test_force_operations() {
        let circuit = CircuitBreaker::new("broker", config(5, 60_000));

        circuit.force_open("connection lost").await;
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.allows_delivery().await);

        circuit.force_closed("connection re-established").await;
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(circuit.allows_delivery().await);
    }

    #[test]
    fn test_state_from_u8_defaults_to_open() {
        assert_eq!(CircuitState::from(0), CircuitState::Closed);
        assert_eq!(CircuitState::from(1), CircuitState::Open);
        assert_eq!(CircuitState::from(9), CircuitState::Open);
    }
}
