//! # Connection Monitor
//!
//! Periodically verifies broker reachability, reconnecting when needed, and
//! drives the publisher's circuit breaker on connection transitions:
//! a lost connection forces the circuit open, a re-established one closes it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::messaging::EventBroker;
use crate::resilience::CircuitBreaker;
use crate::utils::{spawn_periodic, PeriodicTaskHandle};

#[derive(Debug)]
pub struct ConnectionMonitor {
    broker: Arc<dyn EventBroker>,
    circuit_breaker: Arc<CircuitBreaker>,
    config: MonitorConfig,
    ready: AtomicBool,
    checks: AtomicU64,
    reconnects: AtomicU64,
}

impl ConnectionMonitor {
    /// Create a monitor; the broker is considered not ready until the first check
    pub fn new(
        broker: Arc<dyn EventBroker>,
        circuit_breaker: Arc<CircuitBreaker>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            broker,
            circuit_breaker,
            config,
            ready: AtomicBool::new(false),
            checks: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }

    /// Whether the last check found a usable broker connection
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn checks_performed(&self) -> u64 {
        self.checks.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Check the broker once, reconnecting if the connection is down
    pub async fn check_connection(&self) -> bool {
        self.checks.fetch_add(1, Ordering::Relaxed);

        let mut connected = self.broker.is_connected().await;
        if !connected {
            match self.broker.connect().await {
                Ok(()) => {
                    self.reconnects.fetch_add(1, Ordering::Relaxed);
                    connected = true;
                }
                Err(e) => {
                    debug!(
                        provider = self.broker.provider_name(),
                        error = %e,
                        "Broker reconnect attempt failed"
                    );
                }
            }
        }

        let was_ready = self.ready.swap(connected, Ordering::AcqRel);
        match (was_ready, connected) {
            (true, false) => {
                error!(
                    provider = self.broker.provider_name(),
                    "🔌 Broker connection lost; queueing events"
                );
                self.circuit_breaker
                    .force_open("broker connection lost")
                    .await;
            }
            (false, true) => {
                info!(
                    provider = self.broker.provider_name(),
                    "🔌 Broker connection established"
                );
                self.circuit_breaker
                    .force_closed("broker connection re-established")
                    .await;
            }
            (false, false) => {
                warn!(
                    provider = self.broker.provider_name(),
                    "Broker still unreachable"
                );
            }
            (true, true) => {}
        }

        connected
    }

    /// Run `check_connection` on the configured interval
    pub fn start(self: &Arc<Self>) -> PeriodicTaskHandle {
        let monitor = Arc::clone(self);
        spawn_periodic(
            "connection_monitor",
            self.config.check_interval(),
            true,
            move || {
                let monitor = Arc::clone(&monitor);
                async move {
                    monitor.check_connection().await;
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryEventBroker;
    use crate::resilience::{CircuitBreakerConfig, CircuitState};
    use std::time::Duration;

    fn monitor_with(broker: Arc<InMemoryEventBroker>) -> (ConnectionMonitor, Arc<CircuitBreaker>) {
        let circuit = Arc::new(CircuitBreaker::new(
            "broker",
            CircuitBreakerConfig {
                failure_threshold: 5,
                reset_timeout_ms: 60_000,
            },
        ));
        let monitor = ConnectionMonitor::new(broker, circuit.clone(), MonitorConfig::default());
        (monitor, circuit)
    }

    #[tokio::test]
    async fn test_not_ready_before_first_check() {
        let broker = Arc::new(InMemoryEventBroker::new());
        let (monitor, _) = monitor_with(broker);

        assert!(!monitor.is_ready());
        assert!(monitor.check_connection().await);
        assert!(monitor.is_ready());
    }

    #[tokio::test]
    async fn test_lost_connection_opens_circuit_and_recovery_closes_it() {
        let broker = Arc::new(InMemoryEventBroker::new());
        let (monitor, circuit) = monitor_with(broker.clone());
        monitor.check_connection().await;

        broker.set_available(false);
        assert!(!monitor.check_connection().await);
        assert!(!monitor.is_ready());
        assert_eq!(circuit.state(), CircuitState::Open);

        broker.set_available(true);
        assert!(monitor.check_connection().await);
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_unreachable_at_startup_leaves_circuit_closed() {
        let broker = Arc::new(InMemoryEventBroker::new());
        broker.set_available(false);
        let (monitor, circuit) = monitor_with(broker);

        assert!(!monitor.check_connection().await);
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_background_checks_run() {
        let broker = Arc::new(InMemoryEventBroker::new());
        let circuit = Arc::new(CircuitBreaker::new("broker", CircuitBreakerConfig::default()));
        let monitor = Arc::new(ConnectionMonitor::new(
            broker,
            circuit,
            MonitorConfig {
                check_interval_ms: 100,
            },
        ));

        let handle = monitor.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.shutdown().await;

        assert!(monitor.checks_performed() >= 1);
        assert!(monitor.is_ready());
    }
}
