//! # Reliable Event Publisher
//!
//! Front door for domain events. `publish` never fails from the caller's point
//! of view: an event is either accepted by the broker within the call or
//! persisted through the failure store chain for the retry scheduler.
//!
//! Delivery is gated by broker readiness (from the connection monitor) and the
//! circuit breaker. Within one call the broker is tried up to
//! `max_attempts` times with a linear backoff of `retry_delay * attempt`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PublisherConfig;
use crate::constants::validate_pattern;
use crate::logging::log_delivery_operation;
use crate::messaging::{ConnectionMonitor, EventBroker, MessagingError};
use crate::resilience::{CircuitBreaker, CircuitBreakerMetrics, CircuitState};
use crate::storage::{FailureStoreChain, PersistOutcome};

const BROKER_COMPONENT: &str = "broker";

/// What happened to one published event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The broker accepted the event within the call
    Delivered,
    /// Delivery failed; the event was queued in the store at `tier`
    Queued {
        tier: usize,
        store: &'static str,
        record_id: String,
    },
    /// Delivery and every failure store failed; only the critical log remains
    Lost,
}

/// Snapshot of publisher counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublisherStats {
    pub published: u64,
    pub delivered: u64,
    /// Publishes whose in-call attempts were all spent
    pub delivery_failures: u64,
    /// Publishes skipped because the broker was not ready or the circuit open
    pub short_circuited: u64,
    pub queued_primary: u64,
    pub queued_fallback: u64,
    pub lost: u64,
    pub malformed_patterns: u64,
}

#[derive(Debug, Default)]
struct PublisherCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    delivery_failures: AtomicU64,
    short_circuited: AtomicU64,
    queued_primary: AtomicU64,
    queued_fallback: AtomicU64,
    lost: AtomicU64,
    malformed_patterns: AtomicU64,
}

impl PublisherCounters {
    fn snapshot(&self) -> PublisherStats {
        PublisherStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            short_circuited: self.short_circuited.load(Ordering::Relaxed),
            queued_primary: self.queued_primary.load(Ordering::Relaxed),
            queued_fallback: self.queued_fallback.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            malformed_patterns: self.malformed_patterns.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub struct EventPublisher {
    broker: Arc<dyn EventBroker>,
    monitor: Arc<ConnectionMonitor>,
    circuit_breaker: Arc<CircuitBreaker>,
    stores: FailureStoreChain,
    config: PublisherConfig,
    counters: PublisherCounters,
}

impl EventPublisher {
    pub fn new(
        broker: Arc<dyn EventBroker>,
        monitor: Arc<ConnectionMonitor>,
        circuit_breaker: Arc<CircuitBreaker>,
        stores: FailureStoreChain,
        config: PublisherConfig,
    ) -> Self {
        info!(
            provider = broker.provider_name(),
            max_attempts = config.max_attempts,
            retry_delay_ms = config.retry_delay_ms,
            store_tiers = stores.tiers().len(),
            "📨 Event publisher initialized"
        );

        Self {
            broker,
            monitor,
            circuit_breaker,
            stores,
            config,
            counters: PublisherCounters::default(),
        }
    }

    /// Publish an event, queueing it for retry when delivery fails
    pub async fn publish(&self, pattern: &str, payload: &serde_json::Value) -> PublishOutcome {
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        if let Err(issue) = validate_pattern(pattern) {
            self.counters.malformed_patterns.fetch_add(1, Ordering::Relaxed);
            warn!(pattern = %pattern, issue = %issue, "Publishing event with malformed pattern");
        }

        let delivery_error = match self.deliver(pattern, payload).await {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                return PublishOutcome::Delivered;
            }
            Err(e) => e,
        };

        if delivery_error.is_short_circuit() {
            self.counters.short_circuited.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.delivery_failures.fetch_add(1, Ordering::Relaxed);
        }

        match self
            .stores
            .persist(pattern, payload, &delivery_error.to_string())
            .await
        {
            PersistOutcome::Stored {
                tier,
                store,
                record,
            } => {
                if tier == 0 {
                    self.counters.queued_primary.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.queued_fallback.fetch_add(1, Ordering::Relaxed);
                }
                info!(
                    pattern = %pattern,
                    store,
                    record_id = %record.id,
                    reason = %delivery_error,
                    "📥 Event queued for retry"
                );
                PublishOutcome::Queued {
                    tier,
                    store,
                    record_id: record.id,
                }
            }
            PersistOutcome::AllFailed { .. } => {
                self.counters.lost.fetch_add(1, Ordering::Relaxed);
                PublishOutcome::Lost
            }
        }
    }

    /// Gated delivery with in-call retries, without persisting on failure
    ///
    /// A failed call counts as one failure on the circuit breaker.
    pub async fn deliver(
        &self,
        pattern: &str,
        payload: &serde_json::Value,
    ) -> Result<(), MessagingError> {
        self.deliver_with_attempts(pattern, payload, self.config.max_attempts)
            .await
    }

    /// A single gated delivery attempt
    pub async fn deliver_once(
        &self,
        pattern: &str,
        payload: &serde_json::Value,
    ) -> Result<(), MessagingError> {
        self.deliver_with_attempts(pattern, payload, 1).await
    }

    /// Whether a delivery would currently be attempted
    ///
    /// An open circuit whose reset timeout has elapsed is closed by this call.
    pub async fn is_accepting_deliveries(&self) -> bool {
        self.monitor.is_ready() && self.circuit_breaker.allows_delivery().await
    }

    pub fn is_ready(&self) -> bool {
        self.monitor.is_ready()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    pub async fn circuit_metrics(&self) -> CircuitBreakerMetrics {
        self.circuit_breaker.metrics().await
    }

    pub fn stats(&self) -> PublisherStats {
        self.counters.snapshot()
    }

    pub fn stores(&self) -> &FailureStoreChain {
        &self.stores
    }

    async fn deliver_with_attempts(
        &self,
        pattern: &str,
        payload: &serde_json::Value,
        max_attempts: u32,
    ) -> Result<(), MessagingError> {
        if let Err(e) = self.check_gates().await {
            debug!(pattern = %pattern, reason = %e, "Delivery skipped");
            self.circuit_breaker.record_failure().await;
            return Err(e);
        }

        let max_attempts = max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.broker.emit(pattern, payload).await {
                Ok(()) => {
                    self.circuit_breaker.record_success().await;
                    log_delivery_operation(pattern, attempt, max_attempts, "delivered", None);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        pattern = %pattern,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Delivery attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_delay() * attempt).await;
                    }
                }
            }
        }

        self.circuit_breaker.record_failure().await;
        let error = last_error
            .unwrap_or_else(|| MessagingError::publish(pattern, "no delivery attempt was made"));
        log_delivery_operation(
            pattern,
            max_attempts,
            max_attempts,
            "failed",
            Some(&error.to_string()),
        );
        Err(error)
    }

    async fn check_gates(&self) -> Result<(), MessagingError> {
        if !self.monitor.is_ready() {
            return Err(MessagingError::not_ready(BROKER_COMPONENT));
        }
        if !self.circuit_breaker.allows_delivery().await {
            return Err(MessagingError::circuit_open(BROKER_COMPONENT));
        }
        Ok(())
    }
}
