//! Shared fixtures for relay integration tests.

#![allow(dead_code)]

pub mod log_capture;

use std::sync::Arc;

use menu_events::config::{MonitorConfig, PublisherConfig, SchedulerConfig};
use menu_events::messaging::{ConnectionMonitor, InMemoryEventBroker};
use menu_events::resilience::{CircuitBreaker, CircuitBreakerConfig};
use menu_events::storage::{
    FailureRecord, FailureStoreChain, InMemoryFailureStore, LegacyFailureSource,
};
use menu_events::{EventPublisher, RetryScheduler};

pub use log_capture::{capture_logs, LogBuffer};

/// Knobs for [`RelayHarness`]
#[derive(Debug, Clone)]
pub struct HarnessOptions {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub max_attempts: u32,
    pub max_retries: u32,
    pub batch_size: usize,
    pub migration_batch_size: usize,
    pub retention_days: i64,
    pub broker_reachable_at_start: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            max_attempts: 3,
            max_retries: 5,
            batch_size: 50,
            migration_batch_size: 100,
            retention_days: 30,
            broker_reachable_at_start: true,
        }
    }
}

/// Publisher, monitor and scheduler wired to in-memory doubles
pub struct RelayHarness {
    pub broker: Arc<InMemoryEventBroker>,
    pub circuit: Arc<CircuitBreaker>,
    pub monitor: Arc<ConnectionMonitor>,
    pub primary: Arc<InMemoryFailureStore>,
    pub fallback: Arc<InMemoryFailureStore>,
    pub publisher: Arc<EventPublisher>,
    pub scheduler: Arc<RetryScheduler>,
}

impl RelayHarness {
    pub async fn new() -> Self {
        Self::build(HarnessOptions::default(), None).await
    }

    pub async fn with_options(options: HarnessOptions) -> Self {
        Self::build(options, None).await
    }

    pub async fn with_legacy(
        options: HarnessOptions,
        legacy: Arc<dyn LegacyFailureSource>,
    ) -> Self {
        Self::build(options, Some(legacy)).await
    }

    async fn build(options: HarnessOptions, legacy: Option<Arc<dyn LegacyFailureSource>>) -> Self {
        let broker = Arc::new(InMemoryEventBroker::new());
        broker.set_available(options.broker_reachable_at_start);

        let circuit = Arc::new(CircuitBreaker::new(
            "broker",
            CircuitBreakerConfig {
                failure_threshold: options.failure_threshold,
                reset_timeout_ms: options.reset_timeout_ms,
            },
        ));
        let monitor = Arc::new(ConnectionMonitor::new(
            broker.clone(),
            circuit.clone(),
            MonitorConfig::default(),
        ));
        monitor.check_connection().await;

        let primary = Arc::new(InMemoryFailureStore::new());
        let fallback = Arc::new(InMemoryFailureStore::new());

        let publisher = Arc::new(EventPublisher::new(
            broker.clone(),
            monitor.clone(),
            circuit.clone(),
            FailureStoreChain::two_tier(primary.clone(), fallback.clone()),
            PublisherConfig {
                max_attempts: options.max_attempts,
                retry_delay_ms: 1,
            },
        ));

        let scheduler = Arc::new(RetryScheduler::new(
            publisher.clone(),
            legacy,
            SchedulerConfig {
                max_retries: options.max_retries,
                batch_size: options.batch_size,
                migration_batch_size: options.migration_batch_size,
                retention_days: options.retention_days,
                ..SchedulerConfig::default()
            },
        ));

        Self {
            broker,
            circuit,
            monitor,
            primary,
            fallback,
            publisher,
            scheduler,
        }
    }

    /// The only pending record in the primary store
    pub async fn single_primary_record(&self) -> FailureRecord {
        use menu_events::FailureStore;

        let mut records = self.primary.list(true, 10).await.expect("list primary");
        assert_eq!(records.len(), 1, "expected exactly one primary record");
        records.remove(0)
    }
}

/// Pending record built directly, for seeding stores
pub fn pending_record(id: &str, pattern: &str, retry_count: i32) -> FailureRecord {
    let mut record = FailureRecord::new(id, pattern, serde_json::json!({"id": id}), "seeded failure");
    record.retry_count = retry_count;
    record
}
