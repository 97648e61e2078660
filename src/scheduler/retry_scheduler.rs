//! # Retry Scheduler
//!
//! Three independent periodic jobs over the failure stores:
//!
//! - **retry** drains pending records from every tier, oldest first, and
//!   re-delivers them through the publisher
//! - **cleanup** deletes processed records past the retention window
//! - **migration** moves records out of the legacy table into the primary store
//!
//! Each job is guarded by its own flag; a trigger that arrives while the same
//! job is running returns immediately with [`PassStatus::AlreadyRunning`].
//! Pass methods are plain async functions, so they can be driven directly
//! without starting the timers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::events::EventPublisher;
use crate::logging::log_scheduler_pass;
use crate::storage::{FailureRecord, FailureStore, FailureStoreChain, LegacyFailureSource};
use crate::utils::{spawn_periodic, PeriodicTaskHandle};

/// How a pass ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    #[default]
    Completed,
    /// The same job was already in progress
    AlreadyRunning,
    /// Broker not ready or circuit open; nothing was attempted
    BrokerUnavailable,
    /// Nothing to do, e.g. no legacy table configured or present
    NothingToDo,
    /// Stopped early because a store operation failed
    Aborted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryPassReport {
    pub status: PassStatus,
    /// Records read from the stores
    pub examined: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Records closed because their retry budget is spent
    pub exhausted: u64,
    /// Replayed fallback records copied into the primary store
    pub copied_to_primary: u64,
    pub store_errors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub status: PassStatus,
    pub deleted: u64,
    pub store_errors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub status: PassStatus,
    pub batches: u64,
    /// Records newly inserted into the primary store
    pub migrated: u64,
    /// Records already present in the primary store
    pub duplicates: u64,
    /// Records removed from the legacy table
    pub deleted: u64,
    pub dropped_source: bool,
}

/// A pending or processed record together with the store holding it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedMessage {
    pub store: &'static str,
    #[serde(flatten)]
    pub record: FailureRecord,
}

/// Snapshot of cumulative scheduler counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub retry_passes: u64,
    pub retried: u64,
    pub delivered: u64,
    pub exhausted: u64,
    pub cleaned: u64,
    pub migrated: u64,
    pub manual_retries: u64,
    pub skipped_passes: u64,
}

#[derive(Debug, Default)]
struct SchedulerCounters {
    retry_passes: AtomicU64,
    retried: AtomicU64,
    delivered: AtomicU64,
    exhausted: AtomicU64,
    cleaned: AtomicU64,
    migrated: AtomicU64,
    manual_retries: AtomicU64,
    skipped_passes: AtomicU64,
}

/// Clears a running flag when the pass ends, however it ends
struct PassGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Handles for the scheduler's background jobs
#[derive(Debug, Default)]
pub struct SchedulerHandle {
    tasks: Vec<PeriodicTaskHandle>,
}

impl SchedulerHandle {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stop every job after its in-flight pass finishes
    pub async fn shutdown(self) {
        join_all(self.tasks.into_iter().map(PeriodicTaskHandle::shutdown)).await;
    }
}

#[derive(Debug)]
pub struct RetryScheduler {
    publisher: Arc<EventPublisher>,
    stores: FailureStoreChain,
    legacy: Option<Arc<dyn LegacyFailureSource>>,
    config: SchedulerConfig,
    retry_running: AtomicBool,
    cleanup_running: AtomicBool,
    migration_running: AtomicBool,
    counters: SchedulerCounters,
}

impl RetryScheduler {
    /// Create a scheduler over the publisher's failure store chain
    pub fn new(
        publisher: Arc<EventPublisher>,
        legacy: Option<Arc<dyn LegacyFailureSource>>,
        config: SchedulerConfig,
    ) -> Self {
        let stores = publisher.stores().clone();
        Self {
            publisher,
            stores,
            legacy,
            config,
            retry_running: AtomicBool::new(false),
            cleanup_running: AtomicBool::new(false),
            migration_running: AtomicBool::new(false),
            counters: SchedulerCounters::default(),
        }
    }

    pub fn is_retry_running(&self) -> bool {
        self.retry_running.load(Ordering::Acquire)
    }

    pub fn is_cleanup_running(&self) -> bool {
        self.cleanup_running.load(Ordering::Acquire)
    }

    pub fn is_migration_running(&self) -> bool {
        self.migration_running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.counters;
        SchedulerStats {
            retry_passes: c.retry_passes.load(Ordering::Relaxed),
            retried: c.retried.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            exhausted: c.exhausted.load(Ordering::Relaxed),
            cleaned: c.cleaned.load(Ordering::Relaxed),
            migrated: c.migrated.load(Ordering::Relaxed),
            manual_retries: c.manual_retries.load(Ordering::Relaxed),
            skipped_passes: c.skipped_passes.load(Ordering::Relaxed),
        }
    }

    /// Run a retry pass now, e.g. from an administrative endpoint
    pub async fn trigger_retry_pass(&self) -> RetryPassReport {
        info!("🔁 Retry pass triggered manually");
        self.run_retry_pass().await
    }

    /// Drain every store tier and re-deliver pending records
    pub async fn run_retry_pass(&self) -> RetryPassReport {
        let Some(_guard) = PassGuard::acquire(&self.retry_running) else {
            debug!("Retry pass already running; trigger ignored");
            self.counters.skipped_passes.fetch_add(1, Ordering::Relaxed);
            return RetryPassReport {
                status: PassStatus::AlreadyRunning,
                ..Default::default()
            };
        };

        if !self.publisher.is_accepting_deliveries().await {
            info!(
                ready = self.publisher.is_ready(),
                circuit = ?self.publisher.circuit_state(),
                "⏸️ Broker unavailable; retry pass skipped"
            );
            self.counters.skipped_passes.fetch_add(1, Ordering::Relaxed);
            return RetryPassReport {
                status: PassStatus::BrokerUnavailable,
                ..Default::default()
            };
        }

        self.counters.retry_passes.fetch_add(1, Ordering::Relaxed);
        let mut report = RetryPassReport::default();

        'tiers: for (tier, store) in self.stores.tiers().iter().enumerate() {
            let records = match store.list_unprocessed(self.config.batch_size).await {
                Ok(records) => records,
                Err(e) => {
                    error!(store = store.store_name(), error = %e, "Failed to list pending records");
                    report.store_errors += 1;
                    continue;
                }
            };

            for record in records {
                report.examined += 1;

                if record.retry_budget_exhausted(self.config.max_retries) {
                    warn!(
                        store = store.store_name(),
                        record_id = %record.id,
                        pattern = %record.pattern,
                        retry_count = record.retry_count,
                        "Retry budget exhausted; closing record without delivery"
                    );
                    self.close_exhausted(store.as_ref(), &record.id, &mut report).await;
                    continue;
                }

                match self.publisher.deliver(&record.pattern, &record.payload).await {
                    Ok(()) => {
                        self.complete_delivery(tier, store.as_ref(), &record, &mut report)
                            .await;
                    }
                    Err(e) if e.is_short_circuit() => {
                        info!(
                            reason = %e,
                            "⏸️ Broker became unavailable; stopping retry pass"
                        );
                        report.status = PassStatus::BrokerUnavailable;
                        break 'tiers;
                    }
                    Err(e) => {
                        report.failed += 1;
                        self.counters.retried.fetch_add(1, Ordering::Relaxed);
                        match store.increment_retry(&record.id, &e.to_string()).await {
                            Ok(updated) if updated.retry_budget_exhausted(self.config.max_retries) => {
                                warn!(
                                    store = store.store_name(),
                                    record_id = %updated.id,
                                    pattern = %updated.pattern,
                                    retry_count = updated.retry_count,
                                    "Retry budget exhausted after failed redelivery"
                                );
                                self.close_exhausted(store.as_ref(), &updated.id, &mut report)
                                    .await;
                            }
                            Ok(_) => {}
                            Err(se) => {
                                error!(
                                    store = store.store_name(),
                                    record_id = %record.id,
                                    error = %se,
                                    "Failed to record retry attempt"
                                );
                                report.store_errors += 1;
                            }
                        }
                    }
                }
            }
        }

        log_scheduler_pass(
            "retry",
            None,
            report.delivered,
            report.failed,
            Some(&format!(
                "examined={} exhausted={} copied_to_primary={}",
                report.examined, report.exhausted, report.copied_to_primary
            )),
        );
        report
    }

    /// Delete processed records older than the retention window
    pub async fn run_cleanup_pass(&self) -> CleanupReport {
        let Some(_guard) = PassGuard::acquire(&self.cleanup_running) else {
            debug!("Cleanup pass already running; trigger ignored");
            return CleanupReport {
                status: PassStatus::AlreadyRunning,
                ..Default::default()
            };
        };

        let Some(cutoff) = chrono::Duration::try_days(self.config.retention_days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
        else {
            error!(
                retention_days = self.config.retention_days,
                "Retention window out of range; cleanup pass aborted"
            );
            return CleanupReport {
                status: PassStatus::Aborted,
                ..Default::default()
            };
        };
        let mut report = CleanupReport::default();

        for store in self.stores.tiers() {
            match store.delete_processed_older_than(cutoff).await {
                Ok(deleted) => {
                    report.deleted += deleted;
                    log_scheduler_pass("cleanup", Some(store.store_name()), deleted, 0, None);
                }
                Err(e) => {
                    error!(store = store.store_name(), error = %e, "Cleanup failed for store");
                    report.store_errors += 1;
                }
            }
        }

        self.counters
            .cleaned
            .fetch_add(report.deleted, Ordering::Relaxed);
        info!(
            deleted = report.deleted,
            retention_days = self.config.retention_days,
            "🧹 Cleanup pass finished"
        );
        report
    }

    /// Move legacy records into the primary store, then drop the legacy table
    ///
    /// Prepares the primary store first, so schema that could not be created
    /// at startup is retried here.
    pub async fn run_migration_pass(&self) -> MigrationReport {
        let Some(_guard) = PassGuard::acquire(&self.migration_running) else {
            debug!("Migration pass already running; trigger ignored");
            return MigrationReport {
                status: PassStatus::AlreadyRunning,
                ..Default::default()
            };
        };

        let nothing_to_do = MigrationReport {
            status: PassStatus::NothingToDo,
            ..Default::default()
        };
        let Some(primary) = self.stores.primary() else {
            return nothing_to_do;
        };
        if let Err(e) = primary.prepare().await {
            warn!(store = primary.store_name(), error = %e, "Primary store not ready; migration pass aborted");
            return MigrationReport {
                status: PassStatus::Aborted,
                ..Default::default()
            };
        }
        let Some(legacy) = self.legacy.as_ref() else {
            return nothing_to_do;
        };

        match legacy.exists().await {
            Ok(true) => {}
            Ok(false) => {
                debug!(source = legacy.source_name(), "No legacy failure table; migration skipped");
                return nothing_to_do;
            }
            Err(e) => {
                error!(source = legacy.source_name(), error = %e, "Failed to check legacy table");
                return MigrationReport {
                    status: PassStatus::Aborted,
                    ..Default::default()
                };
            }
        }

        let mut report = MigrationReport::default();
        let drained = loop {
            let batch = match legacy.fetch_batch(self.config.migration_batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(source = legacy.source_name(), error = %e, "Failed to read legacy batch");
                    break false;
                }
            };
            if batch.is_empty() {
                break true;
            }

            let mut copied = Vec::with_capacity(batch.len());
            for record in &batch {
                match primary.import(record).await {
                    Ok(true) => {
                        report.migrated += 1;
                        copied.push(record.id.clone());
                    }
                    Ok(false) => {
                        report.duplicates += 1;
                        copied.push(record.id.clone());
                    }
                    Err(e) => {
                        error!(record_id = %record.id, error = %e, "Failed to migrate legacy record");
                    }
                }
            }

            if copied.is_empty() {
                break false;
            }

            let deleted = match legacy.delete_batch(&copied).await {
                Ok(deleted) => deleted,
                Err(e) => {
                    error!(source = legacy.source_name(), error = %e, "Failed to delete migrated legacy rows");
                    break false;
                }
            };
            report.deleted += deleted;
            report.batches += 1;

            if deleted == 0 || copied.len() < batch.len() {
                break false;
            }
        };

        if drained {
            match legacy.drop_source().await {
                Ok(()) => {
                    report.dropped_source = true;
                    info!(source = legacy.source_name(), "🗑️ Legacy failure table drained and dropped");
                }
                Err(e) => {
                    error!(source = legacy.source_name(), error = %e, "Failed to drop legacy table");
                }
            }
        } else {
            report.status = PassStatus::Aborted;
        }

        self.counters
            .migrated
            .fetch_add(report.migrated, Ordering::Relaxed);
        log_scheduler_pass(
            "migration",
            Some(legacy.source_name()),
            report.migrated,
            0,
            Some(&format!(
                "batches={} duplicates={} deleted={}",
                report.batches, report.duplicates, report.deleted
            )),
        );
        report
    }

    /// Re-deliver one pending record by id with a single attempt
    ///
    /// Returns true when the record was delivered and marked processed.
    pub async fn retry_specific_message(&self, id: &str) -> bool {
        self.counters.manual_retries.fetch_add(1, Ordering::Relaxed);

        let mut found = None;
        for (tier, store) in self.stores.tiers().iter().enumerate() {
            match store.find_unprocessed(id).await {
                Ok(Some(record)) => {
                    found = Some((tier, store, record));
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(store = store.store_name(), record_id = %id, error = %e, "Lookup failed during manual retry");
                }
            }
        }

        let Some((tier, store, record)) = found else {
            warn!(record_id = %id, "Manual retry requested for unknown or processed record");
            return false;
        };

        match self.publisher.deliver_once(&record.pattern, &record.payload).await {
            Ok(()) => {
                let mut report = RetryPassReport::default();
                self.complete_delivery(tier, store.as_ref(), &record, &mut report)
                    .await;
                info!(record_id = %id, store = store.store_name(), "✅ Manual retry delivered");
                report.store_errors == 0
            }
            Err(e) if e.is_short_circuit() => {
                warn!(record_id = %id, reason = %e, "Manual retry skipped; broker unavailable");
                false
            }
            Err(e) => {
                match store.increment_retry(id, &e.to_string()).await {
                    Ok(updated) if updated.retry_budget_exhausted(self.config.max_retries) => {
                        let mut report = RetryPassReport::default();
                        self.close_exhausted(store.as_ref(), id, &mut report).await;
                    }
                    Ok(_) => {}
                    Err(se) => {
                        error!(record_id = %id, error = %se, "Failed to record manual retry attempt");
                    }
                }
                warn!(record_id = %id, error = %e, "Manual retry failed");
                false
            }
        }
    }

    /// Records from every store, newest first, at most `limit`
    pub async fn list_failed_messages(
        &self,
        include_processed: bool,
        limit: usize,
    ) -> Vec<FailedMessage> {
        let mut messages = Vec::new();
        for store in self.stores.tiers() {
            match store.list(include_processed, limit).await {
                Ok(records) => messages.extend(records.into_iter().map(|record| FailedMessage {
                    store: store.store_name(),
                    record,
                })),
                Err(e) => {
                    error!(store = store.store_name(), error = %e, "Failed to list failure records");
                }
            }
        }

        messages.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then_with(|| b.record.id.cmp(&a.record.id))
        });
        messages.truncate(limit);
        messages
    }

    /// Start the retry, cleanup and migration timers
    pub fn start(self: &Arc<Self>) -> SchedulerHandle {
        if !self.config.enabled {
            info!("Retry scheduler disabled by configuration");
            return SchedulerHandle::default();
        }

        let retry = Arc::clone(self);
        let cleanup = Arc::clone(self);
        let migration = Arc::clone(self);

        let tasks = vec![
            spawn_periodic("retry_pass", self.config.retry_interval(), false, move || {
                let scheduler = Arc::clone(&retry);
                async move {
                    scheduler.run_retry_pass().await;
                }
            }),
            spawn_periodic("cleanup_pass", self.config.cleanup_interval(), false, move || {
                let scheduler = Arc::clone(&cleanup);
                async move {
                    scheduler.run_cleanup_pass().await;
                }
            }),
            spawn_periodic(
                "migration_pass",
                self.config.migration_interval(),
                true,
                move || {
                    let scheduler = Arc::clone(&migration);
                    async move {
                        scheduler.run_migration_pass().await;
                    }
                },
            ),
        ];

        info!(
            retry_interval_seconds = self.config.retry_interval_seconds,
            cleanup_interval_seconds = self.config.cleanup_interval_seconds,
            migration_interval_seconds = self.config.migration_interval_seconds,
            "⏰ Retry scheduler started"
        );
        SchedulerHandle { tasks }
    }

    async fn complete_delivery(
        &self,
        tier: usize,
        store: &dyn FailureStore,
        record: &FailureRecord,
        report: &mut RetryPassReport,
    ) {
        report.delivered += 1;
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = store.mark_processed(&record.id).await {
            error!(
                store = store.store_name(),
                record_id = %record.id,
                error = %e,
                "Delivered record could not be marked processed; it may be delivered again"
            );
            report.store_errors += 1;
            return;
        }

        if tier > 0 {
            self.copy_to_primary(record, report).await;
        }
    }

    async fn copy_to_primary(&self, record: &FailureRecord, report: &mut RetryPassReport) {
        let Some(primary) = self.stores.primary() else {
            return;
        };

        let mut copy = record.clone();
        copy.mark_processed();
        match primary.import(&copy).await {
            Ok(_) => report.copied_to_primary += 1,
            Err(e) => {
                debug!(record_id = %record.id, error = %e, "Primary store unavailable for audit copy");
            }
        }
    }

    async fn close_exhausted(&self, store: &dyn FailureStore, id: &str, report: &mut RetryPassReport) {
        match store.mark_processed(id).await {
            Ok(_) => {
                report.exhausted += 1;
                self.counters.exhausted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!(store = store.store_name(), record_id = %id, error = %e, "Failed to close exhausted record");
                report.store_errors += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_guard_is_exclusive_and_releases() {
        let flag = AtomicBool::new(false);

        let guard = PassGuard::acquire(&flag);
        assert!(guard.is_some());
        assert!(PassGuard::acquire(&flag).is_none());

        drop(guard);
        assert!(!flag.load(Ordering::SeqCst));
        assert!(PassGuard::acquire(&flag).is_some());
    }

    #[test]
    fn test_failed_message_serializes_flat() {
        let record = FailureRecord::new("r1", "menu.created", serde_json::json!({"id": "m1"}), "down");
        let message = FailedMessage {
            store: "postgres",
            record,
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["store"], "postgres");
        assert_eq!(value["pattern"], "menu.created");
        assert_eq!(value["retry_count"], 0);
    }
}
