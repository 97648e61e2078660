//! # Failure Storage
//!
//! Durable queues for events whose delivery failed.
//!
//! Every backend implements [`FailureStore`]. The publisher writes through a
//! [`FailureStoreChain`], an ordered list of stores tried in turn until one
//! accepts the record:
//!
//! - [`PostgresFailureStore`] - the system of record
//! - [`FileFailureStore`] - one JSON document per record, used when PostgreSQL
//!   is unreachable
//! - [`InMemoryFailureStore`] - testing and local development
//!
//! The retry scheduler drains every tier of the chain with the same algorithm.

pub mod chain;
pub mod errors;
pub mod file;
pub mod in_memory;
pub mod legacy;
pub mod postgres;
pub mod record;

pub use chain::{FailureStoreChain, PersistOutcome};
pub use errors::{StorageError, StorageResult};
pub use file::FileFailureStore;
pub use in_memory::{InMemoryFailureStore, InMemoryLegacySource};
pub use legacy::{LegacyFailureSource, PostgresLegacyTable};
pub use postgres::PostgresFailureStore;
pub use record::{FailureRecord, LastError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Contract shared by every failure store backend
///
/// Each mutation is a single atomic update keyed by id, so callers may invoke
/// these concurrently with a running retry pass.
#[async_trait]
pub trait FailureStore: Send + Sync + std::fmt::Debug + 'static {
    /// Short backend name used in logs and reports
    fn store_name(&self) -> &'static str;

    /// Bring the backend to a usable state, e.g. create missing schema
    ///
    /// Called at startup and again before each migration pass, so a backend
    /// that was unreachable at launch catches up once it comes back.
    async fn prepare(&self) -> StorageResult<()> {
        Ok(())
    }

    /// Persist a new pending record
    async fn save(
        &self,
        pattern: &str,
        payload: &serde_json::Value,
        error: &str,
    ) -> StorageResult<FailureRecord>;

    /// Insert an existing record unchanged; returns false when the id is
    /// already present
    async fn import(&self, record: &FailureRecord) -> StorageResult<bool>;

    /// Pending records, oldest `created_at` first, at most `limit`
    async fn list_unprocessed(&self, limit: usize) -> StorageResult<Vec<FailureRecord>>;

    /// Records newest first, optionally including processed ones
    async fn list(&self, include_processed: bool, limit: usize)
        -> StorageResult<Vec<FailureRecord>>;

    /// Look up a pending record by id
    async fn find_unprocessed(&self, id: &str) -> StorageResult<Option<FailureRecord>>;

    /// Mark a record processed; false when it does not exist or already was
    async fn mark_processed(&self, id: &str) -> StorageResult<bool>;

    /// Bump `retry_count` and capture the error
    async fn increment_retry(&self, id: &str, error: &str) -> StorageResult<FailureRecord>;

    /// Delete processed records whose `updated_at` is before `cutoff`
    async fn delete_processed_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;
}
