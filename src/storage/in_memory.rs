//! # In-Memory Failure Storage
//!
//! Thread-safe in-memory store and legacy source for testing and development.
//! The store can be switched offline to simulate an unreachable database.

use crate::storage::{
    FailureRecord, FailureStore, LegacyFailureSource, StorageError, StorageResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use uuid::Uuid;

/// In-memory failure store
#[derive(Debug)]
pub struct InMemoryFailureStore {
    records: DashMap<String, FailureRecord>,
    available: AtomicBool,
    save_calls: AtomicU64,
    prepare_calls: AtomicU64,
}

impl Default for InMemoryFailureStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFailureStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            available: AtomicBool::new(true),
            save_calls: AtomicU64::new(0),
            prepare_calls: AtomicU64::new(0),
        }
    }

    /// Toggle simulated availability; every operation fails while offline
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `save` calls, including failed ones
    pub fn save_calls(&self) -> u64 {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// Number of `prepare` calls, including failed ones
    pub fn prepare_calls(&self) -> u64 {
        self.prepare_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Direct access for tests that need to age records
    pub fn get(&self, id: &str) -> Option<FailureRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    /// Replace a record wholesale, bypassing the store contract
    pub fn put(&self, record: FailureRecord) {
        self.records.insert(record.id.clone(), record);
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::unavailable(
                self.store_name(),
                "store is offline",
            ))
        }
    }

    fn snapshot(&self) -> Vec<FailureRecord> {
        self.records.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[async_trait]
impl FailureStore for InMemoryFailureStore {
    fn store_name(&self) -> &'static str {
        "in_memory"
    }

    async fn prepare(&self) -> StorageResult<()> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()
    }

    async fn save(
        &self,
        pattern: &str,
        payload: &serde_json::Value,
        error: &str,
    ) -> StorageResult<FailureRecord> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let record = FailureRecord::new(Uuid::new_v4().to_string(), pattern, payload.clone(), error);
        self.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn import(&self, record: &FailureRecord) -> StorageResult<bool> {
        self.check_available()?;

        match self.records.entry(record.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(true)
            }
        }
    }

    async fn list_unprocessed(&self, limit: usize) -> StorageResult<Vec<FailureRecord>> {
        self.check_available()?;

        let mut records: Vec<FailureRecord> =
            self.snapshot().into_iter().filter(|r| !r.processed).collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        records.truncate(limit);
        Ok(records)
    }

    async fn list(
        &self,
        include_processed: bool,
        limit: usize,
    ) -> StorageResult<Vec<FailureRecord>> {
        self.check_available()?;

        let mut records: Vec<FailureRecord> = self
            .snapshot()
            .into_iter()
            .filter(|r| include_processed || !r.processed)
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        records.truncate(limit);
        Ok(records)
    }

    async fn find_unprocessed(&self, id: &str) -> StorageResult<Option<FailureRecord>> {
        self.check_available()?;
        Ok(self.get(id).filter(|r| !r.processed))
    }

    async fn mark_processed(&self, id: &str) -> StorageResult<bool> {
        self.check_available()?;
        Ok(self
            .records
            .get_mut(id)
            .map(|mut record| record.mark_processed())
            .unwrap_or(false))
    }

    async fn increment_retry(&self, id: &str, error: &str) -> StorageResult<FailureRecord> {
        self.check_available()?;

        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(id))?;
        record.record_retry(error);
        Ok(record.clone())
    }

    async fn delete_processed_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        self.check_available()?;

        let mut deleted = 0u64;
        self.records.retain(|_, record| {
            let expired = record.is_expired(cutoff);
            if expired {
                deleted += 1;
            }
            !expired
        });
        Ok(deleted)
    }
}

/// In-memory legacy location; `None` models a dropped table
#[derive(Debug, Default)]
pub struct InMemoryLegacySource {
    records: Mutex<Option<Vec<FailureRecord>>>,
}

impl InMemoryLegacySource {
    /// A legacy location holding `records`
    pub fn with_records(records: Vec<FailureRecord>) -> Self {
        Self {
            records: Mutex::new(Some(records)),
        }
    }

    /// A legacy location that does not exist
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn remaining(&self) -> Option<usize> {
        self.records.lock().as_ref().map(Vec::len)
    }
}

#[async_trait]
impl LegacyFailureSource for InMemoryLegacySource {
    fn source_name(&self) -> &str {
        "in_memory_legacy"
    }

    async fn exists(&self) -> StorageResult<bool> {
        Ok(self.records.lock().is_some())
    }

    async fn fetch_batch(&self, limit: usize) -> StorageResult<Vec<FailureRecord>> {
        let guard = self.records.lock();
        let Some(records) = guard.as_ref() else {
            return Ok(Vec::new());
        };

        let mut batch = records.clone();
        batch.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        batch.truncate(limit);
        Ok(batch)
    }

    async fn delete_batch(&self, ids: &[String]) -> StorageResult<u64> {
        let mut guard = self.records.lock();
        let Some(records) = guard.as_mut() else {
            return Ok(0);
        };

        let before = records.len();
        records.retain(|r| !ids.contains(&r.id));
        Ok((before - records.len()) as u64)
    }

    async fn drop_source(&self) -> StorageResult<()> {
        *self.records.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_offline_store_rejects_operations() {
        let store = InMemoryFailureStore::new();
        store.set_available(false);

        let result = store.save("menu.created", &json!({}), "err").await;
        assert!(matches!(result, Err(StorageError::Unavailable { .. })));
        assert_eq!(store.save_calls(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_increment_unknown_record() {
        let store = InMemoryFailureStore::new();
        let result = store.increment_retry("missing", "err").await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cleanup_count_is_exact_under_concurrent_saves() {
        let store = std::sync::Arc::new(InMemoryFailureStore::new());
        let cutoff = Utc::now() - chrono::Duration::days(30);
        for i in 0..200 {
            let mut record = FailureRecord::new(format!("old-{i}"), "menu.updated", json!({}), "err");
            record.processed = true;
            record.updated_at = cutoff - chrono::Duration::days(1);
            store.put(record);
        }

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    for _ in 0..200 {
                        store.save("menu.created", &json!({}), "down").await.unwrap();
                    }
                })
            })
            .collect();
        let deleted = store.delete_processed_older_than(cutoff).await.unwrap();
        for writer in writers {
            writer.await.unwrap();
        }

        assert_eq!(deleted, 200);
        assert_eq!(store.len(), 800);
    }

    #[tokio::test]
    async fn test_legacy_source_drains_and_drops() {
        let records = vec![
            FailureRecord::new("a", "menu.created", json!({}), "err"),
            FailureRecord::new("b", "menu.updated", json!({}), "err"),
        ];
        let source = InMemoryLegacySource::with_records(records);

        assert!(source.exists().await.unwrap());
        let batch = source.fetch_batch(1).await.unwrap();
        assert_eq!(batch.len(), 1);

        let ids: Vec<String> = batch.into_iter().map(|r| r.id).collect();
        assert_eq!(source.delete_batch(&ids).await.unwrap(), 1);
        assert_eq!(source.remaining(), Some(1));

        source.drop_source().await.unwrap();
        assert!(!source.exists().await.unwrap());
        assert_eq!(source.remaining(), None);
    }
}
