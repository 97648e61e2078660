//! # File Failure Store
//!
//! Filesystem-backed failure queue used when PostgreSQL itself is unreachable.
//!
//! Each record is one pretty-printed JSON document named `<id>.json` inside the
//! configured directory. Writes go to a `.tmp` sibling first and are renamed
//! into place, so a crash never leaves a half-written record behind. Mutations
//! are serialized by an async mutex; listing reads the directory without it.
//! A `.tmp` file found while that mutex is held belongs to an interrupted
//! write and is swept by the cleanup pass. Record files that fail to parse
//! are left in place for manual recovery and reported at error level.
//!
//! Ids use their own scheme, `fb-<unix millis>-<uuid>`, so they never collide
//! with primary-store ids when a replayed record is copied over.

use crate::logging::log_store_operation;
use crate::storage::{FailureRecord, FailureStore, StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

const RECORD_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

#[derive(Debug)]
pub struct FileFailureStore {
    directory: PathBuf,
    write_lock: Mutex<()>,
}

impl FileFailureStore {
    /// Create a store rooted at `directory`; the directory is created lazily
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Create the store and its directory
    pub async fn open(directory: impl Into<PathBuf>) -> StorageResult<Self> {
        let store = Self::new(directory);
        store.ensure_directory().await?;
        Ok(store)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn generate_id() -> String {
        format!(
            "fb-{}-{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple()
        )
    }

    fn record_path(&self, id: &str) -> StorageResult<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if !valid {
            return Err(StorageError::invalid_identifier(
                id,
                "file store ids may only contain letters, digits, '-' and '_'",
            ));
        }

        Ok(self.directory.join(format!("{id}.{RECORD_EXTENSION}")))
    }

    async fn ensure_directory(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| StorageError::io(&self.directory, e))
    }

    async fn write_record(&self, record: &FailureRecord) -> StorageResult<()> {
        let path = self.record_path(&record.id)?;
        let tmp_path = path.with_extension(TEMP_EXTENSION);
        let bytes = serde_json::to_vec_pretty(record)?;

        tokio::fs::write(&tmp_path, bytes)
            .await
            .map_err(|e| StorageError::io(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        Ok(())
    }

    async fn read_record(&self, id: &str) -> StorageResult<Option<FailureRecord>> {
        let path = self.record_path(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    /// Every readable record in the directory, unordered
    async fn load_all(&self) -> StorageResult<Vec<FailureRecord>> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.directory, e)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.directory, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                // Deleted between read_dir and read
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io(&path, e)),
            };

            match serde_json::from_slice::<FailureRecord>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => error!(
                    path = %path.display(),
                    error = %e,
                    "❌ Unparseable failure record file left in place; recover it manually"
                ),
            }
        }

        Ok(records)
    }

    /// Remove `.tmp` files left by interrupted writes; caller holds the write lock
    async fn sweep_temp_files(&self) -> StorageResult<u64> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::io(&self.directory, e)),
        };

        let mut swept = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.directory, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(TEMP_EXTENSION) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    warn!(path = %path.display(), "🧹 Removed partial write left by an interrupted save");
                    swept += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::io(&path, e)),
            }
        }
        Ok(swept)
    }
}

#[async_trait]
impl FailureStore for FileFailureStore {
    fn store_name(&self) -> &'static str {
        "file"
    }

    async fn save(
        &self,
        pattern: &str,
        payload: &serde_json::Value,
        error: &str,
    ) -> StorageResult<FailureRecord> {
        let _guard = self.write_lock.lock().await;
        self.ensure_directory().await?;

        let record = FailureRecord::new(Self::generate_id(), pattern, payload.clone(), error);
        self.write_record(&record).await?;

        log_store_operation("save", self.store_name(), Some(&record.id), "stored", Some(pattern));
        Ok(record)
    }

    async fn import(&self, record: &FailureRecord) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().await;
        self.ensure_directory().await?;

        if self.read_record(&record.id).await?.is_some() {
            return Ok(false);
        }
        self.write_record(record).await?;
        Ok(true)
    }

    async fn list_unprocessed(&self, limit: usize) -> StorageResult<Vec<FailureRecord>> {
        let mut records: Vec<FailureRecord> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|r| !r.processed)
            .collect();

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        records.truncate(limit);
        Ok(records)
    }

    async fn list(
        &self,
        include_processed: bool,
        limit: usize,
    ) -> StorageResult<Vec<FailureRecord>> {
        let mut records: Vec<FailureRecord> = self
            .load_all()
            .await?
            .into_iter()
            .filter(|r| include_processed || !r.processed)
            .collect();

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        records.truncate(limit);
        Ok(records)
    }

    async fn find_unprocessed(&self, id: &str) -> StorageResult<Option<FailureRecord>> {
        Ok(self.read_record(id).await?.filter(|r| !r.processed))
    }

    async fn mark_processed(&self, id: &str) -> StorageResult<bool> {
        let _guard = self.write_lock.lock().await;

        let Some(mut record) = self.read_record(id).await? else {
            return Ok(false);
        };
        if !record.mark_processed() {
            return Ok(false);
        }
        self.write_record(&record).await?;
        Ok(true)
    }

    async fn increment_retry(&self, id: &str, error: &str) -> StorageResult<FailureRecord> {
        let _guard = self.write_lock.lock().await;

        let mut record = self
            .read_record(id)
            .await?
            .ok_or_else(|| StorageError::not_found(id))?;
        record.record_retry(error);
        self.write_record(&record).await?;
        Ok(record)
    }

    async fn delete_processed_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let _guard = self.write_lock.lock().await;

        let swept = self.sweep_temp_files().await?;
        let mut deleted = 0;
        for record in self.load_all().await? {
            if !record.is_expired(cutoff) {
                continue;
            }
            let path = self.record_path(&record.id)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::io(&path, e)),
            }
        }

        debug!(
            directory = %self.directory.display(),
            deleted,
            swept,
            "🧹 File store cleanup complete"
        );
        Ok(deleted)
    }
}
