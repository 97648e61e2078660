//! # PostgreSQL Failure Store
//!
//! Primary failure queue and system of record.
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE event_failures (
//!   id TEXT PRIMARY KEY,
//!   pattern TEXT NOT NULL,
//!   payload JSONB NOT NULL,
//!   retry_count INTEGER NOT NULL DEFAULT 0,
//!   processed BOOLEAN NOT NULL DEFAULT false,
//!   last_error_message TEXT,
//!   last_error_at TIMESTAMPTZ,
//!   created_at TIMESTAMPTZ NOT NULL,
//!   updated_at TIMESTAMPTZ NOT NULL,
//!   version INTEGER NOT NULL DEFAULT 0
//! );
//! ```
//!
//! Indexed by `(pattern, processed)` and `(created_at)`. The table name is
//! configurable, so queries are built with `format!` after the name has been
//! validated as a plain SQL identifier.

use crate::config::StorageConfig;
use crate::logging::log_store_operation;
use crate::storage::{FailureRecord, FailureStore, LastError, StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

pub(crate) const RECORD_COLUMNS: &str = "id, pattern, payload, retry_count, processed, \
     last_error_message, last_error_at, created_at, updated_at, version";

/// Row shape shared by the current and legacy tables
#[derive(Debug, FromRow)]
pub(crate) struct FailureRow {
    pub id: String,
    pub pattern: String,
    pub payload: serde_json::Value,
    pub retry_count: i32,
    pub processed: bool,
    pub last_error_message: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

impl From<FailureRow> for FailureRecord {
    fn from(row: FailureRow) -> Self {
        let last_error = match (row.last_error_message, row.last_error_at) {
            (Some(message), Some(occurred_at)) => Some(LastError {
                message,
                occurred_at,
            }),
            (Some(message), None) => Some(LastError {
                message,
                occurred_at: row.updated_at,
            }),
            _ => None,
        };

        FailureRecord {
            id: row.id,
            pattern: row.pattern,
            payload: row.payload,
            retry_count: row.retry_count,
            processed: row.processed,
            last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        }
    }
}

/// Reject anything that is not a plain lowercase SQL identifier
pub(crate) fn validate_table_name(name: &str) -> StorageResult<()> {
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .map(|c| c.is_ascii_lowercase() || c == '_')
        .unwrap_or(false);

    if !first_ok {
        return Err(StorageError::invalid_identifier(
            name,
            "must start with a lowercase letter or underscore",
        ));
    }

    if name.len() > 63 {
        return Err(StorageError::invalid_identifier(
            name,
            "must not exceed 63 characters",
        ));
    }

    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(StorageError::invalid_identifier(
            name,
            "may only contain lowercase letters, digits and underscores",
        ));
    }

    Ok(())
}

/// PostgreSQL-backed failure store
#[derive(Debug, Clone)]
pub struct PostgresFailureStore {
    pool: PgPool,
    table: String,
    schema_ready: Arc<AtomicBool>,
}

impl PostgresFailureStore {
    /// Wrap an existing pool
    pub fn new(pool: PgPool, table: impl Into<String>) -> StorageResult<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            pool,
            table,
            schema_ready: Arc::new(AtomicBool::new(false)),
        })
    }

    fn pool_options(config: &StorageConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
    }

    /// Build a pool that connects on first use
    ///
    /// Never touches the network, so the store can join the chain while
    /// PostgreSQL is still down; each call then fails over to the next tier
    /// until the database is reachable.
    pub fn connect_lazy(config: &StorageConfig) -> StorageResult<Self> {
        let options: PgConnectOptions = config.database_url.parse()?;
        info!(
            table = %config.failure_table,
            max_connections = config.max_connections,
            "🚀 Failure store bound to PostgreSQL (lazy connect)"
        );

        let pool = Self::pool_options(config).connect_lazy_with(options);
        Self::new(pool, config.failure_table.clone())
    }

    /// Open a connection pool from configuration, failing if unreachable
    pub async fn connect(config: &StorageConfig) -> StorageResult<Self> {
        info!(
            table = %config.failure_table,
            max_connections = config.max_connections,
            "🚀 Connecting failure store to PostgreSQL"
        );

        let pool = Self::pool_options(config)
            .connect(&config.database_url)
            .await?;

        Self::new(pool, config.failure_table.clone())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Whether `ensure_schema` has succeeded on this store
    pub fn is_schema_ready(&self) -> bool {
        self.schema_ready.load(Ordering::Acquire)
    }

    /// Create the failure table and its indexes if missing
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        let table = &self.table;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                pattern TEXT NOT NULL,
                payload JSONB NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                processed BOOLEAN NOT NULL DEFAULT false,
                last_error_message TEXT,
                last_error_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                version INTEGER NOT NULL DEFAULT 0
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {table}_pattern_processed_idx ON {table} (pattern, processed)"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {table}_created_at_idx ON {table} (created_at)"
        ))
        .execute(&self.pool)
        .await?;

        self.schema_ready.store(true, Ordering::Release);
        debug!(table = %table, "✅ Failure store schema ensured");
        Ok(())
    }
}

#[async_trait]
impl FailureStore for PostgresFailureStore {
    fn store_name(&self) -> &'static str {
        "postgres"
    }

    async fn prepare(&self) -> StorageResult<()> {
        if self.is_schema_ready() {
            return Ok(());
        }
        self.ensure_schema().await
    }

    async fn save(
        &self,
        pattern: &str,
        payload: &serde_json::Value,
        error: &str,
    ) -> StorageResult<FailureRecord> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let row = sqlx::query_as::<_, FailureRow>(&format!(
            r#"
            INSERT INTO {} (
                id, pattern, payload, retry_count, processed,
                last_error_message, last_error_at, created_at, updated_at, version
            )
            VALUES ($1, $2, $3, 0, false, $4, $5, $5, $5, 0)
            RETURNING {RECORD_COLUMNS}
            "#,
            self.table
        ))
        .bind(&id)
        .bind(pattern)
        .bind(payload)
        .bind(error)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        log_store_operation("save", self.store_name(), Some(&id), "stored", Some(pattern));
        Ok(row.into())
    }

    async fn import(&self, record: &FailureRecord) -> StorageResult<bool> {
        let (last_error_message, last_error_at) = match &record.last_error {
            Some(err) => (Some(err.message.as_str()), Some(err.occurred_at)),
            None => (None, None),
        };

        let result = sqlx::query(&format!(
            r#"
            INSERT INTO {} (
                id, pattern, payload, retry_count, processed,
                last_error_message, last_error_at, created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
            self.table
        ))
        .bind(&record.id)
        .bind(&record.pattern)
        .bind(&record.payload)
        .bind(record.retry_count)
        .bind(record.processed)
        .bind(last_error_message)
        .bind(last_error_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_unprocessed(&self, limit: usize) -> StorageResult<Vec<FailureRecord>> {
        let rows = sqlx::query_as::<_, FailureRow>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM {}
            WHERE processed = false
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#,
            self.table
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FailureRecord::from).collect())
    }

    async fn list(
        &self,
        include_processed: bool,
        limit: usize,
    ) -> StorageResult<Vec<FailureRecord>> {
        let filter = if include_processed {
            ""
        } else {
            "WHERE processed = false"
        };

        let rows = sqlx::query_as::<_, FailureRow>(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM {}
            {filter}
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
            self.table
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FailureRecord::from).collect())
    }

    async fn find_unprocessed(&self, id: &str) -> StorageResult<Option<FailureRecord>> {
        let row = sqlx::query_as::<_, FailureRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM {} WHERE id = $1 AND processed = false",
            self.table
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FailureRecord::from))
    }

    async fn mark_processed(&self, id: &str) -> StorageResult<bool> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET processed = true, updated_at = $2, version = version + 1
            WHERE id = $1 AND processed = false
            "#,
            self.table
        ))
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_retry(&self, id: &str, error: &str) -> StorageResult<FailureRecord> {
        let row = sqlx::query_as::<_, FailureRow>(&format!(
            r#"
            UPDATE {}
            SET retry_count = retry_count + 1,
                last_error_message = $2,
                last_error_at = $3,
                updated_at = $3,
                version = version + 1
            WHERE id = $1
            RETURNING {RECORD_COLUMNS}
            "#,
            self.table
        ))
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(FailureRecord::from)
            .ok_or_else(|| StorageError::not_found(id))
    }

    async fn delete_processed_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE processed = true AND updated_at < $1",
            self.table
        ))
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("event_failures").is_ok());
        assert!(validate_table_name("_legacy2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2fast").is_err());
        assert!(validate_table_name("Failed").is_err());
        assert!(validate_table_name("x; DROP TABLE users").is_err());
        assert!(validate_table_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_row_conversion_keeps_error_timestamp() {
        let now = Utc::now();
        let row = FailureRow {
            id: "abc".to_string(),
            pattern: "menu.created".to_string(),
            payload: serde_json::json!({"id": "m1"}),
            retry_count: 2,
            processed: false,
            last_error_message: Some("boom".to_string()),
            last_error_at: Some(now),
            created_at: now,
            updated_at: now,
            version: 2,
        };

        let record = FailureRecord::from(row);
        assert_eq!(record.retry_count, 2);
        assert_eq!(
            record.last_error,
            Some(LastError {
                message: "boom".to_string(),
                occurred_at: now
            })
        );
    }
}
