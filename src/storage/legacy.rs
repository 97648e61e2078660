//! # Legacy Failure Source
//!
//! Failure records left behind under a prior storage-naming scheme. The
//! migration pass copies them into the current store and removes the legacy
//! location once it is drained.

use crate::storage::postgres::{validate_table_name, FailureRow, RECORD_COLUMNS};
use crate::storage::{FailureRecord, StorageResult};
use async_trait::async_trait;
use sqlx::PgPool;

/// A storage location that only ever drains
#[async_trait]
pub trait LegacyFailureSource: Send + Sync + std::fmt::Debug + 'static {
    fn source_name(&self) -> &str;

    /// Whether the legacy location still exists
    async fn exists(&self) -> StorageResult<bool>;

    /// Oldest records first, at most `limit`
    async fn fetch_batch(&self, limit: usize) -> StorageResult<Vec<FailureRecord>>;

    /// Remove records that were copied
    async fn delete_batch(&self, ids: &[String]) -> StorageResult<u64>;

    /// Remove the legacy location itself
    async fn drop_source(&self) -> StorageResult<()>;
}

/// Legacy PostgreSQL table with the same column layout as the current one
#[derive(Debug, Clone)]
pub struct PostgresLegacyTable {
    pool: PgPool,
    table: String,
}

impl PostgresLegacyTable {
    pub fn new(pool: PgPool, table: impl Into<String>) -> StorageResult<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self { pool, table })
    }
}

#[async_trait]
impl LegacyFailureSource for PostgresLegacyTable {
    fn source_name(&self) -> &str {
        &self.table
    }

    async fn exists(&self) -> StorageResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )
            "#,
        )
        .bind(&self.table)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn fetch_batch(&self, limit: usize) -> StorageResult<Vec<FailureRecord>> {
        let rows = sqlx::query_as::<_, FailureRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM {} ORDER BY created_at ASC, id ASC LIMIT $1",
            self.table
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FailureRecord::from).collect())
    }

    async fn delete_batch(&self, ids: &[String]) -> StorageResult<u64> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ANY($1)", self.table))
            .bind(ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn drop_source(&self) -> StorageResult<()> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
