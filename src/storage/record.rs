//! # Failure Record
//!
//! Durable representation of one event whose delivery has not been confirmed.
//!
//! A record is created by the publisher once its in-call attempts are spent and
//! is mutated afterwards only by the retry scheduler. `retry_count` only grows,
//! and a record with `processed = true` is never retried again; it stays around
//! for audit until cleanup removes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last captured delivery error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastError {
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl LastError {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// One queued event awaiting redelivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Opaque identifier assigned by the store that persisted the record
    pub id: String,
    /// Event pattern, e.g. `menu.created`
    pub pattern: String,
    /// Event payload, replayed exactly as received
    pub payload: serde_json::Value,
    pub retry_count: i32,
    pub processed: bool,
    pub last_error: Option<LastError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Incremented on every mutation
    pub version: i32,
}

impl FailureRecord {
    /// Build a fresh pending record
    pub fn new(
        id: impl Into<String>,
        pattern: impl Into<String>,
        payload: serde_json::Value,
        error: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            pattern: pattern.into(),
            payload,
            retry_count: 0,
            processed: false,
            last_error: Some(LastError {
                message: error.to_string(),
                occurred_at: now,
            }),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// True once the scheduler-level retry budget is spent
    pub fn retry_budget_exhausted(&self, max_retries: u32) -> bool {
        self.retry_count >= 0 && self.retry_count as u32 >= max_retries
    }

    /// Record one more failed re-attempt
    pub fn record_retry(&mut self, error: &str) {
        let now = Utc::now();
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(LastError {
            message: error.to_string(),
            occurred_at: now,
        });
        self.touch(now);
    }

    /// Flip to processed; returns false if it already was
    pub fn mark_processed(&mut self) -> bool {
        if self.processed {
            return false;
        }
        self.processed = true;
        self.touch(Utc::now());
        true
    }

    /// Processed and last touched before `cutoff`
    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        self.processed && self.updated_at < cutoff
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version = self.version.saturating_add(1);
    }
}
