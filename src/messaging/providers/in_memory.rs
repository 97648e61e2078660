//! # In-Memory Event Broker
//!
//! Records emitted events for inspection. Failures and outages can be
//! scripted so delivery paths can be exercised without a running broker.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::messaging::{EventBroker, MessagingError};

/// One event accepted by the in-memory broker
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    pub pattern: String,
    pub payload: serde_json::Value,
    pub emitted_at: DateTime<Utc>,
}

/// In-memory broker for testing
#[derive(Debug)]
pub struct InMemoryEventBroker {
    emitted: Mutex<Vec<EmittedEvent>>,
    /// Every `emit` call, successful or not
    emit_attempts: AtomicU64,
    connect_calls: AtomicU64,
    /// Upcoming `emit` calls that fail before the broker recovers
    failures_remaining: AtomicU32,
    available: AtomicBool,
    emit_delay: Mutex<Duration>,
}

impl Default for InMemoryEventBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBroker {
    pub fn new() -> Self {
        Self {
            emitted: Mutex::new(Vec::new()),
            emit_attempts: AtomicU64::new(0),
            connect_calls: AtomicU64::new(0),
            failures_remaining: AtomicU32::new(0),
            available: AtomicBool::new(true),
            emit_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Make the next `count` emits fail
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Simulate the broker going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay every emit, e.g. to hold a retry pass open
    pub fn set_emit_delay(&self, delay: Duration) {
        *self.emit_delay.lock() = delay;
    }

    pub fn emitted(&self) -> Vec<EmittedEvent> {
        self.emitted.lock().clone()
    }

    pub fn emitted_count(&self) -> usize {
        self.emitted.lock().len()
    }

    /// How many accepted events carried `pattern`
    pub fn count_for(&self, pattern: &str) -> usize {
        self.emitted
            .lock()
            .iter()
            .filter(|event| event.pattern == pattern)
            .count()
    }

    pub fn emit_attempts(&self) -> u64 {
        self.emit_attempts.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> u64 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    fn take_scripted_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl EventBroker for InMemoryEventBroker {
    fn provider_name(&self) -> &'static str {
        "in_memory"
    }

    async fn connect(&self) -> Result<(), MessagingError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MessagingError::connection("in-memory broker is offline"))
        }
    }

    async fn emit(&self, pattern: &str, payload: &serde_json::Value) -> Result<(), MessagingError> {
        self.emit_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.emit_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(MessagingError::connection("in-memory broker is offline"));
        }
        if self.take_scripted_failure() {
            return Err(MessagingError::publish(pattern, "scripted broker failure"));
        }

        self.emitted.lock().push(EmittedEvent {
            pattern: pattern.to_string(),
            payload: payload.clone(),
            emitted_at: Utc::now(),
        });
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_failures_then_success() {
        let broker = InMemoryEventBroker::new();
        broker.fail_next(2);

        assert!(broker.emit("menu.created", &json!({})).await.is_err());
        assert!(broker.emit("menu.created", &json!({})).await.is_err());
        assert!(broker.emit("menu.created", &json!({"id": "m1"})).await.is_ok());

        assert_eq!(broker.emit_attempts(), 3);
        assert_eq!(broker.emitted_count(), 1);
        assert_eq!(broker.emitted()[0].payload, json!({"id": "m1"}));
    }

    #[tokio::test]
    async fn test_offline_broker_rejects_everything() {
        let broker = InMemoryEventBroker::new();
        broker.set_available(false);

        assert!(!broker.is_connected().await);
        assert!(broker.connect().await.is_err());
        assert!(broker.emit("item.added", &json!({})).await.is_err());
        assert_eq!(broker.count_for("item.added"), 0);
    }
}
