//! # Event Broker Trait
//!
//! Provider-agnostic contract for handing an event to the message broker.

use crate::config::{BrokerConfig, BrokerProvider};
use crate::messaging::providers::{InMemoryEventBroker, RabbitMqEventBroker};
use crate::messaging::MessagingError;
use async_trait::async_trait;
use std::sync::Arc;

/// Message broker client
///
/// `emit` resolves once the broker has accepted the event; a returned error
/// means delivery must be considered failed.
#[async_trait]
pub trait EventBroker: Send + Sync + std::fmt::Debug + 'static {
    /// Provider name used in logs
    fn provider_name(&self) -> &'static str;

    /// Establish (or re-establish) the broker connection
    async fn connect(&self) -> Result<(), MessagingError>;

    /// Publish one event under `pattern`
    async fn emit(&self, pattern: &str, payload: &serde_json::Value) -> Result<(), MessagingError>;

    /// Whether the broker connection is currently usable
    async fn is_connected(&self) -> bool;
}

/// Build the configured broker without connecting it
pub fn create_broker(config: &BrokerConfig) -> Arc<dyn EventBroker> {
    match config.provider {
        BrokerProvider::RabbitMq => Arc::new(RabbitMqEventBroker::new(config.clone())),
        BrokerProvider::InMemory => Arc::new(InMemoryEventBroker::new()),
    }
}
