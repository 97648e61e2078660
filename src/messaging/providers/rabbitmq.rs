//! # RabbitMQ Event Broker
//!
//! Publishes events to a durable topic exchange using the `lapin` crate.
//! The event pattern is the routing key, and the body is a JSON envelope
//! `{"pattern": ..., "data": ...}` that pattern-based consumers understand.
//!
//! The channel runs in publisher-confirm mode: `emit` resolves only after the
//! broker acknowledged the message. Any failure drops the cached connection so
//! the next call (or the connection monitor) reconnects.

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::messaging::{EventBroker, MessagingError};

struct BrokerSession {
    connection: Connection,
    channel: Channel,
}

/// RabbitMQ-backed event broker
pub struct RabbitMqEventBroker {
    config: BrokerConfig,
    session: RwLock<Option<BrokerSession>>,
}

impl std::fmt::Debug for RabbitMqEventBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RabbitMqEventBroker")
            .field("url", &self.connection_url_redacted())
            .field("exchange", &self.config.exchange)
            .finish()
    }
}

impl RabbitMqEventBroker {
    /// Create an unconnected broker; call `connect` or let the monitor do it
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            session: RwLock::new(None),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.config.exchange
    }

    /// Connection URL with credentials removed, for logging
    pub fn connection_url_redacted(&self) -> String {
        match self.config.url.split_once('@') {
            Some((scheme_and_credentials, host)) => {
                let scheme = scheme_and_credentials
                    .split_once("://")
                    .map(|(scheme, _)| scheme)
                    .unwrap_or("amqp");
                format!("{scheme}://***@{host}")
            }
            None => self.config.url.clone(),
        }
    }

    /// Wire body for one event
    pub fn envelope(pattern: &str, payload: &serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "pattern": pattern,
            "data": payload,
        })
    }

    async fn open_session(&self) -> Result<BrokerSession, MessagingError> {
        let connection = Connection::connect(
            &self.config.url,
            ConnectionProperties::default()
                .with_connection_name(self.config.connection_name.clone().into()),
        )
        .await
        .map_err(|e| MessagingError::connection(format!("RabbitMQ connection failed: {}", e)))?;

        let channel = connection.create_channel().await.map_err(|e| {
            MessagingError::connection(format!("RabbitMQ channel creation failed: {}", e))
        })?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| {
                MessagingError::configuration("rabbitmq", format!("Failed to enable confirms: {}", e))
            })?;

        channel
            .exchange_declare(
                &self.config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MessagingError::configuration(
                    "rabbitmq",
                    format!("Failed to declare exchange {}: {}", self.config.exchange, e),
                )
            })?;

        Ok(BrokerSession {
            connection,
            channel,
        })
    }

    /// Channel of a live session, connecting first when needed
    async fn live_channel(&self) -> Result<Channel, MessagingError> {
        {
            let session = self.session.read().await;
            if let Some(session) = session.as_ref() {
                if session.connection.status().connected() {
                    return Ok(session.channel.clone());
                }
            }
        }

        self.connect().await?;
        let session = self.session.read().await;
        session
            .as_ref()
            .map(|s| s.channel.clone())
            .ok_or_else(|| MessagingError::connection("RabbitMQ session unavailable after connect"))
    }

    async fn publish_confirmed(
        &self,
        channel: &Channel,
        pattern: &str,
        body: &[u8],
    ) -> Result<(), MessagingError> {
        let confirmation = channel
            .basic_publish(
                &self.config.exchange,
                pattern,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default()
                    .with_delivery_mode(2) // Persistent
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| MessagingError::publish(pattern, format!("Failed to publish: {}", e)))?
            .await
            .map_err(|e| {
                MessagingError::publish(pattern, format!("Publish confirmation failed: {}", e))
            })?;

        if confirmation.is_nack() {
            return Err(MessagingError::publish(pattern, "Broker rejected the message"));
        }
        Ok(())
    }

    async fn drop_session(&self) {
        let mut session = self.session.write().await;
        if session.take().is_some() {
            debug!(exchange = %self.config.exchange, "Dropped RabbitMQ session after failure");
        }
    }
}

#[async_trait]
impl EventBroker for RabbitMqEventBroker {
    fn provider_name(&self) -> &'static str {
        "rabbitmq"
    }

    async fn connect(&self) -> Result<(), MessagingError> {
        let mut session = self.session.write().await;
        if let Some(existing) = session.as_ref() {
            if existing.connection.status().connected() {
                return Ok(());
            }
        }

        let fresh = self.open_session().await?;
        *session = Some(fresh);

        info!(
            url = %self.connection_url_redacted(),
            exchange = %self.config.exchange,
            "🔌 Connected to RabbitMQ"
        );
        Ok(())
    }

    async fn emit(&self, pattern: &str, payload: &serde_json::Value) -> Result<(), MessagingError> {
        let channel = self.live_channel().await?;
        let body = serde_json::to_vec(&Self::envelope(pattern, payload))?;

        let result = self.publish_confirmed(&channel, pattern, &body).await;

        if let Err(ref e) = result {
            warn!(pattern = %pattern, error = %e, "RabbitMQ publish failed");
            self.drop_session().await;
        }
        result
    }

    async fn is_connected(&self) -> bool {
        let session = self.session.read().await;
        session
            .as_ref()
            .is_some_and(|s| s.connection.status().connected() && s.channel.status().connected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn broker_from_env() -> RabbitMqEventBroker {
        let mut config = BrokerConfig::default();
        if let Ok(url) = std::env::var("RABBITMQ_URL") {
            config.url = url;
        }
        config.exchange = format!("menu_events_test_{}", uuid::Uuid::new_v4().simple());
        RabbitMqEventBroker::new(config)
    }

    #[test]
    fn test_envelope_shape() {
        let body = RabbitMqEventBroker::envelope("menu.created", &json!({"id": "m1"}));
        assert_eq!(body, json!({"pattern": "menu.created", "data": {"id": "m1"}}));
    }

    #[test]
    fn test_url_redaction() {
        let broker = RabbitMqEventBroker::new(BrokerConfig::default());
        assert_eq!(
            broker.connection_url_redacted(),
            "amqp://***@localhost:5672/%2f"
        );
    }

    #[tokio::test]
    async fn test_unconnected_broker_reports_disconnected() {
        let broker = RabbitMqEventBroker::new(BrokerConfig::default());
        assert!(!broker.is_connected().await);
    }

    #[tokio::test]
    #[ignore = "requires RabbitMQ running"]
    async fn test_rabbitmq_connect_and_emit() {
        let broker = broker_from_env();
        broker.connect().await.unwrap();
        assert!(broker.is_connected().await);

        broker
            .emit("menu.created", &json!({"id": "m1", "name": "Lunch"}))
            .await
            .unwrap();
    }
}
