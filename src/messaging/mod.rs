//! # Messaging Module
//!
//! Broker abstraction for domain event delivery plus the connection monitor
//! that tracks broker readiness.
//!
//! Providers:
//! - [`RabbitMqEventBroker`] - AMQP topic exchange via `lapin`, routing key = pattern
//! - [`InMemoryEventBroker`] - testing and local development

pub mod broker;
pub mod errors;
pub mod monitor;
pub mod providers;

pub use broker::{create_broker, EventBroker};
pub use errors::MessagingError;
pub use monitor::ConnectionMonitor;
pub use providers::{EmittedEvent, InMemoryEventBroker, RabbitMqEventBroker};
