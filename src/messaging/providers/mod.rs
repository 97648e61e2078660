//! Broker provider implementations.

pub mod in_memory;
pub mod rabbitmq;

pub use in_memory::{EmittedEvent, InMemoryEventBroker};
pub use rabbitmq::RabbitMqEventBroker;
