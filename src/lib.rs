#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, RabbitMQ in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Menu Events
//!
//! Reliable delivery of menu-management domain events to a message broker.
//!
//! ## Overview
//!
//! Domain code calls [`EventPublisher::publish`] and moves on. The publisher
//! either hands the event to the broker within the call or queues it as a
//! failure record; the [`RetryScheduler`] replays queued records later. A
//! broker outage never blocks a business operation, and a database outage
//! does not drop events silently.
//!
//! ## Module Organization
//!
//! - [`bootstrap`] - builds the relay components from configuration
//! - [`events`] - the publisher: gated delivery, in-call retries, queueing
//! - [`messaging`] - broker trait, RabbitMQ and in-memory providers, connection monitor
//! - [`resilience`] - circuit breaker guarding broker delivery
//! - [`storage`] - failure records and the PostgreSQL, file and in-memory stores
//! - [`scheduler`] - retry, cleanup and legacy-migration passes
//! - [`config`] - layered configuration
//! - [`logging`] - structured logging setup and helpers
//! - [`constants`] - event pattern catalogue
//! - [`error`] - crate-level error type
//!
//! ## Delivery Guarantees
//!
//! At-least-once. Every published event is either accepted by the broker or
//! stored in some failure store tier; when every tier fails the event is
//! written to the log at critical severity with its payload. Consumers must
//! tolerate duplicates.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use menu_events::config::MonitorConfig;
//! use menu_events::constants::events;
//! use menu_events::messaging::{ConnectionMonitor, InMemoryEventBroker};
//! use menu_events::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use menu_events::storage::{FailureStoreChain, FileFailureStore, InMemoryFailureStore};
//! use menu_events::EventPublisher;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = Arc::new(InMemoryEventBroker::new());
//! let circuit = Arc::new(CircuitBreaker::new("broker", CircuitBreakerConfig::default()));
//! let monitor = Arc::new(ConnectionMonitor::new(broker.clone(), circuit.clone(), MonitorConfig::default()));
//! monitor.check_connection().await;
//!
//! let stores = FailureStoreChain::two_tier(
//!     Arc::new(InMemoryFailureStore::new()),
//!     Arc::new(FileFailureStore::open("data/failed-events").await?),
//! );
//! let publisher = EventPublisher::new(broker, monitor, circuit, stores, Default::default());
//!
//! publisher
//!     .publish(events::MENU_CREATED, &serde_json::json!({"id": "m1", "name": "Lunch"}))
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod resilience;
pub mod scheduler;
pub mod storage;
pub mod utils;

pub use bootstrap::RelaySystem;
pub use config::{ConfigManager, RelayConfig};
pub use error::{RelayError, RelayResult};
pub use events::{EventPublisher, PublishOutcome, PublisherStats};
pub use messaging::{ConnectionMonitor, EventBroker, MessagingError};
pub use resilience::{CircuitBreaker, CircuitState};
pub use scheduler::{RetryPassReport, RetryScheduler};
pub use storage::{FailureRecord, FailureStore, FailureStoreChain, StorageError};
