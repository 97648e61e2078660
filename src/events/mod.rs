//! # Event Publishing
//!
//! Reliable publication of domain events to the message broker.

pub mod publisher;

pub use publisher::{EventPublisher, PublishOutcome, PublisherStats};
