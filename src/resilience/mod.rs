//! # Resilience Module
//!
//! Circuit breaker protecting broker delivery.
//!
//! ## Usage
//!
//! ```rust
//! use menu_events::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
//!
//! # async fn example() {
//! let circuit_breaker = CircuitBreaker::new("broker", CircuitBreakerConfig::default());
//!
//! if circuit_breaker.allows_delivery().await {
//!     // attempt delivery, then record the outcome
//!     circuit_breaker.record_success().await;
//! }
//! assert_eq!(circuit_breaker.state(), CircuitState::Closed);
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use config::CircuitBreakerConfig;
pub use metrics::CircuitBreakerMetrics;
