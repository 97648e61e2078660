//! Shared runtime helpers.

pub mod background;

pub use background::{spawn_periodic, PeriodicTaskHandle};
