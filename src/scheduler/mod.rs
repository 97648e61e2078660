//! # Scheduled Passes
//!
//! Periodic retry, cleanup and legacy-migration jobs over the failure stores.

pub mod retry_scheduler;

pub use retry_scheduler::{
    CleanupReport, FailedMessage, MigrationReport, PassStatus, RetryPassReport, RetryScheduler,
    SchedulerHandle, SchedulerStats,
};
