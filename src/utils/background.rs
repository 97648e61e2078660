//! # Periodic Background Tasks
//!
//! Interval loops driven by `tokio::time::interval`, stopped through a watch
//! channel between ticks. A tick that is still running when the next one is
//! due is skipped rather than queued.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Handle to a running periodic task
#[derive(Debug)]
pub struct PeriodicTaskHandle {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    join_handle: JoinHandle<()>,
}

impl PeriodicTaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Signal the loop to stop and wait for the in-flight tick to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join_handle.await {
            warn!(task = self.name, error = %e, "Periodic task ended abnormally");
        }
        info!(task = self.name, "🛑 Periodic task stopped");
    }
}

/// Run `tick` every `period` until the returned handle is shut down
///
/// With `run_immediately` the first tick fires at once; otherwise it fires
/// after one full period.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    run_immediately: bool,
    mut tick: F,
) -> PeriodicTaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let join_handle = tokio::spawn(async move {
        let start = if run_immediately {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + period
        };
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(task = name, period_ms = period.as_millis() as u64, "🚀 Periodic task started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    debug!(task = name, "Periodic tick");
                    tick().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });

    PeriodicTaskHandle {
        name,
        shutdown_tx,
        join_handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_ticks_until_shutdown() {
        let counter = Arc::new(AtomicU32::new(0));
        let ticks = counter.clone();

        let handle = spawn_periodic("counter", Duration::from_millis(10), true, move || {
            let ticks = ticks.clone();
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(55)).await;
        handle.shutdown().await;

        let observed = counter.load(Ordering::SeqCst);
        assert!(observed >= 2, "expected several ticks, got {observed}");

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), observed);
    }

    #[tokio::test]
    async fn test_delayed_start_skips_first_tick() {
        let counter = Arc::new(AtomicU32::new(0));
        let ticks = counter.clone();

        let handle = spawn_periodic("delayed", Duration::from_secs(60), false, move || {
            let ticks = ticks.clone();
            async move {
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        handle.shutdown().await;
    }
}
