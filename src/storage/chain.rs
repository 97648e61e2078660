//! # Failure Store Chain
//!
//! Ordered list of failure stores behind one persist call. Tier 0 is the
//! primary store; each later tier is tried only when every earlier one failed.
//! When all tiers fail, the event is written to the log at critical severity
//! with pattern, payload, the delivery error and every tier's storage error
//! embedded, so it stays forensically recoverable.

use crate::storage::{FailureRecord, FailureStore};
use std::sync::Arc;
use tracing::{error, warn};

/// Where a failed event ended up
#[derive(Debug, Clone)]
pub enum PersistOutcome {
    /// Stored by the tier at `tier`
    Stored {
        tier: usize,
        store: &'static str,
        record: FailureRecord,
    },
    /// Every tier failed; only the critical log line remains
    AllFailed {
        /// Store name and storage error, in tier order
        errors: Vec<(&'static str, String)>,
    },
}

impl PersistOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, PersistOutcome::Stored { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FailureStoreChain {
    tiers: Vec<Arc<dyn FailureStore>>,
}

impl FailureStoreChain {
    pub fn new(tiers: Vec<Arc<dyn FailureStore>>) -> Self {
        Self { tiers }
    }

    /// Primary store plus filesystem fallback
    pub fn two_tier(primary: Arc<dyn FailureStore>, fallback: Arc<dyn FailureStore>) -> Self {
        Self::new(vec![primary, fallback])
    }

    pub fn tiers(&self) -> &[Arc<dyn FailureStore>] {
        &self.tiers
    }

    pub fn primary(&self) -> Option<&Arc<dyn FailureStore>> {
        self.tiers.first()
    }

    /// Save through the tiers in order until one succeeds
    pub async fn persist(
        &self,
        pattern: &str,
        payload: &serde_json::Value,
        delivery_error: &str,
    ) -> PersistOutcome {
        let mut errors = Vec::with_capacity(self.tiers.len());
        for (tier, store) in self.tiers.iter().enumerate() {
            match store.save(pattern, payload, delivery_error).await {
                Ok(record) => {
                    if tier > 0 {
                        warn!(
                            store = store.store_name(),
                            tier,
                            record_id = %record.id,
                            pattern = %pattern,
                            "📁 Failed event stored in fallback tier"
                        );
                    }
                    return PersistOutcome::Stored {
                        tier,
                        store: store.store_name(),
                        record,
                    };
                }
                Err(err) => {
                    error!(
                        store = store.store_name(),
                        tier,
                        pattern = %pattern,
                        error = %err,
                        "❌ Failed to persist failed event"
                    );
                    errors.push((store.store_name(), err.to_string()));
                }
            }
        }

        error!(
            severity = "critical",
            pattern = %pattern,
            payload = %payload,
            delivery_error = %delivery_error,
            tiers = self.tiers.len(),
            tier_errors = ?errors,
            "💀 EVENT LOST: all failure stores rejected the event"
        );
        PersistOutcome::AllFailed { errors }
    }
}
