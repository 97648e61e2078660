//! # Relay Bootstrap
//!
//! Wires configuration into a running set of components: failure stores,
//! broker, circuit breaker, connection monitor, publisher and scheduler.
//!
//! The PostgreSQL tier is always part of the chain. Its pool connects lazily,
//! so a database that is down at launch only means early failures land in the
//! file tier until it comes back; the legacy table and schema creation are
//! retried by the migration pass.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{RelayConfig, StorageConfig};
use crate::error::RelayResult;
use crate::events::EventPublisher;
use crate::messaging::{create_broker, ConnectionMonitor};
use crate::resilience::CircuitBreaker;
use crate::scheduler::RetryScheduler;
use crate::storage::{
    FailureStore, FailureStoreChain, FileFailureStore, LegacyFailureSource, PostgresFailureStore,
    PostgresLegacyTable,
};

/// Store chain plus the optional legacy source feeding the migration pass
#[derive(Debug)]
pub struct FailureStores {
    pub chain: FailureStoreChain,
    pub legacy: Option<Arc<dyn LegacyFailureSource>>,
}

/// Build the PostgreSQL primary and file fallback tiers
pub async fn build_failure_stores(storage: &StorageConfig) -> RelayResult<FailureStores> {
    let fallback: Arc<dyn FailureStore> =
        Arc::new(FileFailureStore::open(storage.fallback_directory.clone()).await?);

    let primary = PostgresFailureStore::connect_lazy(storage)?;
    if let Err(e) = primary.prepare().await {
        warn!(
            error = %e,
            "PostgreSQL not ready at startup; failures go to the file store until it recovers"
        );
    }

    let legacy: Option<Arc<dyn LegacyFailureSource>> = match storage.legacy_table() {
        Some(table) => Some(Arc::new(PostgresLegacyTable::new(
            primary.pool().clone(),
            table,
        )?)),
        None => None,
    };

    let primary: Arc<dyn FailureStore> = Arc::new(primary);
    Ok(FailureStores {
        chain: FailureStoreChain::two_tier(primary, fallback),
        legacy,
    })
}

/// Every long-lived relay component, not yet running
#[derive(Debug)]
pub struct RelaySystem {
    pub monitor: Arc<ConnectionMonitor>,
    pub publisher: Arc<EventPublisher>,
    pub scheduler: Arc<RetryScheduler>,
}

impl RelaySystem {
    /// Build the components and run the first broker check
    pub async fn bootstrap(config: &RelayConfig) -> RelayResult<Self> {
        let FailureStores { chain, legacy } = build_failure_stores(&config.storage).await?;

        let broker = create_broker(&config.broker);
        let circuit_breaker = Arc::new(CircuitBreaker::new(
            "broker",
            config.circuit_breaker.clone(),
        ));
        let monitor = Arc::new(ConnectionMonitor::new(
            broker.clone(),
            circuit_breaker.clone(),
            config.monitor.clone(),
        ));
        if !monitor.check_connection().await {
            warn!("Broker unreachable at startup; events will be queued until it recovers");
        }

        let publisher = Arc::new(EventPublisher::new(
            broker,
            monitor.clone(),
            circuit_breaker,
            chain,
            config.publisher.clone(),
        ));
        let scheduler = Arc::new(RetryScheduler::new(
            publisher.clone(),
            legacy,
            config.scheduler.clone(),
        ));

        info!(
            broker = ?config.broker.provider,
            tiers = publisher.stores().tiers().len(),
            "✅ Relay components ready"
        );
        Ok(Self {
            monitor,
            publisher,
            scheduler,
        })
    }
}
