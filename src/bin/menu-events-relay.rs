//! Menu event relay
//!
//! Runs the connection monitor and the retry scheduler against the configured
//! broker and failure stores until interrupted with Ctrl-C.

use anyhow::Context;
use tracing::info;

use menu_events::config::ConfigManager;
use menu_events::logging::init_structured_logging;
use menu_events::RelaySystem;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let manager = ConfigManager::load().context("failed to load relay configuration")?;
    info!(environment = %manager.environment(), "🚀 Starting menu event relay");

    let relay = RelaySystem::bootstrap(manager.config())
        .await
        .context("failed to bootstrap relay components")?;

    let monitor_handle = relay.monitor.start();
    let scheduler_handle = relay.scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("🛑 Shutdown requested");

    scheduler_handle.shutdown().await;
    monitor_handle.shutdown().await;

    info!(
        circuit = %relay.publisher.circuit_metrics().await.format_summary(),
        publisher = ?relay.publisher.stats(),
        scheduler = ?relay.scheduler.stats(),
        "✅ Menu event relay stopped"
    );
    Ok(())
}
