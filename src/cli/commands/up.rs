use std::path::PathBuf;
use std::time::Duration;

use console::style;
use tokio::sync::watch;

use crate::bridge::{self, BridgeState};
use crate::config::AppConfig;
use crate::error::Result;
use crate::governor::LifecycleGovernor;
use crate::supervisor::CoreSupervisor;

/// How long the bridge gets to drain connections before it is abandoned.
const BRIDGE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn execute(
    config: &AppConfig,
    manifest_path: Option<PathBuf>,
    base_url: Option<String>,
) -> Result<()> {
    let info = super::install::ensure_runtime(config, manifest_path, base_url).await?;

    let supervisor = CoreSupervisor::new(
        info.binary_path.clone(),
        config.core_host.clone(),
        config.core_port,
    )?;
    supervisor.ensure_started().await?;

    let (governor, mut shutdown_rx) = LifecycleGovernor::new(config.grace(), supervisor.clone());

    let (stop_tx, stop_rx) = watch::channel(false);
    let state = BridgeState::new(governor, supervisor.clone());
    let host = config.core_host.clone();
    let bridge_port = config.bridge_port;
    let bridge_task = tokio::spawn(async move {
        if let Err(e) = bridge::serve(&host, bridge_port, state, stop_rx).await {
            tracing::error!("Remote bridge failed: {}", e);
        }
    });

    println!(
        "{} hub core {} supervised on {}:{}, bridge on port {}",
        style("✓").green().bold(),
        style(&info.version).white().bold(),
        config.core_host,
        config.core_port,
        config.bridge_port
    );
    println!("  Idle shutdown after {:?} without clients", config.grace());

    tokio::select! {
        _ = shutdown_rx.recv() => {
            tracing::info!("Idle grace period elapsed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    // Orderly teardown: stop accepting connections, then terminate the core.
    let _ = stop_tx.send(true);
    if tokio::time::timeout(BRIDGE_DRAIN_TIMEOUT, bridge_task)
        .await
        .is_err()
    {
        tracing::warn!("Bridge did not drain in time, abandoning open sockets");
    }

    supervisor.stop().await;
    Ok(())
}
