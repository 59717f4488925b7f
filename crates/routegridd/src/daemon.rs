//! `routegridd run`: join the cluster and heartbeat until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use routegrid_cluster::ClusterCoordinator;
use routegrid_core::{settings_channel, RoutegridConfig};
use routegrid_state::RedbDocumentStore;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::reload;

pub async fn run(
    config_path: PathBuf,
    data_dir: PathBuf,
    reload_interval_secs: u64,
) -> anyhow::Result<()> {
    info!(config = ?config_path, "routegrid daemon starting");

    let config = RoutegridConfig::from_file(&config_path)?;

    // ── Store ──────────────────────────────────────────────────

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("create data dir {}", data_dir.display()))?;
    let db_path = config.database_path(&data_dir);
    let store = RedbDocumentStore::open(&db_path)
        .with_context(|| format!("open routing database {}", db_path.display()))?;
    info!(path = ?db_path, primary_term = store.primary_term(), "routing database opened");

    // ── Coordinator ────────────────────────────────────────────

    let (settings_tx, settings_rx) = settings_channel(config.settings());
    let coordinator = ClusterCoordinator::builder()
        .document_key(config.store.document_key.clone())
        .build();
    coordinator.setup(Arc::new(store), settings_rx);
    coordinator.start()?;
    info!(node_id = %coordinator.node_id(), "coordinator running");

    // ── Config reloader ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reload_handle = tokio::spawn(reload::run(
        config_path,
        Duration::from_secs(reload_interval_secs.max(1)),
        config,
        settings_tx,
        shutdown_rx,
    ));

    // ── Shutdown ───────────────────────────────────────────────

    tokio::signal::ctrl_c()
        .await
        .context("install CTRL+C handler")?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Err(e) = reload_handle.await {
        warn!(error = %e, "config reloader did not exit cleanly");
    }
    coordinator.stop().await?;

    info!("routegrid daemon stopped");
    Ok(())
}
