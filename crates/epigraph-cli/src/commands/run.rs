use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use epigraph_core::bus::EventBus;
use epigraph_core::chain::RpcChainClient;
use epigraph_core::graph::HttpGraphClient;
use epigraph_core::task::{DownloadTask, ReplayTask, RetrieveTask, TaskManager};
use epigraph_core::api;

/// Execute the `run` command: wire storage, bus, tasks, and the HTTP
/// façade, then serve until interrupted.
pub async fn execute(config_path: &Path, log_level: Option<&str>) -> Result<()> {
    let config = super::load_config(config_path, log_level)?;
    let storage = super::open_storage(&config)?;
    let bus = Arc::new(EventBus::new());
    let graph = Arc::new(HttpGraphClient::new(config.graph.clone()));

    // Acquisition sources are optional; at least replay always runs.
    let download = if config.server.listing_url.is_empty() {
        None
    } else {
        Some(DownloadTask::new(config.clone(), storage.clone(), bus.clone())?)
    };
    let retrieve = if config.chains.is_empty() || config.server.experts.is_empty() {
        None
    } else {
        let chain = Arc::new(RpcChainClient::new(config.chains[0].clone()));
        Some(RetrieveTask::new(
            config.clone(),
            storage.clone(),
            bus.clone(),
            chain,
        )?)
    };
    let replay = ReplayTask::new(config.clone(), storage, bus, graph.clone())?;

    let manager = TaskManager::new(
        Duration::from_secs(config.task.interval_secs),
        download,
        retrieve,
        replay,
    );
    manager.start()?;

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen))?;
    tracing::info!(listen = config.server.listen, "serving graph api");

    let app = api::router(graph);
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    server.await.context("api server failed")?;

    manager.stop().await?;
    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
