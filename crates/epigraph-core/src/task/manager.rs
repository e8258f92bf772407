//! Periodic scheduler driving acquisition and replay.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::task::{DownloadTask, ReplayTask, RetrieveTask};

struct RunHandle {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Top-level coordinator: every tick launches one acquisition pass and
/// one replay pass concurrently, then sleeps until the next tick or a
/// stop signal, whichever comes first.
pub struct TaskManager {
    interval: Duration,
    download: Option<Arc<DownloadTask>>,
    retrieve: Option<Arc<RetrieveTask>>,
    replay: Arc<ReplayTask>,
    running: Mutex<Option<RunHandle>>,
}

impl TaskManager {
    #[must_use]
    pub fn new(
        interval: Duration,
        download: Option<Arc<DownloadTask>>,
        retrieve: Option<Arc<RetrieveTask>>,
        replay: Arc<ReplayTask>,
    ) -> Self {
        Self {
            interval,
            download,
            retrieve,
            replay,
            running: Mutex::new(None),
        }
    }

    /// Launch the scheduling loop.
    ///
    /// # Errors
    ///
    /// Fails when the manager is already running.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            bail!("task already started");
        }
        tracing::info!("start task");

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            self.download.clone(),
            self.retrieve.clone(),
            self.replay.clone(),
            self.interval,
            stop_rx,
        ));
        *running = Some(RunHandle {
            stop: stop_tx,
            handle,
        });
        Ok(())
    }

    /// Whether the scheduling loop is currently active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Signal the loop to stop and wait for it, including any passes it
    /// dispatched. In-flight work is not interrupted, only awaited.
    ///
    /// # Errors
    ///
    /// Fails when the manager isn't running or the loop task panicked.
    pub async fn stop(&self) -> Result<()> {
        let run = {
            let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
            running.take()
        };
        let Some(run) = run else {
            bail!("task not started");
        };
        tracing::info!("stop task");

        let _ = run.stop.send(true);
        run.handle.await.context("scheduler loop panicked")?;
        Ok(())
    }
}

async fn run_loop(
    download: Option<Arc<DownloadTask>>,
    retrieve: Option<Arc<RetrieveTask>>,
    replay: Arc<ReplayTask>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut passes: JoinSet<()> = JoinSet::new();
    loop {
        if *stop.borrow() {
            break;
        }

        if let Some(task) = download.clone() {
            passes.spawn(async move {
                if let Err(e) = task.process().await {
                    tracing::error!(error = %e, "failed to download");
                }
            });
        }
        if let Some(task) = retrieve.clone() {
            passes.spawn(async move {
                if let Err(e) = task.process().await {
                    tracing::error!(error = %e, "failed to retrieve");
                }
            });
        }
        {
            let task = replay.clone();
            passes.spawn(async move {
                if let Err(e) = task.process().await {
                    tracing::error!(error = %e, "failed to replay");
                }
            });
        }

        // Reap passes that already finished; keeps the set bounded.
        while passes.try_join_next().is_some() {}

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            _ = stop.changed() => break,
        }
    }

    // Stop waits for dispatched passes rather than killing them.
    while passes.join_next().await.is_some() {}
}
