//! Listing-driven acquisition: page through the remote HTTP listing,
//! reconcile against the registry, and materialize verified local copies.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::task::JoinSet;

use epigraph_state::registry::DOWNLOAD_FILES_KEY;
use epigraph_state::{FileRegistry, Storage, StorageError};
use epigraph_types::listing::ListResponse;
use epigraph_types::{ExpertId, FileId, FileRef, FileStatus};

use crate::bus::{EventBus, FILE_NEEDS_FETCH, FILE_READY};
use crate::config::Config;
use crate::task::{checksum_matches, compute_md5, PassGuard};

/// Acquisition task fed by the HTTP listing service.
pub struct DownloadTask {
    conf: Config,
    registry: FileRegistry,
    bus: Arc<EventBus>,
    http: reqwest::Client,

    files: Mutex<Option<HashMap<FileId, FileRef>>>,
    processing: AtomicBool,
}

impl DownloadTask {
    /// Create the task and wire it to the needs-acquisition topic.
    ///
    /// # Errors
    ///
    /// Fails when the data directory can't be created.
    pub fn new(conf: Config, storage: Arc<dyn Storage>, bus: Arc<EventBus>) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&conf.storage.data_dir)
            .with_context(|| format!("failed to create data dir {}", conf.storage.data_dir))?;

        let task = Arc::new(Self {
            conf,
            registry: FileRegistry::new(storage),
            bus: bus.clone(),
            http: reqwest::Client::new(),
            files: Mutex::new(None),
            processing: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&task);
        bus.subscribe(FILE_NEEDS_FETCH, move |file_id| {
            if let Some(task) = weak.upgrade() {
                task.on_needs_fetch(file_id);
            }
        });
        Ok(task)
    }

    fn on_needs_fetch(&self, file_id: &str) {
        let id = FileId::new(file_id);
        let file = match self.registry.load_file(&id) {
            Ok(Some(file)) => file,
            Ok(None) => {
                tracing::warn!(file = file_id, "needs-fetch for unknown file");
                return;
            }
            Err(e) => {
                tracing::error!(file = file_id, error = %e, "failed to load file info");
                return;
            }
        };

        let saved = self.with_pending(|files| {
            files.insert(id, file);
            self.registry.save_all(DOWNLOAD_FILES_KEY, files, false)
        });
        match saved {
            Ok(()) => tracing::info!(file = file_id, "file queued for download"),
            Err(e) => tracing::error!(file = file_id, error = %e, "failed to save file info"),
        }
    }

    /// Run the pending map closure with the map lazily rebuilt from the
    /// registry on first use. The lock is never held across await points.
    fn with_pending<T>(
        &self,
        f: impl FnOnce(&mut HashMap<FileId, FileRef>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut guard = self.files.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            let files = self.registry.load_all(DOWNLOAD_FILES_KEY)?;
            tracing::info!(count = files.len(), "load download files");
            *guard = Some(files);
        }
        f(guard.as_mut().expect("pending map just loaded"))
    }

    /// One acquisition pass. Re-entrant calls while a pass is in flight
    /// are no-ops.
    ///
    /// # Errors
    ///
    /// Returns listing/registry failures; per-file materialization
    /// failures are logged and retried on the next pass.
    pub async fn process(self: Arc<Self>) -> Result<()> {
        if self.processing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _guard = PassGuard(&self.processing);

        if !self.conf.server.listing_url.is_empty() {
            self.fetch_listing(self.conf.server.refresh).await?;
        }
        self.materialize_pending().await;
        Ok(())
    }

    /// Fetch one listing page and reconcile it into the registry. The
    /// persisted page cursor advances only when the page contained
    /// records we hadn't fully acquired yet.
    async fn fetch_listing(&self, refresh: bool) -> Result<()> {
        let page = self.registry.load_page()?;
        let url = format!(
            "{}/sequence/allFileList?status=send&page={}",
            self.conf.server.listing_url, page
        );
        let resp: ListResponse = self
            .http
            .get(&url)
            .send()
            .await
            .context("listing request failed")?
            .error_for_status()?
            .json()
            .await
            .context("listing response malformed")?;

        if resp.list.is_empty() {
            return Ok(());
        }
        tracing::info!(count = resp.list.len(), page, "fetch download files");

        let data_dir = self.conf.storage.data_dir.clone();
        let changed = self.with_pending(|files| {
            let mut changed = false;
            for data in &resp.list {
                let id = FileId::new(&data.id);
                let mut file = match self.registry.load_file(&id)? {
                    Some(file) => file,
                    None => FileRef::new(id.clone()),
                };

                if refresh && file.status >= FileStatus::Downloaded {
                    file.status = FileStatus::New;
                }

                file.index = data.index;
                file.count = data.count;
                file.url = data.file_url.clone();
                file.expert = ExpertId::new(&data.expert);
                file.file_size = data.file_size;
                file.check_sum = data.check_sum.clone();
                let path = format!("{data_dir}/{}", file.id);
                file.path = path.clone();
                file.local_path = path;

                if file.status < FileStatus::Downloaded {
                    changed = true;
                    self.registry.save_file(&file)?;
                    tracing::info!(
                        file = %file.id,
                        index = file.index,
                        expert = %file.expert,
                        "add download file"
                    );
                    files.insert(id, file);
                }
            }
            if changed {
                self.registry.save_all(DOWNLOAD_FILES_KEY, files, false)?;
            }
            Ok(changed)
        })?;

        if changed {
            self.registry.save_page(page + 1)?;
        }
        Ok(())
    }

    /// Materialize every pending file, each as its own unit of work.
    async fn materialize_pending(self: &Arc<Self>) {
        let pending: Vec<FileRef> = match self.with_pending(|files| {
            Ok(files
                .values()
                .filter(|f| f.status <= FileStatus::Downloading)
                .cloned()
                .collect())
        }) {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!(error = %e, "failed to load pending downloads");
                return;
            }
        };

        let mut units = JoinSet::new();
        for file in pending {
            let task = self.clone();
            units.spawn(async move {
                let id = file.id.clone();
                if let Err(e) = task.download(file).await {
                    tracing::error!(file = %id, error = %e, "failed to download data");
                }
            });
        }
        while units.join_next().await.is_some() {}
    }

    /// Materialize one file: reuse a verified local copy or fetch it,
    /// then gate the `Downloaded` transition on the checksum.
    async fn download(&self, mut file: FileRef) -> Result<()> {
        let path = PathBuf::from(&file.local_path);

        if !checksum_matches(&path, &file.check_sum).await? {
            self.fetch_file(&file.url, &path).await?;
            let actual = compute_md5(&path).await?;
            if !file.check_sum.is_empty() && actual != file.check_sum {
                tracing::error!(
                    file = %file.id,
                    expected = %file.check_sum,
                    actual = %actual,
                    "failed to check checksum"
                );
                anyhow::bail!("checksum mismatch for file {}", file.id);
            }
        }

        file.status = FileStatus::Downloaded;
        self.registry.save_file(&file)?;
        tracing::info!(file = %file.id, "file downloaded");

        self.bus.publish(FILE_READY, file.id.as_str());

        self.with_pending(|files| {
            files.remove(&file.id);
            self.registry.save_all(DOWNLOAD_FILES_KEY, files, false)
        })?;
        Ok(())
    }

    async fn fetch_file(&self, url: &str, path: &Path) -> Result<()> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("fetch failed: {url}"))?
            .error_for_status()?;
        let bytes = resp.bytes().await?;
        tokio::fs::write(path, &bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}
