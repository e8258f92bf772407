//! Chain-driven acquisition: reconcile the on-chain file registry of each
//! configured expert and materialize local copies through the export /
//! remote-retrieve / SCP fallback chain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};

use epigraph_state::registry::RETRIEVE_FILES_KEY;
use epigraph_state::{FileRegistry, Storage, StorageError};
use epigraph_types::{ExpertId, FileId, FileRef, FileStatus};

use crate::bus::{EventBus, FILE_NEEDS_FETCH, FILE_READY};
use crate::chain::ChainClient;
use crate::config::{ChainConfig, Config};
use crate::remote::{RemoteShell, SshConfig};
use crate::task::{read_file_index, PassGuard};

/// Acquisition task fed by the storage-deal chain registry.
pub struct RetrieveTask {
    conf: Config,
    registry: FileRegistry,
    bus: Arc<EventBus>,
    chain: Arc<dyn ChainClient>,

    files: Mutex<Option<HashMap<FileId, FileRef>>>,
    processing: AtomicBool,
}

impl RetrieveTask {
    /// Create the task and wire it to the needs-acquisition topic.
    ///
    /// # Errors
    ///
    /// Fails on missing chain or key configuration, or when the data
    /// directory can't be created.
    pub fn new(
        conf: Config,
        storage: Arc<dyn Storage>,
        bus: Arc<EventBus>,
        chain: Arc<dyn ChainClient>,
    ) -> Result<Arc<Self>> {
        if conf.chains.is_empty() {
            bail!("need chains config");
        }
        if conf.app.key_path.is_empty() {
            bail!("need key_path config");
        }
        std::fs::create_dir_all(&conf.storage.data_dir)
            .with_context(|| format!("failed to create data dir {}", conf.storage.data_dir))?;

        let task = Arc::new(Self {
            conf,
            registry: FileRegistry::new(storage),
            bus: bus.clone(),
            chain,
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
            self.registry.save_all(RETRIEVE_FILES_KEY, files, false)
        });
        match saved {
            Ok(()) => tracing::info!(file = file_id, "file queued for retrieval"),
            Err(e) => tracing::error!(file = file_id, error = %e, "failed to save file info"),
        }
    }

    fn with_pending<T>(
        &self,
        f: impl FnOnce(&mut HashMap<FileId, FileRef>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut guard = self.files.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            let files = self.registry.load_all(RETRIEVE_FILES_KEY)?;
            tracing::info!(count = files.len(), "load retrieve files");
            *guard = Some(files);
        }
        f(guard.as_mut().expect("pending map just loaded"))
    }

    /// One acquisition pass. Re-entrant calls while a pass is in flight
    /// are no-ops.
    ///
    /// # Errors
    ///
    /// Returns registry failures; per-expert and per-file fetch failures
    /// are logged and retried on the next pass.
    pub async fn process(self: Arc<Self>) -> Result<()> {
        if self.processing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _guard = PassGuard(&self.processing);

        for expert in self.conf.server.experts.clone() {
            if let Err(e) = self.fetch_expert(&expert, false).await {
                tracing::error!(expert, error = %e, "failed to fetch retrieve data");
            }
        }

        self.retrieve_pending().await
    }

    /// Reconcile one expert's on-chain registry into ours.
    async fn fetch_expert(&self, expert: &str, refresh: bool) -> Result<()> {
        let infos = self.chain.expert_files(expert).await?;
        if infos.is_empty() {
            return Ok(());
        }
        tracing::info!(expert, count = infos.len(), "fetch expert files");

        let data_dir = self.conf.storage.data_dir.clone();
        self.with_pending(|files| {
            let mut changed = false;
            for info in &infos {
                let id = FileId::new(&info.piece_cid);
                let mut file = match self.registry.load_file(&id)? {
                    Some(file) => file,
                    None => FileRef::new(id.clone()),
                };

                if refresh && file.status >= FileStatus::Downloaded {
                    file.status = FileStatus::New;
                }

                file.expert = ExpertId::new(expert);
                file.piece_cid = info.piece_cid.clone();
                file.root_cid = info.root_cid.clone();
                file.piece_size = info.piece_size;
                file.file_size = info.piece_size as i64;
                let path = format!("{data_dir}/{}", file.piece_cid);
                file.path = path.clone();
                file.local_path = path;

                if file.status < FileStatus::Downloaded {
                    changed = true;
                    self.registry.save_file(&file)?;
                    tracing::info!(
                        file = %file.id,
                        expert,
                        piece_size = file.piece_size,
                        "add retrieve file"
                    );
                    files.insert(id, file);
                }
            }
            if changed {
                self.registry.save_all(RETRIEVE_FILES_KEY, files, false)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Materialize every pending file. Retrieval leans on one remote host
    /// at a time, so files go sequentially rather than fanned out.
    async fn retrieve_pending(&self) -> Result<()> {
        let pending: Vec<FileRef> = self.with_pending(|files| {
            Ok(files
                .values()
                .filter(|f| f.status < FileStatus::Downloaded)
                .cloned()
                .collect())
        })?;
        if pending.is_empty() {
            return Ok(());
        }

        let chain = self.conf.chains[0].clone();
        let shell = RemoteShell::new(SshConfig {
            host: chain.ssh_host.clone(),
            port: chain.ssh_port,
            user: chain.ssh_user.clone(),
            key_path: self.conf.app.key_path.clone(),
        });

        for file in pending {
            let id = file.id.clone();
            if let Err(e) = self.retrieve_one(&shell, &chain, file).await {
                tracing::error!(file = %id, error = %e, "failed to retrieve data");
            }
        }
        Ok(())
    }

    /// Materialize one file: reuse an existing local copy, otherwise make
    /// sure the remote host holds it (export from the chain node, falling
    /// back to a remote retrieval command), then SCP it over.
    async fn retrieve_one(
        &self,
        shell: &RemoteShell,
        chain: &ChainConfig,
        file: FileRef,
    ) -> Result<()> {
        if !tokio::fs::try_exists(&file.local_path).await? {
            let check = format!(
                "mkdir -p {};test -f {}",
                self.conf.storage.data_dir, file.path
            );
            if let Err(e) = shell.run(&check).await {
                tracing::warn!(file = %file.id, error = %e, "remote file not found");

                if let Err(e) = self.chain.export(&file.root_cid, &file.path).await {
                    tracing::warn!(
                        file = %file.id,
                        piece = %file.piece_cid,
                        root = %file.root_cid,
                        error = %e,
                        "failed to export data"
                    );
                    let cmd = format!(
                        "epik client retrieve --pieceCid={} --miner={} {} {}",
                        file.piece_cid, chain.miner, file.root_cid, file.path
                    );
                    tracing::debug!(cmd, piece = %file.piece_cid, "retrieve file");
                    shell
                        .run(&cmd)
                        .await
                        .with_context(|| format!("failed to retrieve data, shell: {cmd}"))?;
                }
            }
            shell
                .copy_from_remote(&file.path, &file.local_path)
                .await
                .context("failed to copy file from remote")?;
        }

        self.finish_file(file).await
    }

    /// Recover the sequence index from the materialized header and mark
    /// the file ready for replay.
    async fn finish_file(&self, mut file: FileRef) -> Result<()> {
        let index = read_file_index(file.local_path.as_ref()).await?;
        file.index = index;
        file.status = FileStatus::Downloaded;
        self.registry.save_file(&file)?;
        tracing::info!(file = %file.id, index, "file downloaded");

        self.bus.publish(FILE_READY, file.id.as_str());

        self.with_pending(|files| {
            files.remove(&file.id);
            self.registry.save_all(RETRIEVE_FILES_KEY, files, false)
        })?;
        Ok(())
    }
}
