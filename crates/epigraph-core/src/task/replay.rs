//! Checkpointed replay: apply each expert's file sequence, line by line,
//! into the external graph store, surviving restarts without re-applying
//! or skipping lines.
//!
//! The durability contract is persist-after-each-line: a crash right
//! after a statement executes and before its checkpoint lands is the only
//! window replayed twice, so statements must be idempotent
//! (`CREATE ... IF NOT EXISTS`, upserts).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::AsyncBufReadExt;
use tokio::task::JoinSet;

use epigraph_state::registry::REPLAY_FILES_KEY;
use epigraph_state::{FileRegistry, Storage, StorageError};
use epigraph_types::{ExpertId, FileId, FileRef, FileStatus, WriteRecord};

use crate::bus::{EventBus, FILE_NEEDS_FETCH, FILE_READY};
use crate::config::Config;
use crate::escape;
use crate::graph::GraphExecutor;
use crate::task::PassGuard;

/// Replay task: one checkpoint per expert, strict sequence order within
/// an expert, experts replayed concurrently.
pub struct ReplayTask {
    conf: Config,
    registry: FileRegistry,
    bus: Arc<EventBus>,
    graph: Arc<dyn GraphExecutor>,

    files: Mutex<Option<HashMap<FileId, FileRef>>>,
    records: Mutex<HashMap<ExpertId, WriteRecord>>,
    active: Mutex<HashSet<ExpertId>>,
    processing: AtomicBool,
}

/// Releases an expert's in-flight claim when its replay unit ends.
struct ActiveGuard {
    task: Arc<ReplayTask>,
    expert: ExpertId,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.task
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.expert);
    }
}

impl ReplayTask {
    /// Create the task and wire it to the acquisition-complete topic.
    ///
    /// # Errors
    ///
    /// Fails when no graph store is configured.
    pub fn new(
        conf: Config,
        storage: Arc<dyn Storage>,
        bus: Arc<EventBus>,
        graph: Arc<dyn GraphExecutor>,
    ) -> Result<Arc<Self>> {
        if conf.graph.address.is_empty() {
            bail!("need graph config");
        }

        let task = Arc::new(Self {
            conf,
            registry: FileRegistry::new(storage),
            bus: bus.clone(),
            graph,
            files: Mutex::new(None),
            records: Mutex::new(HashMap::new()),
            active: Mutex::new(HashSet::new()),
            processing: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&task);
        bus.subscribe(FILE_READY, move |file_id| {
            if let Some(task) = weak.upgrade() {
                task.on_file_ready(file_id);
            }
        });
        Ok(task)
    }

    /// Acquisition-complete handler: pull the file into the replay map
    /// and persist the list before returning, so a crash right after the
    /// event still finds the file on restart.
    fn on_file_ready(&self, file_id: &str) {
        let id = FileId::new(file_id);
        let file = match self.registry.load_file(&id) {
            Ok(Some(file)) => file,
            Ok(None) => {
                tracing::warn!(file = file_id, "ready event for unknown file");
                return;
            }
            Err(e) => {
                tracing::error!(file = file_id, error = %e, "failed to load file info");
                return;
            }
        };

        let saved = self.with_pending(|files| {
            files.insert(id, file);
            self.registry.save_all(REPLAY_FILES_KEY, files, false)
        });
        match saved {
            Ok(()) => tracing::info!(file = file_id, "replay file queued"),
            Err(e) => tracing::error!(file = file_id, error = %e, "failed to save file info"),
        }
    }

    fn with_pending<T>(
        &self,
        f: impl FnOnce(&mut HashMap<FileId, FileRef>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut guard = self.files.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            let files = self.registry.load_all(REPLAY_FILES_KEY)?;
            tracing::info!(count = files.len(), "load replay data");
            *guard = Some(files);
        }
        f(guard.as_mut().expect("pending map just loaded"))
    }

    /// One replay pass: fan out one unit per expert that has files and no
    /// unit already in flight. Re-entrant calls while a pass runs are
    /// no-ops.
    ///
    /// # Errors
    ///
    /// Returns registry failures; per-expert replay failures are logged
    /// and retried from the persisted checkpoint on the next pass.
    pub async fn process(self: Arc<Self>) -> Result<()> {
        if self.processing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _guard = PassGuard(&self.processing);

        let mut groups: HashMap<ExpertId, Vec<FileRef>> = HashMap::new();
        self.with_pending(|files| {
            for file in files.values() {
                groups.entry(file.expert.clone()).or_default().push(file.clone());
            }
            Ok(())
        })?;

        let mut units = JoinSet::new();
        for (expert, mut group) in groups {
            group.sort_by_key(|f| f.index);

            {
                let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
                if !active.insert(expert.clone()) {
                    tracing::debug!(expert = %expert, "replay already in flight");
                    continue;
                }
            }

            let task = self.clone();
            units.spawn(async move {
                let guard = ActiveGuard {
                    task: task.clone(),
                    expert: expert.clone(),
                };
                if let Err(e) = task.replay_expert(&expert, group).await {
                    tracing::error!(expert = %expert, error = %e, "write graph failed");
                }
                drop(guard);
            });
        }
        while units.join_next().await.is_some() {}
        Ok(())
    }

    async fn replay_expert(&self, expert: &ExpertId, files: Vec<FileRef>) -> Result<()> {
        for file in files {
            tracing::debug!(
                file = %file.id,
                index = file.index,
                count = file.count,
                "start file replay"
            );
            if file.status < FileStatus::Downloaded {
                tracing::error!(
                    file = %file.id,
                    status = ?file.status,
                    "file not downloaded for replay"
                );
                self.bus.publish(FILE_NEEDS_FETCH, file.id.as_str());
                continue;
            }
            self.replay_file(expert, &file).await?;
        }
        Ok(())
    }

    /// Record the arriving file in the checkpoint history, then replay
    /// whichever file the checkpoint currently points at.
    async fn replay_file(&self, expert: &ExpertId, file: &FileRef) -> Result<()> {
        let mut record = self.checkpoint(expert)?;
        record.history.insert(file.index, file.id.clone());
        self.registry.save_record(expert, &record)?;
        self.cache_record(expert, &record);

        let Some(target_id) = record.history.get(&record.index).cloned() else {
            tracing::warn!(
                expert = %expert,
                index = record.index,
                known = record.history.len(),
                "sequence gap: file for current index not ready"
            );
            return Ok(());
        };
        let target = self
            .registry
            .load_file(&target_id)?
            .ok_or_else(|| anyhow!("file record missing for {target_id}"))?;

        let result = self.apply_file(&target, &mut record).await;
        match &result {
            Ok(()) => {
                record.index += 1;
                record.line = 0;
                tracing::info!(
                    expert = %expert,
                    index = record.index,
                    "file replay complete, checkpoint advanced"
                );
                let mut done = target;
                done.status = FileStatus::Replayed;
                self.registry.save_file(&done)?;
            }
            Err(e) => {
                tracing::error!(
                    expert = %expert,
                    file = %target_id,
                    line = record.line,
                    error = %e,
                    "file replay aborted"
                );
            }
        }
        self.registry.save_record(expert, &record)?;
        self.cache_record(expert, &record);
        result
    }

    /// Load-or-init the expert's checkpoint, cached per task instance.
    fn checkpoint(&self, expert: &ExpertId) -> Result<WriteRecord> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = records.get(expert) {
            return Ok(record.clone());
        }
        let record = self
            .registry
            .load_record(expert)?
            .unwrap_or_else(WriteRecord::new);
        tracing::info!(
            expert = %expert,
            index = record.index,
            line = record.line,
            "load replay record"
        );
        records.insert(expert.clone(), record.clone());
        Ok(record)
    }

    fn cache_record(&self, expert: &ExpertId, record: &WriteRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(expert.clone(), record.clone());
    }

    /// Scan the file and execute every not-yet-applied line, persisting
    /// the checkpoint after each one. `Ok(())` means clean end-of-file.
    async fn apply_file(&self, file: &FileRef, record: &mut WriteRecord) -> Result<()> {
        let handle = tokio::fs::File::open(&file.local_path)
            .await
            .with_context(|| format!("failed to open {}", file.local_path))?;
        let mut lines = tokio::io::BufReader::new(handle).lines();
        let ddl_wait = Duration::from_secs(self.conf.graph.ddl_wait_secs);

        let mut line_no: i64 = 0;
        while let Some(content) = lines.next_line().await? {
            line_no += 1;

            if line_no == 1 {
                // Header: comma-separated key:value fields; the first
                // value is the target domain. Re-parsed on every resume.
                match header_domain(&content) {
                    Some(domain) => {
                        tracing::info!(
                            file = %file.id,
                            domain,
                            expert = %file.expert,
                            "file header"
                        );
                        record.domain = Some(domain);
                    }
                    None => {
                        tracing::warn!(file = %file.id, header = content, "malformed header");
                    }
                }
                continue;
            }

            if line_no <= record.line {
                continue;
            }

            let upper = content.to_ascii_uppercase();
            let create_space = upper.contains("CREATE SPACE");
            if create_space {
                if let Some(space) = space_argument(&content) {
                    if record.domain.as_deref() != Some(space.as_str()) {
                        tracing::info!(file = %file.id, space, "space redeclared by content");
                        record.domain = Some(space);
                    }
                }
            }

            let domain = match record.domain.clone() {
                Some(domain) => domain,
                None => self
                    .conf
                    .graph
                    .spaces
                    .get(file.expert.as_str())
                    .cloned()
                    .ok_or_else(|| {
                        anyhow!(
                            "no domain known for expert {} at line {line_no}",
                            file.expert
                        )
                    })?,
            };

            let stmt = match escape::reserved_in_statement(&content) {
                Some(ident) => escape::escape_identifier(&content, ident),
                None => content.clone(),
            };

            let scope = if create_space { None } else { Some(domain.as_str()) };
            self.graph
                .execute(scope, &stmt)
                .await
                .with_context(|| format!("graph execute failed at line {line_no}"))?;

            record.line = line_no;
            self.registry.save_record(&file.expert, record)?;

            // Give the store time to propagate schema changes.
            if upper.contains("CREATE") && !ddl_wait.is_zero() {
                tokio::time::sleep(ddl_wait).await;
            }
        }
        Ok(())
    }
}

/// Domain from a header line: first comma-separated field, value after
/// the colon, trimmed.
fn header_domain(line: &str) -> Option<String> {
    let field = line.split(',').next()?;
    let value = field.split(':').nth(1)?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Space name from a `CREATE SPACE` statement's argument.
fn space_argument(stmt: &str) -> Option<String> {
    let tokens: Vec<&str> = stmt.split_whitespace().collect();
    let space_at = tokens.iter().position(|t| t.eq_ignore_ascii_case("SPACE"))?;
    let mut at = space_at + 1;
    if tokens.get(at)?.eq_ignore_ascii_case("IF") {
        at += 3; // IF NOT EXISTS
    }
    let name = tokens.get(at)?;
    let name = name.split(['(', ';']).next()?.trim();
    (!name.is_empty()).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_domain_takes_first_field() {
        assert_eq!(
            header_domain("domain: spaceA ,index:1,count:3"),
            Some("spaceA".to_string())
        );
        assert_eq!(header_domain("domain:spaceB"), Some("spaceB".to_string()));
        assert_eq!(header_domain("no colon here"), None);
        assert_eq!(header_domain("domain:  ,index:1"), None);
    }

    #[test]
    fn space_argument_handles_if_not_exists() {
        assert_eq!(
            space_argument("CREATE SPACE IF NOT EXISTS spaceA(vid_type=FIXED_STRING(64));"),
            Some("spaceA".to_string())
        );
        assert_eq!(
            space_argument("CREATE SPACE spaceB (vid_type=FIXED_STRING(64))"),
            Some("spaceB".to_string())
        );
        assert_eq!(space_argument("CREATE TAG person(name string)"), None);
    }
}
