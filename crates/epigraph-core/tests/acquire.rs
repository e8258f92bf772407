//! Acquisition scenarios: the checksum gate and the already-materialized
//! fast path, exercised without a network.

use std::sync::{Arc, Mutex};

use epigraph_core::bus::{EventBus, FILE_READY};
use epigraph_core::config::Config;
use epigraph_core::task::DownloadTask;
use epigraph_state::registry::DOWNLOAD_FILES_KEY;
use epigraph_state::{FileRegistry, MemoryStorage, Storage};
use epigraph_types::{ExpertId, FileId, FileRef, FileStatus};

const CONTENT: &[u8] = b"hello world";
const CONTENT_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

struct Rig {
    task: Arc<DownloadTask>,
    registry: FileRegistry,
    ready: Arc<Mutex<Vec<String>>>,
    _dir: tempfile::TempDir,
}

fn rig() -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let mut conf = Config::default();
    conf.storage.data_dir = dir.path().to_str().unwrap().to_string();

    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let bus = Arc::new(EventBus::new());

    let ready = Arc::new(Mutex::new(Vec::new()));
    let sink = ready.clone();
    bus.subscribe(FILE_READY, move |id| {
        sink.lock().unwrap().push(id.to_string());
    });

    let task = DownloadTask::new(conf, storage.clone(), bus).unwrap();
    Rig {
        task,
        registry: FileRegistry::new(storage),
        ready,
        _dir: dir,
    }
}

fn seed_pending(rig: &Rig, file: &FileRef) {
    rig.registry.save_file(file).unwrap();
    rig.registry
        .save_list(DOWNLOAD_FILES_KEY, &[file.id.clone()])
        .unwrap();
}

fn pending_file(rig: &Rig, id: &str, check_sum: &str) -> FileRef {
    let mut file = FileRef::new(FileId::new(id));
    file.expert = ExpertId::new("f01234");
    file.index = 1;
    file.check_sum = check_sum.to_string();
    let path = format!("{}/{id}", rig._dir.path().to_str().unwrap());
    file.path = path.clone();
    file.local_path = path;
    file
}

#[tokio::test]
async fn verified_local_copy_completes_without_fetch() {
    let rig = rig();
    let file = pending_file(&rig, "file-1", CONTENT_MD5);
    std::fs::write(&file.local_path, CONTENT).unwrap();
    seed_pending(&rig, &file);

    rig.task.clone().process().await.unwrap();

    let after = rig.registry.load_file(&file.id).unwrap().unwrap();
    assert_eq!(after.status, FileStatus::Downloaded);
    assert_eq!(*rig.ready.lock().unwrap(), vec!["file-1"]);
    assert!(rig.registry.load_list(DOWNLOAD_FILES_KEY).unwrap().is_empty());
}

#[tokio::test]
async fn checksum_mismatch_never_reaches_downloaded() {
    let rig = rig();
    // Local copy exists but doesn't match; the (empty) url can't be
    // fetched, so the file must stay below Downloaded and emit nothing.
    let file = pending_file(&rig, "file-1", "00000000000000000000000000000000");
    std::fs::write(&file.local_path, CONTENT).unwrap();
    seed_pending(&rig, &file);

    rig.task.clone().process().await.unwrap();

    let after = rig.registry.load_file(&file.id).unwrap().unwrap();
    assert_eq!(after.status, FileStatus::New);
    assert!(rig.ready.lock().unwrap().is_empty());
    // Still pending, so the next pass retries it.
    assert_eq!(
        rig.registry.load_list(DOWNLOAD_FILES_KEY).unwrap(),
        vec![file.id.clone()]
    );
}

#[tokio::test]
async fn missing_checksum_accepts_existing_copy() {
    let rig = rig();
    let file = pending_file(&rig, "file-1", "");
    std::fs::write(&file.local_path, CONTENT).unwrap();
    seed_pending(&rig, &file);

    rig.task.clone().process().await.unwrap();

    let after = rig.registry.load_file(&file.id).unwrap().unwrap();
    assert_eq!(after.status, FileStatus::Downloaded);
}

#[tokio::test]
async fn already_downloaded_files_are_left_alone() {
    let rig = rig();
    let mut file = pending_file(&rig, "file-1", CONTENT_MD5);
    file.status = FileStatus::Downloaded;
    seed_pending(&rig, &file);

    rig.task.clone().process().await.unwrap();

    // No event: nothing was materialized this pass.
    assert!(rig.ready.lock().unwrap().is_empty());
}
