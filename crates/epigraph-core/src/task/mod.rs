//! Acquisition and replay tasks plus the scheduler driving them.

pub mod download;
pub mod manager;
pub mod replay;
pub mod retrieve;

pub use download::DownloadTask;
pub use manager::TaskManager;
pub use replay::ReplayTask;
pub use retrieve::RetrieveTask;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use md5::{Digest, Md5};

/// Resets a task's in-progress flag when a pass ends, however it ends.
pub(crate) struct PassGuard<'a>(pub &'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// MD5 of a file's content, lowercase hex. Blocking; call through
/// [`compute_md5`] from async contexts.
pub(crate) fn file_md5(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Md5::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// [`file_md5`] on the blocking pool.
pub(crate) async fn compute_md5(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || file_md5(&path))
        .await
        .context("checksum task panicked")?
}

/// Whether a local copy at `path` already satisfies `expected`. Missing
/// file is false; an empty expectation accepts any existing copy.
pub(crate) async fn checksum_matches(path: &Path, expected: &str) -> Result<bool> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(false);
    }
    if expected.is_empty() {
        return Ok(true);
    }
    Ok(compute_md5(path).await? == expected)
}

/// Sequence index from a file's header line (`domain:<space>,index:<n>`).
pub(crate) fn parse_file_index(path: &Path) -> Result<i64> {
    use std::io::BufRead;

    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut header = String::new();
    std::io::BufReader::new(file)
        .read_line(&mut header)
        .with_context(|| format!("failed to read header of {}", path.display()))?;

    let field = header
        .split(',')
        .nth(1)
        .with_context(|| format!("header missing index field: {header:?}"))?;
    let value = field
        .split(':')
        .nth(1)
        .with_context(|| format!("malformed index field: {field:?}"))?;
    value
        .trim()
        .parse()
        .with_context(|| format!("non-numeric index: {value:?}"))
}

/// [`parse_file_index`] on the blocking pool.
pub(crate) async fn read_file_index(path: &Path) -> Result<i64> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || parse_file_index(&path))
        .await
        .context("index parse task panicked")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn md5_matches_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"hello world").unwrap();
        assert_eq!(
            file_md5(&path).unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[test]
    fn parses_index_from_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "domain:spaceA,index:3,count:10").unwrap();
        writeln!(f, "INSERT VERTEX person(name) VALUES 'a':('x')").unwrap();
        assert_eq!(parse_file_index(&path).unwrap(), 3);
    }

    #[test]
    fn malformed_header_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, "no commas here\n").unwrap();
        assert!(parse_file_index(&path).is_err());
    }

    #[tokio::test]
    async fn checksum_matches_cases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        assert!(checksum_matches(&path, "5eb63bbbe01eeed093cb22bb8f5acdc3")
            .await
            .unwrap());
        assert!(!checksum_matches(&path, "0000").await.unwrap());
        assert!(checksum_matches(&path, "").await.unwrap());
        assert!(!checksum_matches(&dir.path().join("absent"), "")
            .await
            .unwrap());
    }

    #[test]
    fn pass_guard_resets_flag() {
        let flag = AtomicBool::new(true);
        {
            let _guard = PassGuard(&flag);
        }
        assert!(!flag.load(Ordering::SeqCst));
    }
}
