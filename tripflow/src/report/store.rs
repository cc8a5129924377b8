//! Append-only report storage.

use super::Report;
use crate::errors::StorageError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const EXTENSION: &str = "md";
const MAX_SUFFIX: u32 = 9_999;

/// Where finished reports are kept.
///
/// Keys sort lexically in creation order, so `list` can order by key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Stores a report and returns the key it can be read back with.
    async fn store(&self, report: &Report) -> Result<String, StorageError>;

    /// Lists stored keys, newest first.
    async fn list(&self) -> Result<Vec<String>, StorageError>;

    /// Reads a stored report's markdown.
    async fn read(&self, key: &str) -> Result<String, StorageError>;
}

/// Rejects keys that could escape the store or are not ones we produce.
fn check_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Yields `key`, `key_0002`, `key_0003`, ... padded so keys still sort in
/// creation order.
fn candidates(key: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(key.to_string()).chain((2..=MAX_SUFFIX).map(move |n| format!("{key}_{n:04}")))
}

fn exhausted(key: &str) -> StorageError {
    StorageError::Io(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free key left for {key}"),
    ))
}

/// Writes a freshly created report file, removing it again if any step fails
/// so a half-written report is never listed.
async fn write_or_discard(mut file: tokio::fs::File, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let written = async {
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await
    }
    .await;

    if let Err(e) = written {
        drop(file);
        if let Err(remove) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %remove, "Partial report not removed");
        }
        return Err(e.into());
    }
    Ok(())
}

/// Stores reports as `<key>.md` files in one directory.
#[derive(Debug, Clone)]
pub struct FileReportStore {
    dir: PathBuf,
}

impl FileReportStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The reports directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{EXTENSION}"))
    }

    /// Creates the directory and checks a file can be written to it.
    pub async fn check_writable(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let marker = self.dir.join(".tripflow_write_check");
        tokio::fs::write(&marker, b"ok").await?;
        tokio::fs::remove_file(&marker).await?;
        Ok(())
    }
}

#[async_trait]
impl ReportStore for FileReportStore {
    async fn store(&self, report: &Report) -> Result<String, StorageError> {
        check_key(&report.key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        for key in candidates(&report.key) {
            let path = self.path_for(&key);
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match opened {
                Ok(file) => {
                    write_or_discard(file, &path, report.markdown.as_bytes()).await?;
                    debug!(path = %path.display(), "Report written");
                    return Ok(key);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(exhausted(&report.key))
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if check_key(stem).is_ok() {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort_unstable_by(|a, b| b.cmp(a));
        Ok(keys)
    }

    async fn read(&self, key: &str) -> Result<String, StorageError> {
        check_key(key)?;
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keeps reports in memory.
#[derive(Debug, Default)]
pub struct InMemoryReportStore {
    reports: RwLock<BTreeMap<String, String>>,
}

impl InMemoryReportStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.read().len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.read().is_empty()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn store(&self, report: &Report) -> Result<String, StorageError> {
        check_key(&report.key)?;
        let mut reports = self.reports.write();
        let key = candidates(&report.key)
            .find(|k| !reports.contains_key(k))
            .ok_or_else(|| exhausted(&report.key))?;
        reports.insert(key.clone(), report.markdown.clone());
        Ok(key)
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.reports.read().keys().rev().cloned().collect())
    }

    async fn read(&self, key: &str) -> Result<String, StorageError> {
        self.reports
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::assemble_at;
    use crate::testing::fixtures;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn report(second: u32) -> Report {
        let at = chrono::Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, second).unwrap();
        assemble_at(&fixtures::completed_run(), "m", at)
    }

    #[tokio::test]
    async fn test_file_store_round_trip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(dir.path().join("reports"));
        assert!(store.list().await.unwrap().is_empty());

        let older = store.store(&report(1)).await.unwrap();
        let newer = store.store(&report(2)).await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec![newer.clone(), older]);
        assert_eq!(store.read(&newer).await.unwrap(), report(2).markdown);
        assert!(dir.path().join("reports").join(format!("{newer}.md")).exists());
    }

    #[tokio::test]
    async fn test_file_store_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(dir.path());
        let report = report(1);

        let first = store.store(&report).await.unwrap();
        let second = store.store(&report).await.unwrap();
        let third = store.store(&report).await.unwrap();

        assert_eq!(first, report.key);
        assert_eq!(second, format!("{}_0002", report.key));
        assert_eq!(third, format!("{}_0003", report.key));
        assert_eq!(store.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_many_collisions_list_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(dir.path());
        let report = report(1);

        let mut stored = Vec::new();
        for _ in 0..12 {
            stored.push(store.store(&report).await.unwrap());
        }
        stored.reverse();

        assert_eq!(store.list().await.unwrap(), stored);
        assert_eq!(stored[0], format!("{}_0012", report.key));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(dir.path());
        let path = store.path_for("travel_plan_partial");
        std::fs::write(&path, "").unwrap();

        let read_only = tokio::fs::File::open(&path).await.unwrap();
        let err = write_or_discard(read_only, &path, b"# Travel Plan").await.unwrap_err();

        assert!(matches!(err, StorageError::Io(_)));
        assert!(!path.exists());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_rejects_bad_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(dir.path());

        let err = store.read("../secrets").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));

        let err = store.read("travel_plan_missing").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_file_store_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let store = FileReportStore::new(dir.path());
        let key = store.store(&report(1)).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec![key]);
        store.check_writable().await.unwrap();
    }

    #[test]
    fn test_memory_store() {
        tokio_test::block_on(async {
            let store = InMemoryReportStore::new();
            let a = tokio_test::assert_ok!(store.store(&report(1)).await);
            let b = tokio_test::assert_ok!(store.store(&report(1)).await);
            assert_ne!(a, b);
            assert_eq!(store.len(), 2);
            assert_eq!(store.list().await.unwrap(), vec![b, a]);
            let err = tokio_test::assert_err!(store.read("nope").await);
            assert!(matches!(err, StorageError::NotFound(_)));
        });
    }
}
