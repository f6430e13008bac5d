//! Staging store for uploaded files
//!
//! Uploaded blobs are written under a single staging directory keyed by their
//! original file name, before the transform job is pointed at them.
//!
//! # Guarantees
//!
//! - The staging root is created on demand; if that fails the whole batch
//!   fails with [`StageError::DirectoryUnavailable`].
//! - Entries are staged sequentially, in batch order. A failing entry is
//!   recorded in the [`StageReport`] and the remaining entries are still
//!   attempted.
//! - Every write goes to a unique temporary file that is renamed into place,
//!   so concurrent uploads of the same name never leave a torn file behind.
//!   The last rename wins.
//! - Names containing the path delimiter of the transform job contract (`,`)
//!   are rejected per entry. A root whose absolute path contains it fails the
//!   whole batch before anything is written.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Delimiter used when staged paths are handed to the transform job
pub const PATH_DELIMITER: char = ',';

/// Staging failures
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Staging directory {} is unavailable: {source}", path.display())]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{name}': {source}")]
    WriteFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Rejected file name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },
}

/// One uploaded file as received from the client
#[derive(Debug, Clone)]
pub struct UploadEntry {
    pub original_name: String,
    pub bytes: Vec<u8>,
}

impl UploadEntry {
    pub fn new(original_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            original_name: original_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Ordered set of files submitted in one request
#[derive(Debug, Clone, Default)]
pub struct UploadBatch {
    entries: Vec<UploadEntry>,
}

impl UploadBatch {
    pub fn new(entries: Vec<UploadEntry>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, entry: UploadEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[UploadEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<UploadEntry> for UploadBatch {
    fn from_iter<I: IntoIterator<Item = UploadEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A file durably written under the staging directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedFile {
    pub original_name: String,
    pub path: PathBuf,
    pub size: u64,
    /// A file with the same name and size was already staged and got replaced
    pub matched_existing: bool,
}

impl StagedFile {
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Result of staging a single entry
#[derive(Debug)]
pub enum EntryOutcome {
    Staged(StagedFile),
    Failed(StageError),
}

/// Per-entry outcomes of one staging call, in batch order
#[derive(Debug, Default)]
pub struct StageReport {
    outcomes: Vec<EntryOutcome>,
}

impl StageReport {
    pub fn outcomes(&self) -> &[EntryOutcome] {
        &self.outcomes
    }

    pub fn staged(&self) -> impl Iterator<Item = &StagedFile> {
        self.outcomes.iter().filter_map(|o| match o {
            EntryOutcome::Staged(file) => Some(file),
            EntryOutcome::Failed(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &StageError> {
        self.outcomes.iter().filter_map(|o| match o {
            EntryOutcome::Failed(err) => Some(err),
            EntryOutcome::Staged(_) => None,
        })
    }

    /// Absolute staged paths, first occurrence wins when names repeat
    pub fn staged_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for file in self.staged() {
            let path = file.path_string();
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }

}

/// Reduce a client supplied name to a safe basename
pub fn sanitize_name(raw: &str) -> Result<String, StageError> {
    let invalid = |reason| StageError::InvalidName {
        name: raw.to_string(),
        reason,
    };

    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();

    if base.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if base == "." || base == ".." {
        return Err(invalid("name is a directory reference"));
    }
    if base.contains(PATH_DELIMITER) {
        return Err(invalid("name contains the path delimiter ','"));
    }
    if base.chars().any(char::is_control) {
        return Err(invalid("name contains control characters"));
    }

    Ok(base.to_string())
}

/// Writes upload batches under a staging directory
#[derive(Debug, Clone)]
pub struct StagingStore {
    root: PathBuf,
}

impl StagingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the staging root if needed and return its absolute form
    async fn ensure_root(&self) -> Result<PathBuf, StageError> {
        let unavailable = |source| StageError::DirectoryUnavailable {
            path: self.root.clone(),
            source,
        };

        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o775);
        builder.create(&self.root).await.map_err(unavailable)?;

        let root = tokio::fs::canonicalize(&self.root).await.map_err(unavailable)?;
        if root.to_string_lossy().contains(PATH_DELIMITER) {
            return Err(unavailable(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path contains the delimiter ','",
            )));
        }
        Ok(root)
    }

    /// Stage every entry of `batch`
    #[instrument(skip(self, batch), fields(root = %self.root.display(), entries = batch.len()))]
    pub async fn stage(&self, batch: &UploadBatch) -> Result<StageReport, StageError> {
        let root = self.ensure_root().await?;
        let mut report = StageReport::default();

        for entry in batch.entries() {
            let outcome = match self.stage_entry(&root, entry).await {
                Ok(file) => EntryOutcome::Staged(file),
                Err(err) => {
                    warn!(name = %entry.original_name, error = %err, "Failed to stage file");
                    EntryOutcome::Failed(err)
                }
            };
            report.outcomes.push(outcome);
        }

        debug!(
            staged = report.staged().count(),
            failed = report.failures().count(),
            "Staging finished"
        );

        Ok(report)
    }

    async fn stage_entry(&self, root: &Path, entry: &UploadEntry) -> Result<StagedFile, StageError> {
        let name = sanitize_name(&entry.original_name)?;
        let size = entry.size();
        let destination = root.join(&name);
        let temp = root.join(format!(".{}.{}.part", name, Uuid::new_v4()));

        if let Err(source) = write_synced(&temp, &entry.bytes).await {
            // Leftover temp files are harmless, removal is best effort
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(StageError::WriteFailed { name, source });
        }

        let matched_existing = match tokio::fs::metadata(&destination).await {
            Ok(meta) if meta.is_file() && meta.len() == size => {
                info!(name = %name, size, "Replacing staged file with identical name and size");
                true
            }
            Ok(meta) if meta.is_file() => {
                debug!(name = %name, old_size = meta.len(), size, "Overwriting staged file");
                false
            }
            _ => false,
        };

        if let Err(source) = tokio::fs::rename(&temp, &destination).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(StageError::WriteFailed { name, source });
        }

        Ok(StagedFile {
            original_name: entry.original_name.clone(),
            path: destination,
            size,
            matched_existing,
        })
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_basename() {
        assert_eq!(sanitize_name("sales.csv").unwrap(), "sales.csv");
        assert_eq!(sanitize_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_name("C:\\Users\\me\\q1.csv").unwrap(), "q1.csv");
    }

    #[test]
    fn test_sanitize_rejects_bad_names() {
        assert!(matches!(sanitize_name(""), Err(StageError::InvalidName { .. })));
        assert!(matches!(sanitize_name("dir/"), Err(StageError::InvalidName { .. })));
        assert!(matches!(sanitize_name(".."), Err(StageError::InvalidName { .. })));
        assert!(matches!(sanitize_name("a,b.csv"), Err(StageError::InvalidName { .. })));
        assert!(matches!(sanitize_name("tab\tname.csv"), Err(StageError::InvalidName { .. })));
    }

    #[tokio::test]
    async fn test_stage_creates_root_and_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = StagingStore::new(dir.path().join("nested").join("uploads"));
        let batch: UploadBatch = vec![
            UploadEntry::new("a.csv", b"id,qty\n1,2\n".to_vec()),
            UploadEntry::new("b.csv", b"x".to_vec()),
        ]
        .into_iter()
        .collect();

        let report = store.stage(&batch).await.unwrap();
        let staged: Vec<_> = report.staged().collect();

        assert_eq!(staged.len(), 2);
        assert!(staged[0].path.is_absolute());
        assert!(staged[0].path.ends_with("a.csv"));
        assert_eq!(tokio::fs::read(&staged[1].path).await.unwrap(), b"x");
        assert_eq!(report.failures().count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_entries_collapse_to_one_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = StagingStore::new(dir.path());
        let batch = UploadBatch::new(vec![
            UploadEntry::new("a.csv", vec![b'1'; 10]),
            UploadEntry::new("a.csv", vec![b'2'; 10]),
        ]);

        let report = store.stage(&batch).await.unwrap();

        assert_eq!(report.staged().count(), 2);
        assert_eq!(report.staged_paths().len(), 1);
        // Second write matched the first by name and size, and won
        assert!(report.staged().nth(1).unwrap().matched_existing);
        let path = &report.staged_paths()[0];
        assert_eq!(tokio::fs::read(path).await.unwrap(), vec![b'2'; 10]);
    }

    #[tokio::test]
    async fn test_invalid_entry_does_not_abort_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = StagingStore::new(dir.path());
        let batch = UploadBatch::new(vec![
            UploadEntry::new("bad,name.csv", b"1".to_vec()),
            UploadEntry::new("good.csv", b"2".to_vec()),
        ]);

        let report = store.stage(&batch).await.unwrap();

        assert_eq!(report.outcomes().len(), 2);
        assert!(matches!(report.outcomes()[0], EntryOutcome::Failed(StageError::InvalidName { .. })));
        assert_eq!(report.staged_paths().len(), 1);
        assert!(report.staged_paths()[0].ends_with("good.csv"));
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = StagingStore::new(dir.path());
        let batch = UploadBatch::new(vec![UploadEntry::new("c.csv", b"abc".to_vec())]);

        store.stage(&batch).await.unwrap();

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["c.csv".to_string()]);
    }

    #[tokio::test]
    async fn test_unavailable_root_fails_whole_batch() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        tokio::fs::write(&blocker, b"file").await.unwrap();
        let store = StagingStore::new(blocker.join("uploads"));
        let batch = UploadBatch::new(vec![UploadEntry::new("a.csv", b"1".to_vec())]);

        let result = store.stage(&batch).await;

        assert!(matches!(result, Err(StageError::DirectoryUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_root_with_delimiter_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = StagingStore::new(dir.path().join("q1,q2"));
        let batch = UploadBatch::new(vec![UploadEntry::new("a.csv", b"1".to_vec())]);

        let err = store.stage(&batch).await.unwrap_err();

        assert!(matches!(err, StageError::DirectoryUnavailable { .. }));
        assert!(err.to_string().contains("delimiter"));
        assert!(!dir.path().join("q1,q2").join("a.csv").exists());
    }
}
