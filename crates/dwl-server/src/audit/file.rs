//! File-backed line log

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};
use tracing::debug;

use super::{record::single_line, AuditError, LineLog};

/// Line log appending to a single file, never truncated or rotated
///
/// Appends from concurrent requests are serialised by an async mutex and each
/// record is written with one `write_all` on an `O_APPEND` handle, so lines
/// never interleave.
#[derive(Debug)]
pub struct FileLineLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLineLog {
    /// Open (or create) the log file, creating parent directories as needed
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| AuditError::Open {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(open_err)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(open_err)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl LineLog for FileLineLog {
    async fn append(&self, line: &str) -> Result<(), AuditError> {
        let mut record = single_line(line);
        record.push('\n');

        let write_err = |source| AuditError::Write {
            path: self.path.display().to_string(),
            source,
        };

        let mut file = self.file.lock().await;
        file.write_all(record.as_bytes()).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;

        debug!(path = %self.path.display(), bytes = record.len(), "Appended log line");
        Ok(())
    }
}
