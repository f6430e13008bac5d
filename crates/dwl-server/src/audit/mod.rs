//! Append-only line logs
//!
//! Two logs are kept side by side:
//!
//! - the **audit log** (`message.log`): one human-readable line per completed
//!   upload batch, plus messages re-posted by the client;
//! - the **fault log** (`error.log`): operational failures such as lost
//!   database connectivity, kept out of the user-facing audit trail.
//!
//! Both are instances of [`FileLineLog`] behind the [`LineLog`] trait so the
//! pipeline can be exercised against other sinks in tests.
//!
//! # Example
//!
//! ```no_run
//! use dwl_server::audit::{FileLineLog, LineLog};
//!
//! # async fn example() -> Result<(), dwl_server::audit::AuditError> {
//! let log = FileLineLog::open("./logs/message.log").await?;
//! log.append("Files uploaded and processed successfully!").await?;
//! # Ok(())
//! # }
//! ```

mod file;
mod record;

pub use file::FileLineLog;
pub use record::{single_line, AuditRecord};

use async_trait::async_trait;
use thiserror::Error;

/// Audit and fault log failures
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to open log {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to append to log {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// An append-only, line-oriented sink
#[async_trait]
pub trait LineLog: Send + Sync {
    /// Append `line` followed by a newline; embedded newlines are flattened
    async fn append(&self, line: &str) -> Result<(), AuditError>;
}
