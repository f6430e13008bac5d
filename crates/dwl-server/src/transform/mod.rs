//! Transform job invocation and load verification
//!
//! The transform job is an opaque, long-running procedure that ingests the
//! staged files. Returning without error does not prove anything was loaded,
//! so a [`LoadVerifier`] independently counts rows in the destination
//! relation afterwards.

mod postgres;

pub use postgres::{PgLoadVerifier, PgTransformJob};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::staging::PATH_DELIMITER;

/// Transform job invocation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    /// The procedure ran and raised; the text is passed through untouched
    #[error("{message}")]
    ProcedureFailed { message: String },

    /// The backing store could not be reached
    #[error("{message}")]
    Connectivity { message: String },

    #[error("transform job did not finish within {secs}s")]
    TimedOut { secs: u64 },

    #[error("invalid invocation request: {0}")]
    InvalidRequest(String),
}

impl InvocationError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }
}

/// Load verification failures; never fatal for a request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("{message}")]
    QueryFailed { message: String },
}

/// Arguments for one transform job run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    /// Absolute staged paths in batch order
    pub file_paths: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
}

impl InvocationRequest {
    pub fn new(file_paths: Vec<String>, start_time: Option<DateTime<Utc>>) -> Self {
        Self {
            file_paths,
            start_time,
        }
    }

    /// Paths joined with the job contract's delimiter
    ///
    /// Refuses to build an ambiguous string: every path must be non-empty
    /// and free of the delimiter.
    pub fn joined_paths(&self) -> Result<String, InvocationError> {
        if self.file_paths.is_empty() {
            return Err(InvocationError::InvalidRequest("no file paths".to_string()));
        }

        if let Some(bad) = self
            .file_paths
            .iter()
            .find(|p| p.is_empty() || p.contains(PATH_DELIMITER))
        {
            return Err(InvocationError::InvalidRequest(format!(
                "path '{bad}' is empty or contains '{PATH_DELIMITER}'"
            )));
        }

        Ok(self.file_paths.join(&PATH_DELIMITER.to_string()))
    }
}

/// The external transform job
#[async_trait]
pub trait TransformJob: Send + Sync {
    /// Run the job synchronously over the requested files
    async fn invoke(&self, request: &InvocationRequest) -> Result<(), InvocationError>;
}

/// Post-hoc check that the transform actually produced rows
#[async_trait]
pub trait LoadVerifier: Send + Sync {
    /// Name of the relation that is counted, used in user-facing messages
    fn relation(&self) -> &str;

    async fn count_rows(&self) -> Result<i64, VerificationError>;
}
