//! Outcome reports returned to the client

use serde::Serialize;
use std::time::Duration;

/// Message returned when a request carries no files
pub const NO_FILES_MESSAGE: &str = "No files uploaded or paths are empty.";

const PROCESSED_PREFIX: &str = "Files uploaded and processed successfully!";

/// Terminal state of one upload batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Job succeeded and the destination relation has rows
    Loaded,
    /// Job succeeded but the destination relation is empty
    NotLoaded,
    /// Job succeeded, the row count could not be read
    VerificationUnavailable,
    NoFiles,
    StagingFailed,
    InvocationFailed,
    ConnectionFailed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::NotLoaded => "not_loaded",
            Self::VerificationUnavailable => "verification_unavailable",
            Self::NoFiles => "no_files",
            Self::StagingFailed => "staging_failed",
            Self::InvocationFailed => "invocation_failed",
            Self::ConnectionFailed => "connection_failed",
        }
    }

    pub fn result(&self) -> ResultKind {
        match self {
            Self::Loaded => ResultKind::Success,
            Self::NotLoaded | Self::VerificationUnavailable => ResultKind::PartialSuccess,
            Self::NoFiles => ResultKind::Neutral,
            Self::StagingFailed | Self::InvocationFailed | Self::ConnectionFailed => {
                ResultKind::Failure
            }
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification clients can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Success,
    PartialSuccess,
    Failure,
    Neutral,
}

/// Everything the client learns about one upload batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeReport {
    pub status: OutcomeStatus,
    pub result: ResultKind,
    /// Human-readable summary, elapsed time appended for processed batches
    pub message: String,
    /// Progress notices published by the transform job, in arrival order
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_loaded: Option<i64>,
    /// Distinct files handed to the transform job
    pub staged_files: usize,
    /// Entries that could not be staged
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected_files: Vec<String>,
    pub elapsed_seconds: f64,
}

impl OutcomeReport {
    pub fn no_files() -> Self {
        Self {
            status: OutcomeStatus::NoFiles,
            result: ResultKind::Neutral,
            message: NO_FILES_MESSAGE.to_string(),
            messages: Vec::new(),
            rows_loaded: None,
            staged_files: 0,
            rejected_files: Vec::new(),
            elapsed_seconds: 0.0,
        }
    }

    /// Request that never reached staging, e.g. an unreadable multipart body
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::StagingFailed,
            result: ResultKind::Failure,
            message: message.into(),
            ..Self::no_files()
        }
    }
}

/// Summary line for a run whose procedure call returned
pub fn processed_message(status: OutcomeStatus, relation: &str, detail: Option<&str>) -> String {
    match status {
        OutcomeStatus::Loaded => {
            format!("{PROCESSED_PREFIX}\nData loaded onto {relation} table successfully.")
        }
        OutcomeStatus::NotLoaded => {
            format!("{PROCESSED_PREFIX}\nData not loaded onto {relation} table.")
        }
        _ => format!(
            "{PROCESSED_PREFIX}\nLoad verification unavailable: {}",
            detail.unwrap_or("unknown error")
        ),
    }
}

/// `HHh MMm SSs`, hours are not wrapped at 24
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!(
        "{:02}h {:02}m {:02}s",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Append the elapsed time footer to a summary message
pub fn with_elapsed(message: &str, elapsed: Duration) -> String {
    format!("{message}\nElapsed time: {}", format_elapsed(elapsed))
}
