//! Upload orchestrator
//!
//! Drives one upload batch through the pipeline:
//!
//! ```text
//! Idle -> Staging -> Invoking -> Draining -> Verifying -> Responding -> Done
//!            |          |
//!            +----------+-------> Errored
//! ```
//!
//! An empty batch goes straight from `Idle` to `Responding`. The drain runs
//! whatever the procedure call returned, so progress published before a
//! failure still reaches the client. Verification failures are downgraded to
//! a "processed, verification unavailable" outcome and never reach `Errored`.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::report::{
    format_elapsed, processed_message, with_elapsed, OutcomeReport, OutcomeStatus,
    NO_FILES_MESSAGE,
};
use crate::{
    audit::{AuditRecord, LineLog},
    config::PipelineConfig,
    notify::{NotificationChannel, Subscription},
    staging::{StageError, StagingStore, UploadBatch},
    transform::{InvocationError, InvocationRequest, LoadVerifier, TransformJob},
};

/// Orchestration states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Staging,
    Invoking,
    Draining,
    Verifying,
    Responding,
    Done,
    Errored,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Staging => "staging",
            Self::Invoking => "invoking",
            Self::Draining => "draining",
            Self::Verifying => "verifying",
            Self::Responding => "responding",
            Self::Done => "done",
            Self::Errored => "errored",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for one orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub topic: String,
    pub poll_timeout: Duration,
    pub max_drain: Duration,
    pub invocation_timeout: Duration,
}

impl From<&PipelineConfig> for OrchestratorSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            topic: config.notify_topic.clone(),
            poll_timeout: config.poll_timeout(),
            max_drain: config.max_drain(),
            invocation_timeout: config.invocation_timeout(),
        }
    }
}

/// External collaborators of the orchestrator
#[derive(Clone)]
pub struct PipelineComponents {
    pub staging: StagingStore,
    pub channel: Arc<dyn NotificationChannel>,
    pub job: Arc<dyn TransformJob>,
    pub verifier: Arc<dyn LoadVerifier>,
    pub audit: Arc<dyn LineLog>,
    pub faults: Arc<dyn LineLog>,
}

/// Why a run ended in `Errored`
#[derive(Debug)]
enum Failure {
    Staging { message: String, operational: bool },
    Connection(String),
    Invocation(InvocationError),
}

impl Failure {
    fn status(&self) -> OutcomeStatus {
        match self {
            Failure::Staging { .. } => OutcomeStatus::StagingFailed,
            Failure::Connection(_) => OutcomeStatus::ConnectionFailed,
            Failure::Invocation(err) if err.is_connectivity() => OutcomeStatus::ConnectionFailed,
            Failure::Invocation(_) => OutcomeStatus::InvocationFailed,
        }
    }

    fn message(&self) -> String {
        match self {
            Failure::Staging { message, .. } => message.clone(),
            Failure::Connection(message) => format!("Could not connect to the database: {message}"),
            Failure::Invocation(err) if err.is_connectivity() => {
                format!("Could not connect to the database: {err}")
            }
            Failure::Invocation(InvocationError::InvalidRequest(detail)) => {
                format!("Transform job was not started: {detail}")
            }
            Failure::Invocation(err) => format!("Error executing stored procedure: {err}"),
        }
    }

    /// Line for the fault log, if this is an operational failure
    fn fault_line(&self) -> Option<String> {
        match self {
            Failure::Staging {
                operational: false, ..
            } => None,
            Failure::Staging { message, .. } => Some(format!("Staging error: {message}")),
            Failure::Connection(message) => Some(format!("Database connection error: {message}")),
            Failure::Invocation(err) if err.is_connectivity() => {
                Some(format!("Database connection error: {err}"))
            }
            Failure::Invocation(InvocationError::InvalidRequest(detail)) => {
                Some(format!("Transform request rejected: {detail}"))
            }
            Failure::Invocation(err) => Some(format!("Error executing stored procedure: {err}")),
        }
    }
}

/// Per-run bookkeeping
struct Run {
    state: PipelineState,
    started: Instant,
    staged_files: usize,
    rejected_files: Vec<String>,
    notices: Vec<String>,
}

impl Run {
    fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            started: Instant::now(),
            staged_files: 0,
            rejected_files: Vec::new(),
            notices: Vec::new(),
        }
    }

    fn enter(&mut self, next: PipelineState) {
        debug!(from = %self.state, to = %next, "Pipeline transition");
        self.state = next;
    }
}

/// Sequences staging, invocation, draining, verification and reporting
pub struct UploadOrchestrator {
    components: PipelineComponents,
    settings: OrchestratorSettings,
}

impl UploadOrchestrator {
    pub fn new(components: PipelineComponents, settings: OrchestratorSettings) -> Self {
        Self {
            components,
            settings,
        }
    }

    /// Process one batch end to end; always yields a report
    #[instrument(skip_all, fields(entries = batch.len()))]
    pub async fn run(&self, batch: UploadBatch) -> OutcomeReport {
        let mut run = Run::new();

        if batch.is_empty() {
            run.enter(PipelineState::Responding);
            info!("{}", NO_FILES_MESSAGE);
            run.enter(PipelineState::Done);
            return OutcomeReport::no_files();
        }

        run.enter(PipelineState::Staging);
        run.started = Instant::now();
        let wall_start = Utc::now();

        let stage_report = match self.components.staging.stage(&batch).await {
            Ok(report) => report,
            Err(err) => {
                let failure = Failure::Staging {
                    message: err.to_string(),
                    operational: true,
                };
                return self.fail(run, failure).await;
            }
        };

        let paths = stage_report.staged_paths();
        run.staged_files = paths.len();
        run.rejected_files = stage_report.failures().map(ToString::to_string).collect();

        if paths.is_empty() {
            let operational = stage_report
                .failures()
                .any(|e| matches!(e, StageError::WriteFailed { .. }));
            let failure = Failure::Staging {
                message: format!("No files could be staged: {}", run.rejected_files.join("; ")),
                operational,
            };
            return self.fail(run, failure).await;
        }

        run.enter(PipelineState::Invoking);
        let mut subscription = match self.components.channel.subscribe(&self.settings.topic).await {
            Ok(subscription) => subscription,
            Err(err) => return self.fail(run, Failure::Connection(err.to_string())).await,
        };

        info!(files = paths.len(), topic = %self.settings.topic, "Invoking transform job");
        let request = InvocationRequest::new(paths, Some(wall_start));
        let invocation = self.invoke(&request).await;

        run.enter(PipelineState::Draining);
        run.notices = drain(
            subscription.as_mut(),
            self.settings.poll_timeout,
            self.settings.max_drain,
        )
        .await;
        drop(subscription);

        if let Err(err) = invocation {
            return self.fail(run, Failure::Invocation(err)).await;
        }

        run.enter(PipelineState::Verifying);
        let relation = self.components.verifier.relation();
        let (status, rows, summary) = match self.components.verifier.count_rows().await {
            Ok(rows) if rows > 0 => (
                OutcomeStatus::Loaded,
                Some(rows),
                processed_message(OutcomeStatus::Loaded, relation, None),
            ),
            Ok(rows) => (
                OutcomeStatus::NotLoaded,
                Some(rows),
                processed_message(OutcomeStatus::NotLoaded, relation, None),
            ),
            Err(err) => {
                warn!(error = %err, relation, "Load verification failed");
                let detail = err.to_string();
                (
                    OutcomeStatus::VerificationUnavailable,
                    None,
                    processed_message(OutcomeStatus::VerificationUnavailable, relation, Some(&detail)),
                )
            }
        };

        run.enter(PipelineState::Responding);
        let report = self.respond(&run, status, rows, &summary).await;
        run.enter(PipelineState::Done);
        report
    }

    async fn invoke(&self, request: &InvocationRequest) -> Result<(), InvocationError> {
        let timeout = self.settings.invocation_timeout;
        match tokio::time::timeout(timeout, self.components.job.invoke(request)).await {
            Ok(result) => result,
            // Dropping the call does not stop a procedure already running server side
            Err(_elapsed) => Err(InvocationError::TimedOut {
                secs: timeout.as_secs(),
            }),
        }
    }

    async fn fail(&self, mut run: Run, failure: Failure) -> OutcomeReport {
        run.enter(PipelineState::Errored);

        let status = failure.status();
        error!(status = %status, cause = ?failure, "Upload pipeline failed");

        if let Some(line) = failure.fault_line() {
            if let Err(e) = self.components.faults.append(&line).await {
                error!(error = %e, "Failed to write fault log");
            }
        }

        self.respond(&run, status, None, &failure.message()).await
    }

    /// Build the report and append the batch's single audit record
    async fn respond(
        &self,
        run: &Run,
        status: OutcomeStatus,
        rows_loaded: Option<i64>,
        summary: &str,
    ) -> OutcomeReport {
        let elapsed = run.started.elapsed();

        let record = AuditRecord {
            status: status.to_string(),
            files: run.staged_files,
            message: summary.to_string(),
            notices: run.notices.clone(),
            elapsed: format_elapsed(elapsed),
        };
        if let Err(e) = self.components.audit.append(&record.render()).await {
            error!(error = %e, "Failed to write audit log");
        }

        info!(
            status = %status,
            files = run.staged_files,
            notices = run.notices.len(),
            rows = ?rows_loaded,
            elapsed_ms = elapsed.as_millis() as u64,
            "Upload batch finished"
        );

        OutcomeReport {
            status,
            result: status.result(),
            message: with_elapsed(summary, elapsed),
            messages: run.notices.clone(),
            rows_loaded,
            staged_files: run.staged_files,
            rejected_files: run.rejected_files.clone(),
            elapsed_seconds: elapsed.as_secs_f64(),
        }
    }
}

/// Collect notifications until the channel goes quiet or `max_drain` passes
///
/// Each poll waits at most `poll_timeout`; the first empty poll ends the
/// drain. A receive error also ends it, keeping what was collected.
pub async fn drain(
    subscription: &mut dyn Subscription,
    poll_timeout: Duration,
    max_drain: Duration,
) -> Vec<String> {
    let deadline = Instant::now() + max_drain;
    let mut messages = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(collected = messages.len(), "Notification drain hit its time limit");
            break;
        }

        match subscription.poll(poll_timeout.min(remaining)).await {
            Ok(Some(message)) => {
                debug!(%message, "Transform job notice");
                messages.push(message);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, collected = messages.len(), "Notification drain aborted");
                break;
            }
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use async_trait::async_trait;

    /// Produces a message every 100ms forever
    struct Chatty;

    #[async_trait]
    impl Subscription for Chatty {
        async fn poll(&mut self, _timeout: Duration) -> Result<Option<String>, NotifyError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(Some("tick".to_string()))
        }
    }

    /// Yields queued messages, then an error
    struct Scripted(Vec<Result<Option<String>, NotifyError>>);

    #[async_trait]
    impl Subscription for Scripted {
        async fn poll(&mut self, _timeout: Duration) -> Result<Option<String>, NotifyError> {
            if self.0.is_empty() {
                Ok(None)
            } else {
                self.0.remove(0)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_is_bounded_by_max_drain() {
        let started = Instant::now();
        let messages = drain(&mut Chatty, Duration::from_millis(1000), Duration::from_secs(1)).await;

        assert!(!messages.is_empty());
        assert!(messages.len() <= 11);
        assert!(started.elapsed() < Duration::from_millis(1200));
    }

    #[tokio::test]
    async fn test_drain_stops_on_first_empty_poll() {
        let mut sub = Scripted(vec![
            Ok(Some("a".to_string())),
            Ok(None),
            Ok(Some("never".to_string())),
        ]);
        let messages = drain(&mut sub, Duration::from_millis(10), Duration::from_secs(5)).await;
        assert_eq!(messages, vec!["a"]);
    }

    #[tokio::test]
    async fn test_drain_keeps_messages_on_error() {
        let mut sub = Scripted(vec![
            Ok(Some("a".to_string())),
            Ok(Some("b".to_string())),
            Err(NotifyError::Receive("connection reset".to_string())),
        ]);
        let messages = drain(&mut sub, Duration::from_millis(10), Duration::from_secs(5)).await;
        assert_eq!(messages, vec!["a", "b"]);
    }

    #[test]
    fn test_failure_messages() {
        let failure = Failure::Invocation(InvocationError::ProcedureFailed {
            message: "division by zero".to_string(),
        });
        assert_eq!(failure.status(), OutcomeStatus::InvocationFailed);
        assert_eq!(failure.message(), "Error executing stored procedure: division by zero");

        let failure = Failure::Invocation(InvocationError::Connectivity {
            message: "connection refused".to_string(),
        });
        assert_eq!(failure.status(), OutcomeStatus::ConnectionFailed);
        assert_eq!(
            failure.fault_line().as_deref(),
            Some("Database connection error: connection refused")
        );

        let failure = Failure::Staging {
            message: "No files could be staged: bad name".to_string(),
            operational: false,
        };
        assert!(failure.fault_line().is_none());
    }

    #[test]
    fn test_rejected_request_is_not_reported_as_procedure_error() {
        let failure = Failure::Invocation(InvocationError::InvalidRequest(
            "path '/data/a,b.csv' is empty or contains ','".to_string(),
        ));

        assert_eq!(failure.status(), OutcomeStatus::InvocationFailed);
        assert!(failure.message().starts_with("Transform job was not started: "));
        assert!(!failure.message().contains("stored procedure"));
        assert_eq!(
            failure.fault_line().as_deref(),
            Some("Transform request rejected: path '/data/a,b.csv' is empty or contains ','")
        );
    }
}
