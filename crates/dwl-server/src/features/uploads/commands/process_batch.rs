use serde::Serialize;

use crate::{
    pipeline::{OutcomeReport, UploadOrchestrator},
    staging::UploadBatch,
};

#[derive(Debug, Clone)]
pub struct ProcessBatchCommand {
    pub batch: UploadBatch,
    /// Client-side start marker, echoed back untouched
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessBatchResponse {
    #[serde(flatten)]
    pub report: OutcomeReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}

impl ProcessBatchResponse {
    pub fn new(report: OutcomeReport, start_time: Option<String>) -> Self {
        Self { report, start_time }
    }
}

#[tracing::instrument(skip(orchestrator, command), fields(entries = command.batch.len()))]
pub async fn handle(
    orchestrator: &UploadOrchestrator,
    command: ProcessBatchCommand,
) -> ProcessBatchResponse {
    let report = orchestrator.run(command.batch).await;
    ProcessBatchResponse::new(report, command.start_time)
}
