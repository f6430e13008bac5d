//! Upload processing pipeline
//!
//! [`UploadOrchestrator`] sequences one batch through staging, transform
//! invocation, notification draining, load verification and audit
//! reporting, and condenses the result into an [`OutcomeReport`].

mod orchestrator;
mod report;

pub use orchestrator::{
    drain, OrchestratorSettings, PipelineComponents, PipelineState, UploadOrchestrator,
};
pub use report::{
    format_elapsed, processed_message, with_elapsed, OutcomeReport, OutcomeStatus, ResultKind,
    NO_FILES_MESSAGE,
};
