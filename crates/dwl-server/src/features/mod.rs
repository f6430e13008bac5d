//! Feature modules implementing the DWL HTTP API
//!
//! Each feature is a vertical slice with its own commands and routes:
//!
//! - **uploads**: CSV batch upload through the load pipeline, and re-posting
//!   client-side messages to the audit log
//!
//! # Architecture
//!
//! - `commands/` - Write operations, one module per command with its own
//!   request, response, error and `handle` function
//! - `routes.rs` - HTTP route definitions and request extraction

pub mod uploads;

use axum::Router;
use std::sync::Arc;

use crate::{audit::LineLog, pipeline::UploadOrchestrator};

/// Shared state for feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Pipeline that processes upload batches
    pub orchestrator: Arc<UploadOrchestrator>,
    /// Audit log that `/log_message` appends to
    pub audit: Arc<dyn LineLog>,
}

/// Creates the router with all feature routes mounted at the root
///
/// - `POST /upload` - Process a batch of CSV files
/// - `POST /log_message` - Append a client message to the audit log
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().merge(uploads::uploads_routes().with_state(state))
}
