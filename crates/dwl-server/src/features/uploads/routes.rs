use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    routing::post,
    Json, Router,
};
use tracing::{debug, warn};

use super::commands::{
    log_message::{self, LogMessageCommand, LogMessageError, LogMessageResponse},
    process_batch::{self, ProcessBatchCommand, ProcessBatchResponse},
};
use crate::{
    error::AppError,
    features::FeatureState,
    pipeline::OutcomeReport,
    staging::{UploadBatch, UploadEntry},
};

/// Multipart part names that carry a CSV file
pub const FILE_FIELDS: [&str; 2] = ["csv_files[]", "csv_files"];

/// Multipart part carrying the client's start marker
pub const START_TIME_FIELD: &str = "start_time";

pub fn uploads_routes() -> Router<FeatureState> {
    Router::new()
        .route("/upload", post(upload_batch))
        .route("/log_message", post(log_message))
}

#[tracing::instrument(skip(state, multipart))]
async fn upload_batch(
    State(state): State<FeatureState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<ProcessBatchResponse> {
    let command = match multipart {
        Ok(multipart) => read_upload(multipart).await,
        Err(rejection) => Err(UploadReadError::NotMultipart(rejection.body_text())),
    };

    let command = match command {
        Ok(command) => command,
        Err(e) => {
            warn!(error = %e, "Rejected upload request");
            return Json(ProcessBatchResponse::new(OutcomeReport::rejected(e.to_string()), None));
        },
    };

    Json(process_batch::handle(&state.orchestrator, command).await)
}

#[tracing::instrument(skip(state, body), fields(bytes = body.len()))]
async fn log_message(
    State(state): State<FeatureState>,
    body: Bytes,
) -> Result<Json<LogMessageResponse>, AppError> {
    let command = serde_json::from_slice::<LogMessageCommand>(&body).unwrap_or_else(|e| {
        debug!(error = %e, "Unreadable log message body");
        LogMessageCommand::default()
    });

    match log_message::handle(state.audit.as_ref(), command).await {
        Ok(response) => Ok(Json(response)),
        Err(e @ LogMessageError::MessageRequired) => Ok(Json(LogMessageResponse::error(e.to_string()))),
        Err(LogMessageError::Audit(e)) => Err(AppError::Audit(e)),
    }
}

#[derive(Debug, thiserror::Error)]
enum UploadReadError {
    #[error("Invalid upload request: {0}")]
    NotMultipart(String),
    #[error("Failed to read upload: {0}")]
    Field(String),
}

/// Collect file parts in submission order plus the optional start marker
async fn read_upload(mut multipart: Multipart) -> Result<ProcessBatchCommand, UploadReadError> {
    let mut batch = UploadBatch::default();
    let mut start_time = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadReadError::Field(e.body_text()))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        if FILE_FIELDS.contains(&field_name.as_str()) {
            let file_name = field.file_name().unwrap_or("").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| UploadReadError::Field(e.body_text()))?;

            // An untouched file input submits one nameless, empty part
            if file_name.is_empty() && data.is_empty() {
                continue;
            }
            batch.push(UploadEntry::new(file_name, data.to_vec()));
        } else if field_name == START_TIME_FIELD {
            let text = field
                .text()
                .await
                .map_err(|e| UploadReadError::Field(e.body_text()))?;
            start_time = Some(text);
        } else {
            debug!(field = %field_name, "Ignoring unknown multipart field");
        }
    }

    Ok(ProcessBatchCommand { batch, start_time })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UploadReadError::Field("stream ended early".to_string());
        assert_eq!(err.to_string(), "Failed to read upload: stream ended early");
    }
}
