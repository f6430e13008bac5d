use serde::{Deserialize, Serialize};

use crate::audit::{AuditError, LineLog};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogMessageCommand {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogMessageResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LogMessageResponse {
    pub fn success() -> Self {
        Self {
            status: "success",
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LogMessageError {
    #[error("No message provided")]
    MessageRequired,
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl LogMessageCommand {
    pub fn validate(&self) -> Result<&str, LogMessageError> {
        match self.message.as_deref() {
            Some(message) if !message.trim().is_empty() => Ok(message),
            _ => Err(LogMessageError::MessageRequired),
        }
    }
}

#[tracing::instrument(skip(audit, command))]
pub async fn handle(
    audit: &dyn LineLog,
    command: LogMessageCommand,
) -> Result<LogMessageResponse, LogMessageError> {
    let message = command.validate()?;
    audit.append(message).await?;
    Ok(LogMessageResponse::success())
}
