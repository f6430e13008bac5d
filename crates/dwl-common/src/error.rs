//! Error types shared across DWL crates

use thiserror::Error;

/// Main error type for DWL
#[derive(Error, Debug)]
pub enum DwlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid identifier '{identifier}': {reason}")]
    InvalidIdentifier { identifier: String, reason: String },
}

impl DwlError {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
