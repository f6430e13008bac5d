//! CSV batch uploads

pub mod commands;
pub mod routes;

pub use commands::{
    LogMessageCommand, LogMessageError, LogMessageResponse, ProcessBatchCommand,
    ProcessBatchResponse,
};
pub use routes::uploads_routes;
