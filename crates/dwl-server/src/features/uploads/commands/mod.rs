pub mod log_message;
pub mod process_batch;

pub use log_message::{LogMessageCommand, LogMessageError, LogMessageResponse};
pub use process_batch::{ProcessBatchCommand, ProcessBatchResponse};
