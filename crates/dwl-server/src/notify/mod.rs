//! Progress notifications published by the transform job
//!
//! The transform job reports progress by publishing free-text messages on a
//! well-known topic. Delivery is at-most-once: there is no replay, so the
//! pipeline must subscribe *before* it starts the job, and anything published
//! after the drain loop stops is lost.
//!
//! Every subscriber listens on the same topic and messages carry no batch
//! identifier. When uploads overlap, each drain also collects the other
//! batches' messages, so a report's notices are only attributable to its own
//! batch when it ran alone.
//!
//! - [`PgNotificationChannel`] listens through PostgreSQL `LISTEN`/`NOTIFY`.
//! - [`MemoryNotificationChannel`] is an in-process hub used in tests and by
//!   in-process job implementations.

mod memory;
mod postgres;

pub use memory::MemoryNotificationChannel;
pub use postgres::PgNotificationChannel;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Notification channel failures
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to subscribe to '{topic}': {message}")]
    Subscribe { topic: String, message: String },

    #[error("Failed to receive notification: {0}")]
    Receive(String),
}

/// Publish/subscribe channel the transform job reports through
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Start buffering messages published on `topic` from now on
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, NotifyError>;
}

/// A live subscription on one topic
#[async_trait]
pub trait Subscription: Send {
    /// Wait up to `timeout` for the next message
    ///
    /// `Ok(None)` means nothing arrived in time (or the channel closed).
    async fn poll(&mut self, timeout: Duration) -> Result<Option<String>, NotifyError>;
}
