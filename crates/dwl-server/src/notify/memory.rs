//! In-process notification hub

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use super::{NotificationChannel, NotifyError, Subscription};

const TOPIC_CAPACITY: usize = 1024;

/// Broadcast hub with the same at-most-once semantics as `LISTEN`/`NOTIFY`
///
/// Messages published while nobody is subscribed are dropped.
#[derive(Clone, Default)]
pub struct MemoryNotificationChannel {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
}

impl MemoryNotificationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<String> {
        let mut topics = self
            .topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    /// Publish `message` on `topic`, returning how many subscribers got it
    pub fn publish(&self, topic: &str, message: impl Into<String>) -> usize {
        self.sender(topic).send(message.into()).unwrap_or(0)
    }
}

#[async_trait]
impl NotificationChannel for MemoryNotificationChannel {
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, NotifyError> {
        Ok(Box::new(MemorySubscription {
            receiver: self.sender(topic).subscribe(),
        }))
    }
}

struct MemorySubscription {
    receiver: broadcast::Receiver<String>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<String>, NotifyError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.receiver.recv()).await {
                Err(_elapsed) => return Ok(None),
                Ok(Ok(message)) => return Ok(Some(message)),
                Ok(Err(RecvError::Closed)) => return Ok(None),
                Ok(Err(RecvError::Lagged(skipped))) => {
                    warn!(skipped, "Notification subscriber lagged, messages dropped");
                }
            }
        }
    }
}
