//! `LISTEN`/`NOTIFY` adapter

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgListener, PgPool};
use tracing::{debug, instrument, trace};

use super::{NotificationChannel, NotifyError, Subscription};

/// Notification channel backed by PostgreSQL `LISTEN`
///
/// Each subscription holds its own dedicated connection, so notifications
/// raised by the procedure on any other connection are buffered there until
/// polled.
#[derive(Clone)]
pub struct PgNotificationChannel {
    pool: PgPool,
}

impl PgNotificationChannel {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationChannel for PgNotificationChannel {
    #[instrument(skip(self))]
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, NotifyError> {
        let subscribe_err = |e: sqlx::Error| NotifyError::Subscribe {
            topic: topic.to_string(),
            message: e.to_string(),
        };

        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(subscribe_err)?;
        listener.listen(topic).await.map_err(subscribe_err)?;

        debug!(topic, "Listening for transform job notifications");

        Ok(Box::new(PgSubscription { listener }))
    }
}

struct PgSubscription {
    listener: PgListener,
}

#[async_trait]
impl Subscription for PgSubscription {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<String>, NotifyError> {
        match tokio::time::timeout(timeout, self.listener.try_recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Ok(Some(notification))) => {
                trace!(channel = notification.channel(), "Notification received");
                Ok(Some(notification.payload().to_string()))
            }
            // try_recv yields None when the listener connection dropped;
            // anything published meanwhile is gone
            Ok(Ok(None)) => Err(NotifyError::Receive(
                "notification connection was lost".to_string(),
            )),
            Ok(Err(e)) => Err(NotifyError::Receive(e.to_string())),
        }
    }
}
