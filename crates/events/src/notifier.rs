//! The notification seam used by the request workflow.

use std::sync::Arc;

use async_trait::async_trait;
use importdump_core::notification::Notification;
use importdump_db::repositories::NotificationRepo;
use importdump_db::DbPool;

use crate::bus::{EventBus, PlatformEvent};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Fan-out of one notification payload to its receivers.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `notification` to every receiver except the agent.
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Used when no notification subsystem is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::debug!(
            category = notification.category,
            request_id = notification.request_id,
            "Notification subsystem absent, dropping notification"
        );
        Ok(())
    }
}

/// Stores one `notifications` row per receiver and publishes a
/// [`PlatformEvent`] for each on the bus.
pub struct DbNotifier {
    pool: DbPool,
    bus: Arc<EventBus>,
}

impl DbNotifier {
    pub fn new(pool: DbPool, bus: Arc<EventBus>) -> Self {
        Self { pool, bus }
    }
}

#[async_trait]
impl Notifier for DbNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let receivers = notification.effective_receivers();
        if receivers.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for receiver in &receivers {
            NotificationRepo::create(
                &mut *tx,
                *receiver,
                notification.category,
                notification.request_id,
                notification.agent_id,
                &notification.extra,
            )
            .await?;
        }
        tx.commit().await?;

        for receiver in receivers {
            self.bus
                .publish(PlatformEvent::for_receiver(notification, receiver));
        }

        tracing::debug!(
            category = notification.category,
            request_id = notification.request_id,
            "Notification stored"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use importdump_core::notification::CATEGORY_REQUEST_COMMENT;

    use super::*;

    #[tokio::test]
    async fn noop_notifier_accepts_everything() {
        let n = Notification::new(CATEGORY_REQUEST_COMMENT, 1, 2).with_receivers([3]);
        assert!(NoopNotifier.notify(&n).await.is_ok());
    }
}
