//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>`. Every stored notification is
//! published here once per receiver so delivery channels can pick it up.

use chrono::{DateTime, Utc};
use importdump_core::notification::Notification;
use importdump_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PlatformEvent
// ---------------------------------------------------------------------------

/// Prefix of every event type published for a notification category.
pub const NOTIFICATION_EVENT_PREFIX: &str = "importdump.";

/// A notification event addressed to one receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dot-separated event name, e.g. `"importdump.import-failed"`.
    pub event_type: String,

    /// Request the event concerns.
    pub request_id: Option<DbId>,

    /// Account that caused the event.
    pub actor_user_id: Option<DbId>,

    /// Account the event is addressed to.
    pub receiver_id: Option<DbId>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            request_id: None,
            actor_user_id: None,
            receiver_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Event for one receiver of a notification.
    pub fn for_receiver(notification: &Notification, receiver_id: DbId) -> Self {
        Self::new(format!("{NOTIFICATION_EVENT_PREFIX}{}", notification.category))
            .with_request(notification.request_id)
            .with_actor(notification.agent_id)
            .with_receiver(receiver_id)
            .with_payload(notification.extra.clone())
    }

    pub fn with_request(mut self, request_id: DbId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_receiver(mut self, user_id: DbId) -> Self {
        self.receiver_id = Some(user_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Notification category, if this event carries one.
    pub fn category(&self) -> Option<&str> {
        self.event_type.strip_prefix(NOTIFICATION_EVENT_PREFIX)
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest messages are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Dropped if there are
    /// none.
    pub fn publish(&self, event: PlatformEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use importdump_core::notification::CATEGORY_IMPORT_FAILED;

    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let notification = Notification::new(CATEGORY_IMPORT_FAILED, 42, 7)
            .with_extra("reason", "disk full");
        bus.publish(PlatformEvent::for_receiver(&notification, 9));

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "importdump.import-failed");
        assert_eq!(received.category(), Some(CATEGORY_IMPORT_FAILED));
        assert_eq!(received.request_id, Some(42));
        assert_eq!(received.actor_user_id, Some(7));
        assert_eq!(received.receiver_id, Some(9));
        assert_eq!(received.payload["reason"], "disk full");
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PlatformEvent::new("multi.test"));

        assert_eq!(rx1.recv().await.unwrap().event_type, "multi.test");
        assert_eq!(rx2.recv().await.unwrap().event_type, "multi.test");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        EventBus::default().publish(PlatformEvent::new("orphan.event"));
    }

    #[test]
    fn non_notification_event_has_no_category() {
        assert!(PlatformEvent::new("system.start").category().is_none());
    }
}
