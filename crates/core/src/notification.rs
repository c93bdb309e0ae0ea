//! Notification categories and the payload handed to the notifier.
//!
//! Category names must match the values stored in the
//! `notifications.category` column.

use serde::Serialize;

use crate::types::DbId;

/// A new request was submitted. Sent to the configured watchers.
pub const CATEGORY_NEW_REQUEST: &str = "new-request";

/// Someone commented on a request.
pub const CATEGORY_REQUEST_COMMENT: &str = "request-comment";

/// A request changed status. Sent to the requester.
pub const CATEGORY_STATUS_UPDATE: &str = "request-status-update";

/// An import job failed. Sent to the configured reviewers.
pub const CATEGORY_IMPORT_FAILED: &str = "import-failed";

pub const ALL_CATEGORIES: &[&str] = &[
    CATEGORY_NEW_REQUEST,
    CATEGORY_REQUEST_COMMENT,
    CATEGORY_STATUS_UPDATE,
    CATEGORY_IMPORT_FAILED,
];

/// One fan-out call: the same payload delivered to every receiver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub category: &'static str,
    pub receivers: Vec<DbId>,
    pub request_id: DbId,
    /// Account that caused the notification; never notified about its own
    /// action.
    pub agent_id: DbId,
    /// Category-specific data: request URL, comment text, failure reason.
    pub extra: serde_json::Value,
}

impl Notification {
    pub fn new(category: &'static str, request_id: DbId, agent_id: DbId) -> Self {
        Self {
            category,
            receivers: Vec::new(),
            request_id,
            agent_id,
            extra: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_receivers(mut self, receivers: impl IntoIterator<Item = DbId>) -> Self {
        self.receivers.extend(receivers);
        self
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if let serde_json::Value::Object(ref mut map) = self.extra {
            map.insert(key.to_string(), value.into());
        }
        self
    }

    /// Receivers other than the agent, deduplicated, in first-seen order.
    pub fn effective_receivers(&self) -> Vec<DbId> {
        let mut out = Vec::with_capacity(self.receivers.len());
        for id in &self.receivers {
            if *id != self.agent_id && !out.contains(id) {
                out.push(*id);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_is_never_a_receiver() {
        let n = Notification::new(CATEGORY_REQUEST_COMMENT, 1, 5).with_receivers([5, 6, 6, 7]);
        assert_eq!(n.effective_receivers(), vec![6, 7]);
    }

    #[test]
    fn extra_accumulates_keys() {
        let n = Notification::new(CATEGORY_IMPORT_FAILED, 1, 2)
            .with_extra("reason", "boom")
            .with_extra("request-url", "/q/1");
        assert_eq!(n.extra["reason"], "boom");
        assert_eq!(n.extra["request-url"], "/q/1");
    }
}
