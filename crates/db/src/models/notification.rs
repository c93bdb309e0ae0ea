//! Notification rows.

use importdump_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `notifications` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NotificationRow {
    pub id: DbId,
    pub user_id: DbId,
    pub category: String,
    pub request_id: DbId,
    pub agent_id: Option<DbId>,
    pub extra: serde_json::Value,
    pub is_read: bool,
    pub created_at: Timestamp,
}
