//! Request log rows. Append-only, no `updated_at`.

use importdump_core::audit::LogEntryData;
use importdump_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `request_log` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RequestLogEntry {
    pub id: DbId,
    pub log_type: String,
    pub action: String,
    pub performer_id: DbId,
    pub request_id: DbId,
    pub comment: String,
    pub params: serde_json::Value,
    pub integrity_hash: String,
    pub created_at: Timestamp,
}

/// DTO for appending a log entry. The integrity hash is computed by the
/// repository.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLogEntry {
    pub action: String,
    pub performer_id: DbId,
    pub request_id: DbId,
    pub comment: String,
    pub params: serde_json::Value,
}

impl RequestLogEntry {
    /// Canonical content as hashed at insert time.
    pub fn canonical(&self) -> String {
        LogEntryData {
            log_type: &self.log_type,
            action: &self.action,
            performer_id: self.performer_id,
            request_id: self.request_id,
            comment: &self.comment,
            params: &self.params,
        }
        .canonical()
    }
}
