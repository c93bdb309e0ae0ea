//! Import request rows and DTOs.

use importdump_core::capability::RequestSnapshot;
use importdump_core::diff::RequestContent;
use importdump_core::error::CoreError;
use importdump_core::status::RequestStatus;
use importdump_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `import_requests` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ImportRequest {
    pub id: DbId,
    pub source: String,
    pub target: String,
    pub reason: String,
    pub status: String,
    pub requester_id: DbId,
    pub created_at: Timestamp,
    pub locked: bool,
    pub private: bool,
    pub interwiki_prefix: Option<String>,
}

impl ImportRequest {
    /// Parsed status. The column is constrained, so failure means the schema
    /// and the enum have drifted apart.
    pub fn status(&self) -> Result<RequestStatus, CoreError> {
        RequestStatus::from_str(&self.status)
    }

    pub fn content(&self) -> RequestContent {
        RequestContent {
            source: self.source.clone(),
            target: self.target.clone(),
            reason: self.reason.clone(),
        }
    }

    pub fn snapshot(&self) -> Result<RequestSnapshot, CoreError> {
        Ok(RequestSnapshot {
            requester_id: self.requester_id,
            status: self.status()?,
            locked: self.locked,
            private: self.private,
            interwiki_prefix: self.interwiki_prefix.clone(),
        })
    }
}

/// DTO for inserting a new request. Status always starts as `pending`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateImportRequest {
    pub source: String,
    pub target: String,
    pub reason: String,
    pub requester_id: DbId,
    pub created_at: Timestamp,
    pub private: bool,
}

/// Full set of mutable fields, written back at the end of an atomic scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateImportRequest {
    pub source: String,
    pub target: String,
    pub reason: String,
    pub status: RequestStatus,
    pub locked: bool,
    pub private: bool,
}

/// Filter for the request queue.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestListQuery {
    pub status: Option<String>,
    pub target: Option<String>,
    pub requester_id: Option<DbId>,
    /// Include private requests not owned by `viewer_id`.
    #[serde(default)]
    pub include_private: bool,
    /// Private requests owned by this account are always included.
    pub viewer_id: Option<DbId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
