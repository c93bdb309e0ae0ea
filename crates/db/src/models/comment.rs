//! Request comment rows.

use importdump_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `import_request_comments` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct RequestComment {
    pub id: DbId,
    pub request_id: DbId,
    pub author_id: DbId,
    pub body: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRequestComment {
    pub request_id: DbId,
    pub author_id: DbId,
    pub body: String,
    pub created_at: Timestamp,
}
