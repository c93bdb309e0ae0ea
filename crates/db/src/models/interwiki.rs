//! Interwiki table rows and site group rows.

use importdump_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `interwiki` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct InterwikiEntry {
    pub dbname: String,
    pub prefix: String,
    pub url: String,
    pub created_at: Timestamp,
}
