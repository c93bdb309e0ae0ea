//! Repository for the `request_log` table.
//!
//! Entries are hash-chained in insertion order. Appending takes a
//! transaction-scoped advisory lock so two writers cannot both chain onto
//! the same predecessor.

use importdump_core::audit::{self, LogEntryData, LOG_TYPE};
use importdump_core::types::DbId;
use sqlx::{PgConnection, PgExecutor};

use crate::models::log::{CreateLogEntry, RequestLogEntry};

const COLUMNS: &str = "\
    id, log_type, action, performer_id, request_id, comment, params, \
    integrity_hash, created_at";

/// Advisory lock key serializing appends to the chain.
const CHAIN_LOCK_KEY: i64 = 0x1D_0D06;

/// Append-only access to the public request log.
pub struct RequestLogRepo;

impl RequestLogRepo {
    /// Append an entry. Must run inside a transaction: the advisory lock is
    /// released when it ends.
    pub async fn insert(
        conn: &mut PgConnection,
        input: &CreateLogEntry,
    ) -> Result<RequestLogEntry, sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(CHAIN_LOCK_KEY)
            .execute(&mut *conn)
            .await?;

        let prev = Self::find_last_hash(&mut *conn).await?;
        let data = LogEntryData {
            log_type: LOG_TYPE,
            action: &input.action,
            performer_id: input.performer_id,
            request_id: input.request_id,
            comment: &input.comment,
            params: &input.params,
        };
        let hash = audit::compute_integrity_hash(prev.as_deref(), &data.canonical());

        let query = format!(
            "INSERT INTO request_log \
                 (log_type, action, performer_id, request_id, comment, params, integrity_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RequestLogEntry>(&query)
            .bind(LOG_TYPE)
            .bind(&input.action)
            .bind(input.performer_id)
            .bind(input.request_id)
            .bind(&input.comment)
            .bind(&input.params)
            .bind(&hash)
            .fetch_one(&mut *conn)
            .await
    }

    /// Integrity hash of the most recent entry.
    pub async fn find_last_hash(
        executor: impl PgExecutor<'_>,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT integrity_hash FROM request_log ORDER BY id DESC LIMIT 1")
            .fetch_optional(executor)
            .await
    }

    pub async fn list_for_request(
        executor: impl PgExecutor<'_>,
        request_id: DbId,
    ) -> Result<Vec<RequestLogEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM request_log WHERE request_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, RequestLogEntry>(&query)
            .bind(request_id)
            .fetch_all(executor)
            .await
    }

    /// Whole log in chain order, for integrity verification.
    pub async fn list_all(
        executor: impl PgExecutor<'_>,
    ) -> Result<Vec<RequestLogEntry>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM request_log ORDER BY id ASC");
        sqlx::query_as::<_, RequestLogEntry>(&query)
            .fetch_all(executor)
            .await
    }
}
