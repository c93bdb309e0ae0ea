//! Repository for the `import_requests` table.

use importdump_core::status::RequestStatus;
use importdump_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::import_request::{
    CreateImportRequest, ImportRequest, RequestListQuery, UpdateImportRequest,
};

/// Column list for `import_requests` queries.
const COLUMNS: &str = "\
    id, source, target, reason, status, requester_id, created_at, \
    locked, private, interwiki_prefix";

/// Maximum page size for the request queue.
const MAX_LIMIT: i64 = 100;

/// Default page size for the request queue.
const DEFAULT_LIMIT: i64 = 50;

/// Provides CRUD operations for import requests.
pub struct ImportRequestRepo;

impl ImportRequestRepo {
    /// Insert a new request in `pending` status, returning the created row.
    pub async fn create(
        executor: impl PgExecutor<'_>,
        input: &CreateImportRequest,
    ) -> Result<ImportRequest, sqlx::Error> {
        let query = format!(
            "INSERT INTO import_requests \
                 (source, target, reason, status, requester_id, created_at, private) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ImportRequest>(&query)
            .bind(&input.source)
            .bind(&input.target)
            .bind(&input.reason)
            .bind(RequestStatus::Pending.as_str())
            .bind(input.requester_id)
            .bind(input.created_at)
            .bind(input.private)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<ImportRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM import_requests WHERE id = $1");
        sqlx::query_as::<_, ImportRequest>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Fetch and row-lock a request. Only meaningful inside a transaction;
    /// the lock is held until it ends.
    pub async fn find_for_update(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<ImportRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM import_requests WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, ImportRequest>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn exists(executor: impl PgExecutor<'_>, id: DbId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM import_requests WHERE id = $1)")
            .bind(id)
            .fetch_one(executor)
            .await
    }

    /// Write back every mutable field. Returns `None` if the row is gone.
    pub async fn update(
        executor: impl PgExecutor<'_>,
        id: DbId,
        input: &UpdateImportRequest,
    ) -> Result<Option<ImportRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE import_requests SET \
                 source = $2, target = $3, reason = $4, status = $5, \
                 locked = $6, private = $7 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ImportRequest>(&query)
            .bind(id)
            .bind(&input.source)
            .bind(&input.target)
            .bind(&input.reason)
            .bind(input.status.as_str())
            .bind(input.locked)
            .bind(input.private)
            .fetch_optional(executor)
            .await
    }

    /// Undo `set_interwiki_prefix` when the mapping could not be stored.
    pub async fn clear_interwiki_prefix(
        executor: impl PgExecutor<'_>,
        id: DbId,
        prefix: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_requests SET interwiki_prefix = NULL \
             WHERE id = $1 AND interwiki_prefix = $2",
        )
        .bind(id)
        .bind(prefix)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the interwiki prefix if none is assigned yet.
    ///
    /// Returns `false` when the request already carries a non-empty prefix.
    pub async fn set_interwiki_prefix(
        executor: impl PgExecutor<'_>,
        id: DbId,
        prefix: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_requests SET interwiki_prefix = $2 \
             WHERE id = $1 AND COALESCE(interwiki_prefix, '') = ''",
        )
        .bind(id)
        .bind(prefix)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a pending request with exactly this reason, used for duplicate
    /// submission detection. `exclude_id` skips the request being edited.
    pub async fn find_pending_by_reason(
        executor: impl PgExecutor<'_>,
        reason: &str,
        exclude_id: Option<DbId>,
    ) -> Result<Option<ImportRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM import_requests \
             WHERE status = $1 AND md5(reason) = md5($2) AND reason = $2 \
               AND ($3::BIGINT IS NULL OR id <> $3) \
             ORDER BY id LIMIT 1"
        );
        sqlx::query_as::<_, ImportRequest>(&query)
            .bind(RequestStatus::Pending.as_str())
            .bind(reason)
            .bind(exclude_id)
            .fetch_optional(executor)
            .await
    }

    /// List requests, newest first.
    pub async fn list(
        executor: impl PgExecutor<'_>,
        params: &RequestListQuery,
    ) -> Result<Vec<ImportRequest>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        let query = format!(
            "SELECT {COLUMNS} FROM import_requests \
             WHERE ($1::TEXT IS NULL OR status = $1) \
               AND ($2::TEXT IS NULL OR target = $2) \
               AND ($3::BIGINT IS NULL OR requester_id = $3) \
               AND (NOT private OR $4 OR requester_id = $5) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $6 OFFSET $7"
        );
        sqlx::query_as::<_, ImportRequest>(&query)
            .bind(&params.status)
            .bind(&params.target)
            .bind(params.requester_id)
            .bind(params.include_private)
            .bind(params.viewer_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }
}
