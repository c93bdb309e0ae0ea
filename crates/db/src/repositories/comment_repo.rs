//! Repository for the `import_request_comments` table.

use importdump_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::comment::{CreateRequestComment, RequestComment};

const COLUMNS: &str = "id, request_id, author_id, body, created_at";

/// Append-only access to request comment threads.
pub struct RequestCommentRepo;

impl RequestCommentRepo {
    pub async fn insert(
        executor: impl PgExecutor<'_>,
        input: &CreateRequestComment,
    ) -> Result<RequestComment, sqlx::Error> {
        let query = format!(
            "INSERT INTO import_request_comments (request_id, author_id, body, created_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RequestComment>(&query)
            .bind(input.request_id)
            .bind(input.author_id)
            .bind(&input.body)
            .bind(input.created_at)
            .fetch_one(executor)
            .await
    }

    /// Comments in insertion order.
    pub async fn list_for_request(
        executor: impl PgExecutor<'_>,
        request_id: DbId,
    ) -> Result<Vec<RequestComment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM import_request_comments \
             WHERE request_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, RequestComment>(&query)
            .bind(request_id)
            .fetch_all(executor)
            .await
    }

    /// Every non-system account that has commented on a request.
    pub async fn participants(
        executor: impl PgExecutor<'_>,
        request_id: DbId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT DISTINCT c.author_id FROM import_request_comments c \
             JOIN users u ON u.id = c.author_id \
             WHERE c.request_id = $1 AND NOT u.is_system \
             ORDER BY c.author_id",
        )
        .bind(request_id)
        .fetch_all(executor)
        .await
    }

    pub async fn count_for_request(
        executor: impl PgExecutor<'_>,
        request_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM import_request_comments WHERE request_id = $1")
            .bind(request_id)
            .fetch_one(executor)
            .await
    }
}
