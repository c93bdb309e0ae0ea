//! Repository for the `notifications` table.

use importdump_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::notification::NotificationRow;

/// Column list for `notifications` queries.
const COLUMNS: &str = "id, user_id, category, request_id, agent_id, extra, is_read, created_at";

/// Provides insert and query operations for notifications.
pub struct NotificationRepo;

impl NotificationRepo {
    /// Create a notification for a user, returning the generated ID.
    pub async fn create(
        executor: impl PgExecutor<'_>,
        user_id: DbId,
        category: &str,
        request_id: DbId,
        agent_id: DbId,
        extra: &serde_json::Value,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO notifications (user_id, category, request_id, agent_id, extra) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(user_id)
        .bind(category)
        .bind(request_id)
        .bind(agent_id)
        .bind(extra)
        .fetch_one(executor)
        .await
    }

    /// List notifications for a user, newest first.
    pub async fn list_for_user(
        executor: impl PgExecutor<'_>,
        user_id: DbId,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<NotificationRow>, sqlx::Error> {
        let filter = if unread_only { "AND is_read = false" } else { "" };
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE user_id = $1 {filter} \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await
    }

    pub async fn list_for_request(
        executor: impl PgExecutor<'_>,
        request_id: DbId,
    ) -> Result<Vec<NotificationRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notifications WHERE request_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(request_id)
            .fetch_all(executor)
            .await
    }

    pub async fn count_for_request(
        executor: impl PgExecutor<'_>,
        request_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE request_id = $1")
            .bind(request_id)
            .fetch_one(executor)
            .await
    }

    /// Mark all unread notifications as read for a user.
    pub async fn mark_all_read(
        executor: impl PgExecutor<'_>,
        user_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = true WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }
}
