//! Repository for the `users` and `user_privileges` tables.

use importdump_core::privilege::{Privilege, PrivilegeSet};
use importdump_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::user::{CreateUser, User};

const COLUMNS: &str = "id, username, email, is_active, is_system, created_at";

/// Provides account lookups and privilege grants.
pub struct UserRepo;

impl UserRepo {
    pub async fn create(
        executor: impl PgExecutor<'_>,
        input: &CreateUser,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (username, email) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(&input.username)
            .bind(&input.email)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_username(
        executor: impl PgExecutor<'_>,
        username: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE username = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(executor)
            .await
    }

    /// Active accounts among `usernames`. Unknown names are skipped.
    pub async fn find_active_by_usernames(
        executor: impl PgExecutor<'_>,
        usernames: &[String],
    ) -> Result<Vec<User>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM users \
             WHERE username = ANY($1) AND is_active \
             ORDER BY id"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(usernames)
            .fetch_all(executor)
            .await
    }

    /// Create the named system account, or flag an existing one as system.
    pub async fn ensure_system_account(
        executor: impl PgExecutor<'_>,
        username: &str,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (username, is_system) VALUES ($1, TRUE) \
             ON CONFLICT (username) DO UPDATE SET is_system = TRUE \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_one(executor)
            .await
    }

    pub async fn privileges_for(
        executor: impl PgExecutor<'_>,
        user_id: DbId,
    ) -> Result<PrivilegeSet, sqlx::Error> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT privilege FROM user_privileges WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(executor)
                .await?;
        Ok(PrivilegeSet::from_names(&names))
    }

    pub async fn grant(
        executor: impl PgExecutor<'_>,
        user_id: DbId,
        privilege: Privilege,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO user_privileges (user_id, privilege) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(privilege.as_str())
        .execute(executor)
        .await?;
        Ok(())
    }

    /// The subset of `user_ids` holding every privilege in `required`.
    pub async fn filter_by_privileges(
        executor: impl PgExecutor<'_>,
        user_ids: &[DbId],
        required: &[Privilege],
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let names: Vec<&str> = required.iter().map(|p| p.as_str()).collect();
        sqlx::query_scalar(
            "SELECT user_id FROM user_privileges \
             WHERE user_id = ANY($1) AND privilege = ANY($2) \
             GROUP BY user_id \
             HAVING COUNT(DISTINCT privilege) = $3 \
             ORDER BY user_id",
        )
        .bind(user_ids)
        .bind(&names)
        .bind(names.len() as i64)
        .fetch_all(executor)
        .await
    }
}
