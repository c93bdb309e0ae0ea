//! Repository for the `sites` and `site_user_groups` tables.

use sqlx::PgExecutor;

/// Lookups over the set of known local sites.
pub struct SiteRepo;

impl SiteRepo {
    pub async fn create(executor: impl PgExecutor<'_>, dbname: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO sites (dbname) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(dbname)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn is_known(executor: impl PgExecutor<'_>, dbname: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sites WHERE dbname = $1)")
            .bind(dbname)
            .fetch_one(executor)
            .await
    }

    pub async fn add_user_group(
        executor: impl PgExecutor<'_>,
        dbname: &str,
        group_name: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO site_user_groups (dbname, group_name) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(dbname)
        .bind(group_name)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// User groups defined on a site, sorted by name.
    pub async fn user_groups(
        executor: impl PgExecutor<'_>,
        dbname: &str,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT group_name FROM site_user_groups WHERE dbname = $1 ORDER BY group_name",
        )
        .bind(dbname)
        .fetch_all(executor)
        .await
    }
}
