//! Repository for the per-site `interwiki` table.

use sqlx::PgExecutor;

use crate::models::interwiki::InterwikiEntry;

const COLUMNS: &str = "dbname, prefix, url, created_at";

pub struct InterwikiRepo;

impl InterwikiRepo {
    pub async fn find(
        executor: impl PgExecutor<'_>,
        dbname: &str,
        prefix: &str,
    ) -> Result<Option<InterwikiEntry>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM interwiki WHERE dbname = $1 AND prefix = $2");
        sqlx::query_as::<_, InterwikiEntry>(&query)
            .bind(dbname)
            .bind(prefix)
            .fetch_optional(executor)
            .await
    }

    /// Insert a mapping. Returns `false` if the prefix is already defined on
    /// that site.
    pub async fn insert(
        executor: impl PgExecutor<'_>,
        dbname: &str,
        prefix: &str,
        url: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO interwiki (dbname, prefix, url) VALUES ($1, $2, $3) \
             ON CONFLICT (dbname, prefix) DO NOTHING",
        )
        .bind(dbname)
        .bind(prefix)
        .bind(url)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
