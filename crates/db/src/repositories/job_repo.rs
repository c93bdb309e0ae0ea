//! Repository for the `jobs` table.
//!
//! Jobs are delivered at least once: a `running` job whose lease expired
//! while it still has attempts left is handed out again by `claim_next`.

use importdump_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::job::{Job, JobStatus, NewJob};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, job_type, params, status, attempts, max_attempts, last_error, \
    submitted_at, claimed_at, completed_at";

/// Error recorded on jobs whose lease expired with no attempts left.
pub const LEASE_EXPIRED: &str = "lease expired";

/// Provides queue operations for background jobs.
pub struct JobRepo;

impl JobRepo {
    /// Enqueue a pending job. Inside a transaction the job only becomes
    /// visible to workers on commit.
    pub async fn enqueue(executor: impl PgExecutor<'_>, input: &NewJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (job_type, params, status, max_attempts) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(&input.job_type)
            .bind(&input.params)
            .bind(JobStatus::Pending.as_str())
            .bind(input.max_attempts.max(1))
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Atomically claim the oldest deliverable job.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent runners never claim
    /// the same job.
    pub async fn claim_next(
        executor: impl PgExecutor<'_>,
        lease_secs: i64,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = $1, claimed_at = NOW(), attempts = attempts + 1 \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status = $2 \
                    OR (status = $1 \
                        AND claimed_at < NOW() - make_interval(secs => $3) \
                        AND attempts < max_attempts) \
                 ORDER BY submitted_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Running.as_str())
            .bind(JobStatus::Pending.as_str())
            .bind(lease_secs as f64)
            .fetch_optional(executor)
            .await
    }

    /// Push a running job's lease forward. `false` once the job is no
    /// longer running.
    pub async fn renew_lease(executor: impl PgExecutor<'_>, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE jobs SET claimed_at = NOW() WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(JobStatus::Running.as_str())
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn complete(executor: impl PgExecutor<'_>, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET status = $2, completed_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(JobStatus::Completed.as_str())
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn fail(
        executor: impl PgExecutor<'_>,
        id: DbId,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs SET status = $2, last_error = $3, completed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(JobStatus::Failed.as_str())
        .bind(error)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Put a job back in the queue after a retryable failure.
    pub async fn requeue(
        executor: impl PgExecutor<'_>,
        id: DbId,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs SET status = $2, last_error = $3, claimed_at = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(JobStatus::Pending.as_str())
        .bind(error)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Fail running jobs whose lease expired with no attempts left, returning
    /// them so their handlers can record the interruption.
    pub async fn reap_abandoned(
        executor: impl PgExecutor<'_>,
        lease_secs: i64,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = $2, last_error = $3, completed_at = NOW() \
             WHERE status = $1 \
               AND claimed_at < NOW() - make_interval(secs => $4) \
               AND attempts >= max_attempts \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Running.as_str())
            .bind(JobStatus::Failed.as_str())
            .bind(LEASE_EXPIRED)
            .bind(lease_secs as f64)
            .fetch_all(executor)
            .await
    }

    /// Jobs of one type, oldest first.
    pub async fn list_by_type(
        executor: impl PgExecutor<'_>,
        job_type: &str,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE job_type = $1 ORDER BY id ASC");
        sqlx::query_as::<_, Job>(&query)
            .bind(job_type)
            .fetch_all(executor)
            .await
    }
}
