use async_trait::async_trait;
use importdump_db::models::job::Job;

use crate::error::JobError;

/// How a handler finished with a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The job did what it was for, including recording a failure it
    /// handled itself.
    Done,
    /// Try again later, while attempts remain.
    Retry(String),
    /// Give up; the reason is stored on the job row.
    Failed(String),
}

/// Processes jobs of one type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;

    async fn handle(&self, job: &Job) -> Result<JobOutcome, JobError>;

    /// Called once for a job whose lease expired with no attempts left.
    async fn abandoned(&self, _job: &Job) -> Result<(), JobError> {
        Ok(())
    }
}
