//! Background job runner.
//!
//! Polls for pending jobs every `poll_interval` and hands each one to the
//! handler registered for its type. Claims use `SELECT FOR UPDATE SKIP
//! LOCKED` via [`JobRepo::claim_next`], so several runners can share one
//! queue. While a handler runs, the runner renews the job's lease every
//! third of the lease. A job whose lease lapses anyway (its runner died) is
//! redelivered while it has attempts left and reaped otherwise.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use importdump_core::config::ImportDumpConfig;
use importdump_db::models::job::Job;
use importdump_db::repositories::JobRepo;
use importdump_db::DbPool;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::handler::{JobHandler, JobOutcome};

pub struct JobRunner {
    pool: DbPool,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    poll_interval: Duration,
    lease_secs: i64,
    heartbeat_interval: Duration,
}

impl JobRunner {
    pub fn new(pool: DbPool, config: &ImportDumpConfig) -> Self {
        Self {
            pool,
            handlers: HashMap::new(),
            poll_interval: Duration::from_millis(config.job_poll_interval_ms.max(1)),
            lease_secs: i64::try_from(config.job_lease_secs).unwrap_or(i64::MAX),
            heartbeat_interval: Duration::from_millis(
                (config.job_lease_secs.saturating_mul(1_000) / 3).max(100),
            ),
        }
    }

    /// Register `handler` for its job type, replacing any earlier one.
    pub fn with_handler(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(handler.job_type(), handler);
        self
    }

    /// Run the polling loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            lease_secs = self.lease_secs,
            job_types = ?self.handlers.keys().collect::<Vec<_>>(),
            "Job runner started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job runner shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.cycle(&cancel).await {
                        tracing::error!(error = %e, "Job cycle failed");
                    }
                }
            }
        }
    }

    /// One cycle: reap abandoned jobs, then drain the queue.
    async fn cycle(&self, cancel: &CancellationToken) -> Result<(), JobError> {
        self.reap().await?;
        while !cancel.is_cancelled() && self.run_once().await? {}
        Ok(())
    }

    /// Claim and process at most one job. Returns whether a job was claimed.
    pub async fn run_once(&self) -> Result<bool, JobError> {
        let Some(job) = JobRepo::claim_next(&self.pool, self.lease_secs).await? else {
            return Ok(false);
        };
        tracing::info!(
            job_id = job.id,
            job_type = %job.job_type,
            attempt = job.attempts,
            "Job claimed",
        );
        self.process(&job).await?;
        Ok(true)
    }

    async fn process(&self, job: &Job) -> Result<(), JobError> {
        let Some(handler) = self.handlers.get(job.job_type.as_str()) else {
            tracing::error!(job_id = job.id, job_type = %job.job_type, "No handler for job type");
            JobRepo::fail(&self.pool, job.id, "no handler registered for job type").await?;
            return Ok(());
        };

        let outcome = match self.handle_with_heartbeat(handler.as_ref(), job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "Job handler failed");
                JobOutcome::Retry(e.to_string())
            }
        };

        match outcome {
            JobOutcome::Done => {
                JobRepo::complete(&self.pool, job.id).await?;
                tracing::debug!(job_id = job.id, "Job completed");
            }
            JobOutcome::Retry(reason) if job.has_attempts_left() => {
                JobRepo::requeue(&self.pool, job.id, &reason).await?;
                tracing::warn!(job_id = job.id, %reason, "Job requeued");
            }
            JobOutcome::Retry(reason) | JobOutcome::Failed(reason) => {
                JobRepo::fail(&self.pool, job.id, &reason).await?;
                tracing::warn!(job_id = job.id, %reason, "Job failed");
            }
        }
        Ok(())
    }

    /// Run `handler`, renewing the job's lease until it returns.
    async fn handle_with_heartbeat(
        &self,
        handler: &dyn JobHandler,
        job: &Job,
    ) -> Result<JobOutcome, JobError> {
        let work = handler.handle(job);
        tokio::pin!(work);
        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires at once; the claim itself just set the lease.
        heartbeat.tick().await;

        loop {
            tokio::select! {
                result = &mut work => return result,
                _ = heartbeat.tick() => {
                    match JobRepo::renew_lease(&self.pool, job.id).await {
                        Ok(true) => tracing::trace!(job_id = job.id, "Lease renewed"),
                        Ok(false) => tracing::warn!(job_id = job.id, "Lease lost while running"),
                        Err(e) => tracing::warn!(job_id = job.id, error = %e, "Lease renewal failed"),
                    }
                }
            }
        }
    }

    /// Fail jobs whose lease expired with no attempts left and let their
    /// handlers react. Returns how many were reaped.
    pub async fn reap(&self) -> Result<usize, JobError> {
        let reaped = JobRepo::reap_abandoned(&self.pool, self.lease_secs).await?;
        for job in &reaped {
            tracing::warn!(job_id = job.id, job_type = %job.job_type, "Job abandoned");
            if let Some(handler) = self.handlers.get(job.job_type.as_str()) {
                if let Err(e) = handler.abandoned(job).await {
                    tracing::error!(job_id = job.id, error = %e, "Abandoned-job hook failed");
                }
            }
        }
        Ok(reaped.len())
    }
}
