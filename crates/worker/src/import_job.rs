//! The import job.
//!
//! Never retried: whatever goes wrong is turned into a `failed` status
//! signal for [`NotifyJob`] and the job reports `Done`.
//!
//! The `inprogress` signal is applied in place before the import starts.
//! A queued signal would sit behind this job until the import returned.

use std::sync::Arc;

use async_trait::async_trait;
use importdump_core::status::RequestStatus;
use importdump_db::models::job::Job;
use importdump_db::repositories::JobRepo;
use importdump_requests::jobs::{ImportJobParams, NotifyJobParams, IMPORT_JOB_TYPE};
use importdump_requests::{RequestManager, RequestServices};

use crate::error::JobError;
use crate::handler::{JobHandler, JobOutcome};
use crate::importer::{DumpImporter, ImportSpec, MaintenancePass};
use crate::notify_job::NotifyJob;

/// Error text recorded when a worker died mid-import.
pub const INTERRUPTED: &str = "import interrupted";

pub struct ImportJob {
    services: RequestServices,
    importer: Arc<dyn DumpImporter>,
    signals: Arc<NotifyJob>,
}

impl ImportJob {
    pub fn new(
        services: RequestServices,
        importer: Arc<dyn DumpImporter>,
        signals: Arc<NotifyJob>,
    ) -> Self {
        Self {
            services,
            importer,
            signals,
        }
    }

    async fn run(&self, params: &ImportJobParams) -> Result<(), JobError> {
        let mut manager = RequestManager::load(self.services.clone(), params.requestid).await?;
        let request = manager.request()?.clone();
        let file_path = manager.resolved_file_path().await?;

        self.importer.validate_source(&file_path).await?;
        let progress = NotifyJobParams::new(request.id, RequestStatus::InProgress, &params.username);
        if let JobOutcome::Failed(reason) = self.signals.apply_signal(&progress).await? {
            tracing::warn!(request_id = request.id, %reason, "Progress signal not applied");
        }

        let spec = ImportSpec {
            request_id: request.id,
            target: request.target.clone(),
            file_path: file_path.clone(),
            username_prefix: manager.interwiki_prefix()?.map(str::to_string),
        };
        self.importer.import(&spec).await?;

        for pass in MaintenancePass::ALL {
            self.importer.run_maintenance(&request.target, pass).await?;
        }

        self.services.hooks.after_import(&file_path, &request).await;
        self.signal(NotifyJobParams::new(
            request.id,
            RequestStatus::Complete,
            &params.username,
        ))
        .await?;
        Ok(())
    }

    /// Enqueue a status signal for the notify job.
    async fn signal(&self, params: NotifyJobParams) -> Result<(), JobError> {
        let job = JobRepo::enqueue(&self.services.pool, &params.to_job()).await?;
        tracing::debug!(
            request_id = params.requestid,
            status = %params.status,
            job_id = job.id,
            "Status signal enqueued"
        );
        Ok(())
    }
}

#[async_trait]
impl JobHandler for ImportJob {
    fn job_type(&self) -> &'static str {
        IMPORT_JOB_TYPE
    }

    async fn handle(&self, job: &Job) -> Result<JobOutcome, JobError> {
        let params: ImportJobParams = serde_json::from_value(job.params.clone())?;
        tracing::info!(request_id = params.requestid, job_id = job.id, "Import started");

        match self.run(&params).await {
            Ok(()) => {
                tracing::info!(request_id = params.requestid, "Import complete");
            }
            Err(e) => {
                tracing::error!(request_id = params.requestid, error = %e, "Import failed");
                self.signal(
                    NotifyJobParams::new(params.requestid, RequestStatus::Failed, &params.username)
                        .with_error(e.to_string()),
                )
                .await?;
            }
        }
        Ok(JobOutcome::Done)
    }

    async fn abandoned(&self, job: &Job) -> Result<(), JobError> {
        let params: ImportJobParams = serde_json::from_value(job.params.clone())?;
        tracing::warn!(request_id = params.requestid, job_id = job.id, "Import abandoned");
        self.signal(
            NotifyJobParams::new(params.requestid, RequestStatus::Failed, &params.username)
                .with_error(INTERRUPTED),
        )
        .await
    }
}
