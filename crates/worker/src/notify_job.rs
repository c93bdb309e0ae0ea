//! The notify job: applies the import's status signals to the request.
//!
//! Jobs only move a request forward. A signal for the status the request
//! already has is a redelivery and changes nothing.

use async_trait::async_trait;
use chrono::Utc;
use importdump_core::notification::{CATEGORY_IMPORT_FAILED, CATEGORY_STATUS_UPDATE};
use importdump_core::privilege::Privilege;
use importdump_core::status::{job_transition, JobTransition, RequestStatus, StatusHandling};
use importdump_core::types::DbId;
use importdump_db::models::job::Job;
use importdump_db::repositories::UserRepo;
use importdump_requests::jobs::{NotifyJobParams, NOTIFY_JOB_TYPE};
use importdump_requests::{RequestManager, RequestServices, SystemAccounts};

use crate::error::JobError;
use crate::handler::{JobHandler, JobOutcome};

const SCOPE_LABEL: &str = "notify-job";

pub struct NotifyJob {
    services: RequestServices,
    accounts: SystemAccounts,
    handling: StatusHandling,
}

impl NotifyJob {
    pub fn new(services: RequestServices, accounts: SystemAccounts) -> Self {
        let handling = services.config.status_handling();
        Self {
            services,
            accounts,
            handling,
        }
    }

    /// Apply one status signal in its own short atomic scope.
    ///
    /// Attribution failures come back as [`JobOutcome::Failed`] with the
    /// status untouched; storage errors are returned.
    pub async fn apply_signal(&self, params: &NotifyJobParams) -> Result<JobOutcome, JobError> {
        let mut manager = RequestManager::load(self.services.clone(), params.requestid).await?;
        if manager.request().is_err() {
            tracing::warn!(request_id = params.requestid, "Status signal for a missing request");
            return Ok(JobOutcome::Failed(format!(
                "request {} not found",
                params.requestid
            )));
        }

        manager.start_atomic(SCOPE_LABEL).await?;
        let applied = self.apply(&mut manager, params).await;
        match applied {
            Ok(true) => {
                manager.end_atomic(SCOPE_LABEL).await?;
                Ok(JobOutcome::Done)
            }
            Ok(false) => {
                manager.cancel_atomic().await?;
                Ok(JobOutcome::Done)
            }
            Err(e) => {
                if let Err(rollback) = manager.cancel_atomic().await {
                    tracing::error!(error = %rollback, "Failed to roll back notify job scope");
                }
                match e {
                    JobError::Attribution(reason) => {
                        tracing::error!(
                            request_id = params.requestid,
                            status = %params.status,
                            %reason,
                            "Status left unchanged"
                        );
                        Ok(JobOutcome::Failed(reason))
                    }
                    other => Err(other),
                }
            }
        }
    }

    /// Stage the transition inside the open scope. `Ok(false)` when there is
    /// nothing to apply.
    async fn apply(
        &self,
        manager: &mut RequestManager,
        params: &NotifyJobParams,
    ) -> Result<bool, JobError> {
        let id = manager.id()?;
        let current = manager.status()?;
        match job_transition(current, params.status) {
            JobTransition::Apply => {}
            JobTransition::AlreadyApplied => {
                tracing::debug!(request_id = id, status = %params.status, "Status already applied");
                return Ok(false);
            }
            JobTransition::Refused => {
                tracing::warn!(
                    request_id = id,
                    from = %current,
                    to = %params.status,
                    "Refusing backward status signal"
                );
                return Ok(false);
            }
        }

        let performer = match params.status {
            RequestStatus::InProgress => {
                if !self.handling.accepts_job_progress() {
                    tracing::info!(request_id = id, "Ignoring progress signal, automated imports are off");
                    return Ok(false);
                }
                self.resolve_user(&params.username).await?
            }
            _ => UserRepo::find_by_username(&self.services.pool, &params.username)
                .await?
                .map(|u| u.id)
                .unwrap_or(self.accounts.status_update.id),
        };

        let comment = params.lasterror.as_deref().unwrap_or_default();
        manager
            .record_status_change(
                params.status,
                comment,
                performer,
                self.accounts.status_update.id,
                Utc::now(),
            )
            .await?;

        let agent = self.accounts.status_update.id;
        let notification = if params.status == RequestStatus::Failed {
            manager
                .notification(CATEGORY_IMPORT_FAILED, agent)?
                .with_receivers(self.failure_receivers(manager.request()?.private).await?)
                .with_extra("reason", comment)
        } else {
            manager
                .notification(CATEGORY_STATUS_UPDATE, agent)?
                .with_receivers([manager.requester()?])
                .with_extra("status", params.status.as_str())
        };
        manager.send_notification(notification).await;

        tracing::info!(request_id = id, status = %params.status, "Status signal applied");
        Ok(true)
    }

    async fn resolve_user(&self, username: &str) -> Result<DbId, JobError> {
        UserRepo::find_by_username(&self.services.pool, username)
            .await?
            .map(|u| u.id)
            .ok_or_else(|| JobError::Attribution(format!("unknown user '{username}'")))
    }

    /// Configured failure watchers holding the review privilege, plus the
    /// private-view privilege for private requests.
    async fn failure_receivers(&self, private: bool) -> Result<Vec<DbId>, JobError> {
        let usernames = &self.services.config.notify_on_failure;
        if usernames.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<DbId> = UserRepo::find_active_by_usernames(&self.services.pool, usernames)
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();

        let mut required = vec![Privilege::HandleImportRequests];
        if private {
            required.push(Privilege::ViewPrivateImportRequests);
        }
        Ok(UserRepo::filter_by_privileges(&self.services.pool, &ids, &required).await?)
    }
}

#[async_trait]
impl JobHandler for NotifyJob {
    fn job_type(&self) -> &'static str {
        NOTIFY_JOB_TYPE
    }

    async fn handle(&self, job: &Job) -> Result<JobOutcome, JobError> {
        let params: NotifyJobParams = serde_json::from_value(job.params.clone())?;
        self.apply_signal(&params).await
    }
}
