#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use importdump_core::config::ImportDumpConfig;
use importdump_core::notification::Notification;
use importdump_core::privilege::{ActorContext, Privilege, PrivilegeSet};
use importdump_core::status::RequestStatus;
use importdump_db::models::import_request::ImportRequest;
use importdump_db::models::user::CreateUser;
use importdump_db::repositories::{ImportRequestRepo, SiteRepo, UserRepo};
use importdump_events::{Notifier, NotifyError};
use importdump_requests::{
    ImportHooks, NewImportRequest, RequestService, RequestServices, SystemAccounts,
};
use importdump_worker::importer::check_dump_header;
use importdump_worker::{
    DumpImporter, ImportError, ImportJob, ImportSpec, JobRunner, MaintenancePass, NotifyJob,
};
use sqlx::PgPool;

pub const SITE: &str = "wikidb";

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Validates dumps for real, records every other call.
#[derive(Default)]
pub struct ScriptedImporter {
    calls: Mutex<Vec<String>>,
    fail_import: bool,
    delay: Option<Duration>,
    /// When set, the import step records the request's stored status.
    observe: Option<PgPool>,
    observed: Mutex<Vec<RequestStatus>>,
}

impl ScriptedImporter {
    pub fn failing() -> Self {
        Self {
            fail_import: true,
            ..Self::default()
        }
    }

    /// Import step that takes `delay`.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Import step that reads the request row while it runs.
    pub fn observing(pool: PgPool) -> Self {
        Self {
            observe: Some(pool),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn observed(&self) -> Vec<RequestStatus> {
        self.observed.lock().unwrap().clone()
    }
}

#[async_trait]
impl DumpImporter for ScriptedImporter {
    async fn validate_source(&self, path: &Path) -> Result<(), ImportError> {
        check_dump_header(path).await
    }

    async fn import(&self, spec: &ImportSpec) -> Result<(), ImportError> {
        self.calls.lock().unwrap().push(format!("import:{}", spec.target));
        if let Some(pool) = &self.observe {
            let row = ImportRequestRepo::find_by_id(pool, spec.request_id)
                .await
                .unwrap()
                .unwrap();
            self.observed.lock().unwrap().push(row.status().unwrap());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_import {
            return Err(ImportError::ExecutionFailed {
                exit_code: 1,
                stderr: "bad revision".to_string(),
            });
        }
        Ok(())
    }

    async fn run_maintenance(
        &self,
        _target: &str,
        pass: MaintenancePass,
    ) -> Result<(), ImportError> {
        self.calls.lock().unwrap().push(pass.as_str().to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingHooks {
    imported: Mutex<Vec<PathBuf>>,
}

impl RecordingHooks {
    pub fn imported(&self) -> Vec<PathBuf> {
        self.imported.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImportHooks for RecordingHooks {
    async fn after_import(&self, file_path: &Path, _request: &ImportRequest) {
        self.imported.lock().unwrap().push(file_path.to_path_buf());
    }
}

pub struct Fixture {
    pub pool: PgPool,
    pub staging: tempfile::TempDir,
    pub services: RequestServices,
    pub service: RequestService,
    pub accounts: SystemAccounts,
    pub notifier: Arc<RecordingNotifier>,
    pub hooks: Arc<RecordingHooks>,
    pub importer: Arc<ScriptedImporter>,
    pub requester: ActorContext,
    pub reviewer: ActorContext,
}

impl Fixture {
    pub fn runner(&self) -> JobRunner {
        let notify_job = Arc::new(NotifyJob::new(self.services.clone(), self.accounts.clone()));
        JobRunner::new(self.pool.clone(), &self.services.config)
            .with_handler(Arc::new(ImportJob::new(
                self.services.clone(),
                self.importer.clone(),
                notify_job.clone(),
            )))
            .with_handler(notify_job)
    }

    /// Submit a request and start its import.
    pub async fn started_request(&self) -> i64 {
        let id = self
            .service
            .submit(
                &self.requester,
                NewImportRequest {
                    source: "http://x".to_string(),
                    target: SITE.to_string(),
                    reason: "t".to_string(),
                    private: false,
                },
            )
            .await
            .unwrap();
        self.service.start_import(&self.reviewer, id).await.unwrap();
        id
    }
}

/// Process jobs until the queue is empty.
pub async fn drain(runner: &JobRunner) {
    while runner.run_once().await.unwrap() {}
}

pub async fn actor(pool: &PgPool, name: &str, privileges: &[Privilege]) -> ActorContext {
    let user = UserRepo::create(
        pool,
        &CreateUser {
            username: name.to_string(),
            email: None,
        },
    )
    .await
    .unwrap();
    for privilege in privileges {
        UserRepo::grant(pool, user.id, *privilege).await.unwrap();
    }
    ActorContext::new(
        user.actor(),
        PrivilegeSet::new(privileges.iter().copied()),
        Utc::now(),
    )
}

pub async fn fixture(pool: PgPool, importer: ScriptedImporter) -> Fixture {
    fixture_with(pool, importer, |_| {}).await
}

/// Like [`fixture`], with a chance to adjust the configuration.
pub async fn fixture_with(
    pool: PgPool,
    importer: ScriptedImporter,
    configure: impl FnOnce(&mut ImportDumpConfig),
) -> Fixture {
    let staging = tempfile::tempdir().unwrap();
    let mut config = ImportDumpConfig {
        staging_path: staging.path().to_path_buf(),
        notify_on_failure: vec!["Reviewer".to_string(), "Alice".to_string()],
        ..ImportDumpConfig::default()
    };
    configure(&mut config);

    SiteRepo::create(&pool, SITE).await.unwrap();
    let accounts = SystemAccounts::ensure(&pool, &config).await.unwrap();
    let requester = actor(&pool, "Alice", &[Privilege::RequestImport]).await;
    let reviewer = actor(
        &pool,
        "Reviewer",
        &[Privilege::HandleImportRequests, Privilege::ViewPrivateImportRequests],
    )
    .await;

    let notifier = Arc::new(RecordingNotifier::default());
    let hooks = Arc::new(RecordingHooks::default());
    let services = RequestServices::new(pool.clone(), config)
        .with_notifier(notifier.clone())
        .with_hooks(hooks.clone());
    let service = RequestService::new(services.clone(), accounts.clone());

    Fixture {
        pool,
        staging,
        services,
        service,
        accounts,
        notifier,
        hooks,
        importer: Arc::new(importer),
        requester,
        reviewer,
    }
}
