#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use importdump_core::config::ImportDumpConfig;
use importdump_core::notification::Notification;
use importdump_core::privilege::{ActorContext, Privilege, PrivilegeSet};
use importdump_db::models::user::CreateUser;
use importdump_db::repositories::{SiteRepo, UserRepo};
use importdump_events::{Notifier, NotifyError};
use importdump_requests::{RequestServices, RequestService, SystemAccounts};
use sqlx::PgPool;

pub const SITE: &str = "wikidb";
pub const OTHER_SITE: &str = "otherwiki";

/// Keeps every notification handed to it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn categories(&self) -> Vec<&'static str> {
        self.sent().iter().map(|n| n.category).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub struct Fixture {
    pub pool: PgPool,
    pub services: RequestServices,
    pub service: RequestService,
    pub notifier: Arc<RecordingNotifier>,
    pub accounts: SystemAccounts,
    pub requester: ActorContext,
    pub reviewer: ActorContext,
    pub stranger: ActorContext,
}

pub fn test_config() -> ImportDumpConfig {
    ImportDumpConfig {
        staging_path: std::env::temp_dir().join("importdump-tests"),
        ..ImportDumpConfig::default()
    }
}

/// Create an account holding `privileges` and return its context.
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

/// Seed two sites, the system accounts, a requester, a reviewer and an
/// unprivileged bystander.
pub async fn fixture(pool: PgPool, config: ImportDumpConfig) -> Fixture {
    SiteRepo::create(&pool, SITE).await.unwrap();
    SiteRepo::create(&pool, OTHER_SITE).await.unwrap();

    let accounts = SystemAccounts::ensure(&pool, &config).await.unwrap();
    let requester = actor(&pool, "Alice", &[Privilege::RequestImport]).await;
    let reviewer = actor(
        &pool,
        "Reviewer",
        &[
            Privilege::RequestImport,
            Privilege::HandleImportRequests,
            Privilege::HandleInterwiki,
            Privilege::ViewPrivateImportRequests,
        ],
    )
    .await;
    let stranger = actor(&pool, "Bob", &[Privilege::RequestImport]).await;

    let notifier = Arc::new(RecordingNotifier::default());
    let services = RequestServices::new(pool.clone(), config).with_notifier(notifier.clone());
    let service = RequestService::new(services.clone(), accounts.clone());

    Fixture {
        pool,
        services,
        service,
        notifier,
        accounts,
        requester,
        reviewer,
        stranger,
    }
}
