//! Integration tests for request binding and atomic scopes.

mod common;

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Utc;
use common::{fixture, test_config, SITE};
use importdump_core::config::ImportDumpConfig;
use importdump_core::notification::CATEGORY_REQUEST_COMMENT;
use importdump_core::status::RequestStatus;
use importdump_db::repositories::{ImportRequestRepo, RequestCommentRepo, RequestLogRepo};
use importdump_requests::{
    InterwikiStore, ManagerError, ManagerResult, NewImportRequest, RequestManager,
};
use sqlx::PgPool;

async fn seeded(pool: PgPool) -> (common::Fixture, i64) {
    let fx = fixture(pool, test_config()).await;
    let id = fx
        .service
        .submit(
            &fx.requester,
            NewImportRequest {
                source: String::new(),
                target: SITE.to_string(),
                reason: "t".to_string(),
                private: false,
            },
        )
        .await
        .unwrap();
    (fx, id)
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_unknown_id_is_not_bound(pool: PgPool) {
    let fx = fixture(pool, test_config()).await;
    let mut manager = RequestManager::load(fx.services.clone(), 4_242).await.unwrap();

    assert!(!manager.exists().await.unwrap());
    assert_matches!(manager.request(), Err(ManagerError::NotBound(Some(4_242))));
    assert_matches!(manager.status(), Err(ManagerError::NotBound(_)));
    assert_matches!(manager.file_name(), Err(ManagerError::NotBound(_)));
    assert_matches!(
        manager.start_atomic("x").await,
        Err(ManagerError::NotBound(Some(4_242)))
    );
    assert!(!manager.in_atomic_scope());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_staged_file_is_found_under_staging_path(pool: PgPool) {
    let staging = tempfile::tempdir().unwrap();
    let config = ImportDumpConfig {
        staging_path: staging.path().to_path_buf(),
        ..test_config()
    };
    let fx = fixture(pool, config).await;
    let id = fx
        .service
        .submit(
            &fx.requester,
            NewImportRequest {
                source: String::new(),
                target: SITE.to_string(),
                reason: "staged".to_string(),
                private: false,
            },
        )
        .await
        .unwrap();
    let mut manager = RequestManager::load(fx.services.clone(), id).await.unwrap();

    assert!(!manager.file_exists().await.unwrap());
    assert_eq!(manager.file_size().await.unwrap(), None);

    let path = manager.file_path().unwrap();
    assert_eq!(path.parent(), Some(staging.path()));
    tokio::fs::write(&path, "<mediawiki/>").await.unwrap();

    assert!(manager.file_exists().await.unwrap());
    assert_eq!(manager.file_size().await.unwrap(), Some(12));
    assert!(manager.command().unwrap().contains(&*path.to_string_lossy()));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_accessors_reflect_stored_row(pool: PgPool) {
    let (fx, id) = seeded(pool).await;
    let mut manager = RequestManager::load(fx.services.clone(), id).await.unwrap();

    assert!(manager.exists().await.unwrap());
    assert_eq!(manager.target().unwrap(), SITE);
    assert_eq!(manager.status().unwrap(), RequestStatus::Pending);
    assert_eq!(manager.requester().unwrap(), fx.requester.actor_id());
    assert_eq!(manager.requester_user().await.unwrap().username, "Alice");
    assert_eq!(manager.interwiki_prefix().unwrap(), None);
    assert!(manager.file_name().unwrap().starts_with("wikidb-"));
    assert!(manager.file_name().unwrap().ends_with(".xml"));
    assert!(!manager.file_exists().await.unwrap());
    assert_eq!(manager.file_size().await.unwrap(), None);
    assert!(!manager.command().unwrap().contains("--username-prefix"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_setters_require_a_scope(pool: PgPool) {
    let (fx, id) = seeded(pool).await;
    let mut manager = RequestManager::load(fx.services.clone(), id).await.unwrap();

    assert_matches!(
        manager.set_status(RequestStatus::Declined),
        Err(ManagerError::Scope(_))
    );
    assert_matches!(manager.set_locked(true), Err(ManagerError::Scope(_)));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_nested_scopes_commit_at_the_outermost_end(pool: PgPool) {
    let (fx, id) = seeded(pool).await;
    let mut manager = RequestManager::load(fx.services.clone(), id).await.unwrap();

    manager.start_atomic("outer").await.unwrap();
    manager.start_atomic("inner").await.unwrap();
    manager.set_locked(true).unwrap();

    assert_matches!(manager.end_atomic("outer").await, Err(ManagerError::Scope(_)));
    manager.end_atomic("inner").await.unwrap();

    // Still uncommitted.
    let stored = ImportRequestRepo::find_by_id(&fx.pool, id).await.unwrap().unwrap();
    assert!(!stored.locked);

    manager.end_atomic("outer").await.unwrap();
    let stored = ImportRequestRepo::find_by_id(&fx.pool, id).await.unwrap().unwrap();
    assert!(stored.locked);
    assert!(!manager.in_atomic_scope());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_end_without_scope_is_an_error(pool: PgPool) {
    let (fx, id) = seeded(pool).await;
    let mut manager = RequestManager::load(fx.services.clone(), id).await.unwrap();
    assert_matches!(manager.end_atomic("x").await, Err(ManagerError::Scope(_)));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_cancel_discards_writes_and_notifications(pool: PgPool) {
    let (fx, id) = seeded(pool).await;
    fx.notifier.clear();
    let logged_before = RequestLogRepo::list_for_request(&fx.pool, id).await.unwrap().len();
    let mut manager = RequestManager::load(fx.services.clone(), id).await.unwrap();

    manager.start_atomic("work").await.unwrap();
    manager
        .record_status_change(
            RequestStatus::Declined,
            "no",
            fx.reviewer.actor_id(),
            fx.accounts.status_update.id,
            Utc::now(),
        )
        .await
        .unwrap();
    let notification = manager
        .notification(CATEGORY_REQUEST_COMMENT, fx.reviewer.actor_id())
        .unwrap()
        .with_receivers([fx.requester.actor_id()]);
    manager.send_notification(notification).await;
    assert_eq!(manager.status().unwrap(), RequestStatus::Declined);

    manager.cancel_atomic().await.unwrap();

    assert_eq!(manager.status().unwrap(), RequestStatus::Pending);
    assert!(RequestCommentRepo::list_for_request(&fx.pool, id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        RequestLogRepo::list_for_request(&fx.pool, id).await.unwrap().len(),
        logged_before
    );
    assert!(fx.notifier.sent().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_notifications_outside_a_scope_are_sent_at_once(pool: PgPool) {
    let (fx, id) = seeded(pool).await;
    fx.notifier.clear();
    let mut manager = RequestManager::load(fx.services.clone(), id).await.unwrap();

    let notification = manager
        .notification(CATEGORY_REQUEST_COMMENT, fx.reviewer.actor_id())
        .unwrap()
        .with_receivers([fx.requester.actor_id()]);
    manager.send_notification(notification).await;

    let sent = fx.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].extra["request-url"]
        .as_str()
        .unwrap()
        .ends_with(&format!("/{id}")));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_rebinding_inside_a_scope_is_refused(pool: PgPool) {
    let (fx, id) = seeded(pool).await;
    let mut manager = RequestManager::load(fx.services.clone(), id).await.unwrap();
    manager.start_atomic("work").await.unwrap();

    assert_matches!(manager.load_from_id(id).await, Err(ManagerError::Scope(_)));
    manager.cancel_atomic().await.unwrap();
    assert!(manager.load_from_id(id).await.is_ok());
}

/// Interwiki table that records inserts and can refuse them.
#[derive(Default)]
struct RecordingInterwiki {
    inserted: Mutex<Vec<String>>,
    reject: bool,
}

#[async_trait]
impl InterwikiStore for RecordingInterwiki {
    async fn lookup(&self, _site: &str, _prefix: &str) -> ManagerResult<Option<String>> {
        Ok(None)
    }

    async fn insert(&self, _site: &str, prefix: &str, _url: &str) -> ManagerResult<bool> {
        if self.reject {
            return Ok(false);
        }
        self.inserted.lock().unwrap().push(prefix.to_string());
        Ok(true)
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_interwiki_race_loser_writes_no_mapping(pool: PgPool) {
    let (fx, id) = seeded(pool).await;
    let store = Arc::new(RecordingInterwiki::default());
    let services = fx.services.clone().with_interwiki_store(store.clone());
    let mut manager = RequestManager::load(services, id).await.unwrap();

    // Another reviewer assigns a prefix after this manager read the row.
    assert!(ImportRequestRepo::set_interwiki_prefix(&fx.pool, id, "first")
        .await
        .unwrap());

    let assigned = manager
        .insert_interwiki_prefix("second", "https://second.example.org", fx.reviewer.actor_id())
        .await
        .unwrap();
    assert!(!assigned);
    assert!(store.inserted.lock().unwrap().is_empty());
    let row = ImportRequestRepo::find_by_id(&fx.pool, id).await.unwrap().unwrap();
    assert_eq!(row.interwiki_prefix.as_deref(), Some("first"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_rejected_interwiki_insert_releases_prefix(pool: PgPool) {
    let (fx, id) = seeded(pool).await;
    let store = Arc::new(RecordingInterwiki {
        reject: true,
        ..RecordingInterwiki::default()
    });
    let services = fx.services.clone().with_interwiki_store(store);
    let mut manager = RequestManager::load(services, id).await.unwrap();

    let assigned = manager
        .insert_interwiki_prefix("oldwiki", "https://old.example.org", fx.reviewer.actor_id())
        .await
        .unwrap();
    assert!(!assigned);
    assert_eq!(manager.interwiki_prefix().unwrap(), None);
    let row = ImportRequestRepo::find_by_id(&fx.pool, id).await.unwrap().unwrap();
    assert_eq!(row.interwiki_prefix, None);
    let actions: Vec<String> = RequestLogRepo::list_for_request(&fx.pool, id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, vec!["request"]);
}
