use std::sync::Arc;

use chrono::Utc;
use importdump_core::notification::{Notification, CATEGORY_STATUS_UPDATE};
use importdump_db::models::import_request::CreateImportRequest;
use importdump_db::models::user::CreateUser;
use importdump_db::repositories::{ImportRequestRepo, NotificationRepo, UserRepo};
use importdump_events::{DbNotifier, EventBus, Notifier};
use sqlx::PgPool;

async fn user(pool: &PgPool, name: &str) -> i64 {
    UserRepo::create(
        pool,
        &CreateUser {
            username: name.into(),
            email: Some(format!("{name}@example.org")),
        },
    )
    .await
    .unwrap()
    .id
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_one_row_and_event_per_receiver(pool: PgPool) {
    let alice = user(&pool, "alice").await;
    let bob = user(&pool, "bob").await;
    let reviewer = user(&pool, "reviewer").await;
    let req = ImportRequestRepo::create(
        &pool,
        &CreateImportRequest {
            source: String::new(),
            target: "wikidb".into(),
            reason: "t".into(),
            requester_id: alice,
            created_at: Utc::now(),
            private: false,
        },
    )
    .await
    .unwrap();

    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let notifier = DbNotifier::new(pool.clone(), Arc::clone(&bus));

    // The agent is skipped and duplicates collapse.
    let n = Notification::new(CATEGORY_STATUS_UPDATE, req.id, reviewer)
        .with_receivers([alice, bob, alice, reviewer])
        .with_extra("status", "declined");
    notifier.notify(&n).await.unwrap();

    let rows = NotificationRepo::list_for_request(&pool, req.id).await.unwrap();
    let receivers: Vec<i64> = rows.iter().map(|r| r.user_id).collect();
    assert_eq!(receivers, vec![alice, bob]);
    assert!(rows.iter().all(|r| r.agent_id == Some(reviewer)));

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.receiver_id, Some(alice));
    assert_eq!(second.receiver_id, Some(bob));
    assert_eq!(first.category(), Some(CATEGORY_STATUS_UPDATE));
}
