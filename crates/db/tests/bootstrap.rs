use sqlx::PgPool;

/// Connect, migrate, verify every table exists.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_full_bootstrap(pool: PgPool) {
    importdump_db::health_check(&pool).await.unwrap();

    let tables = [
        "users",
        "user_privileges",
        "sites",
        "site_user_groups",
        "interwiki",
        "import_requests",
        "import_request_comments",
        "request_log",
        "notifications",
        "jobs",
    ];

    for table in tables {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("{table} query failed: {e}"));
        assert_eq!(count.0, 0, "{table} should start empty");
    }
}

/// The status column rejects values outside the lifecycle.
#[sqlx::test(migrations = "../../db/migrations")]
async fn test_status_check_constraint(pool: PgPool) {
    let user_id: i64 = sqlx::query_scalar("INSERT INTO users (username) VALUES ('u') RETURNING id")
        .fetch_one(&pool)
        .await
        .unwrap();
    let result = sqlx::query(
        "INSERT INTO import_requests (target, reason, status, requester_id, created_at) \
         VALUES ('wikidb', 'r', 'archived', $1, NOW())",
    )
    .bind(user_id)
    .execute(&pool)
    .await;
    assert!(result.is_err());
}
