use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use importdump_core::config::ImportDumpConfig;
use importdump_events::{DbNotifier, EmailConfig, EmailDelivery, EmailRelay, EventBus};
use importdump_requests::{RequestServices, SystemAccounts};
use importdump_worker::{CommandImporter, ImportJob, JobRunner, NotifyJob};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "importdump_worker=debug,importdump_requests=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ImportDumpConfig::from_env().expect("Invalid ImportDump configuration");
    tracing::info!(
        automated = config.automation_enabled,
        staging_path = %config.staging_path.display(),
        "Loaded configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = importdump_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    importdump_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    importdump_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let accounts = SystemAccounts::ensure(&pool, &config)
        .await
        .expect("Failed to resolve system accounts");

    // --- Notifications ---
    let event_bus = Arc::new(EventBus::default());
    let relay_handle = EmailConfig::from_env().map(|email| {
        tracing::info!(host = %email.smtp_host, "Email delivery enabled");
        let relay = EmailRelay::new(pool.clone(), EmailDelivery::new(email));
        tokio::spawn(relay.run(event_bus.subscribe()))
    });
    let notifier = Arc::new(DbNotifier::new(pool.clone(), Arc::clone(&event_bus)));

    // --- Jobs ---
    let importer = Arc::new(CommandImporter::new(&config));
    let services = RequestServices::new(pool.clone(), config.clone()).with_notifier(notifier);
    let notify_job = Arc::new(NotifyJob::new(services.clone(), accounts));
    let runner = JobRunner::new(pool, &config)
        .with_handler(Arc::new(ImportJob::new(services, importer, Arc::clone(&notify_job))))
        .with_handler(notify_job);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    runner.run(cancel).await;

    // Dropping the last bus handles closes the channel and stops the relay.
    drop(runner);
    drop(event_bus);
    if let Some(handle) = relay_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    tracing::info!("Worker stopped");
}

/// Wait for Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
