use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attend_core::clock::SystemClock;
use attend_db::store::PgStore;
use attend_presence::{MistPresenceClient, PresenceConfig};
use attend_scheduler::{DailyDeactivationScheduler, LessonScheduler, MonitorContext, SchedulerConfig};

mod config;

use config::{LogFormat, WorkerConfig};

/// Upper bound on waiting for the deactivation task after cancel.
const DEACTIVATION_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(LogFormat::from_env());

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    let scheduler_config = SchedulerConfig::from_env().context("Invalid scheduler configuration")?;
    let presence_config = PresenceConfig::from_env().context("Invalid presence configuration")?;
    tracing::info!(
        offset = %config.calendar.offset(),
        tick_secs = scheduler_config.tick_interval.as_secs(),
        poll_secs = scheduler_config.monitor.poll_interval.as_secs(),
        deactivation = config.deactivation_enabled,
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = attend_db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    attend_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    attend_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Adapters ---
    let store = Arc::new(PgStore::new(pool, config.calendar));
    let presence = Arc::new(
        MistPresenceClient::new(presence_config).context("Failed to build presence client")?,
    );
    let clock = Arc::new(SystemClock);

    // --- Lesson scheduler ---
    let ctx = MonitorContext {
        rooms: store.clone(),
        presence,
        devices: store.clone(),
        store: store.clone(),
        clock: clock.clone(),
        calendar: config.calendar,
    };
    let scheduler = Arc::new(LessonScheduler::new(store.clone(), ctx, scheduler_config));
    let scheduler_handle = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.run().await }
    });

    // --- Daily deactivation ---
    let deactivation_cancel = CancellationToken::new();
    let deactivation_handle = if config.deactivation_enabled {
        let deactivation =
            DailyDeactivationScheduler::new(store.clone(), store.clone(), clock, config.calendar);
        let cancel = deactivation_cancel.clone();
        Some(tokio::spawn(async move { deactivation.run(cancel).await }))
    } else {
        tracing::info!("Daily deactivation disabled");
        None
    };

    shutdown_signal().await;

    // Monitors close their open records before stop returns.
    scheduler.stop().await;
    if let Err(e) = scheduler_handle.await {
        tracing::error!(error = %e, "Lesson scheduler task failed");
    }

    deactivation_cancel.cancel();
    if let Some(handle) = deactivation_handle {
        let _ = tokio::time::timeout(DEACTIVATION_STOP_TIMEOUT, handle).await;
        tracing::info!("Daily deactivation stopped");
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "attend_worker=info,attend_scheduler=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
