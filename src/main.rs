//! Chorus server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use chorus::adapters::http::{build_router, AppState};
use chorus::adapters::sqlite::{
    initialize_database, SqliteCommitRepository, SqliteIdempotencyRepository,
    SqliteLockRepository, SqliteProjectRepository, SqliteTaskRepository,
    SqliteWorkLogRepository,
};
use chorus::config::Config;
use chorus::services::{
    AtomicService, DiscoveryService, LockService, ProjectService, Reaper, TaskService,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chorus=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load configuration")?;

    let pool = initialize_database(&config.database_url)
        .await
        .context("Failed to initialize database")?;

    let projects = Arc::new(SqliteProjectRepository::new(pool.clone()));
    let tasks = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let locks = Arc::new(SqliteLockRepository::new(pool.clone()));
    let work_log = Arc::new(SqliteWorkLogRepository::new(pool.clone()));
    let commits = Arc::new(SqliteCommitRepository::new(pool.clone()));
    let idempotency = Arc::new(SqliteIdempotencyRepository::new(pool));

    let task_service = TaskService::new(
        tasks.clone(),
        locks.clone(),
        projects.clone(),
        work_log.clone(),
        commits.clone(),
    );
    let state = AppState {
        projects: ProjectService::new(
            projects.clone(),
            tasks.clone(),
            locks.clone(),
            work_log.clone(),
            commits.clone(),
        ),
        locks: LockService::new(task_service.clone(), locks.clone()),
        atomic: AtomicService::new(
            task_service.clone(),
            tasks.clone(),
            work_log,
            commits,
            idempotency.clone(),
        ),
        discovery: DiscoveryService::new(tasks, locks.clone(), projects),
        tasks: task_service,
    };

    let reaper = Reaper::new(locks, idempotency).spawn();

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid host/port")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Chorus listening on {addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    reaper.abort();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Failed to listen for shutdown signal");
    }
}
