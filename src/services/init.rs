//! Initialization helpers: database connection + migrations, and the
//! scheduler/worker background loop spawn point. Trimmed from the
//! teacher's `services/init.rs`, which also spun up integration-sync
//! loops that have no counterpart here.

use std::{path::Path, sync::Arc};

use anyhow::Result;

use crate::config::Config;
use crate::services::{scheduler, worker};

/// Redact credentials from a database URL before logging it.
pub fn redact_db_url(db_url: &str) -> String {
    match db_url.find('@') {
        Some(at_pos) if db_url.find("://").map(|p| p < at_pos).unwrap_or(false) => {
            let scheme_end = db_url.find("://").unwrap() + 3;
            format!("{}(redacted){}", &db_url[..scheme_end], &db_url[at_pos..])
        }
        _ => db_url.to_string(),
    }
}

/// Initialize the SQLite connection pool and run migrations.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);

    if db_path != ":memory:" {
        let db_file_path = Path::new(db_path);
        if let Some(parent) = db_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    anyhow::anyhow!("Failed to create database directory {}: {}", parent.display(), e)
                })?;
            }
        }
    }

    let connect_options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .test_before_acquire(true)
        .connect_with(connect_options)
        .await?;

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Spawn the scheduler and worker loops. Each subscribes to its own
/// shutdown receiver off the shared broadcast sender, exactly as the
/// teacher's background workers do.
pub fn spawn_background_workers(
    state: Arc<crate::AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    vec![
        scheduler::spawn_scheduler_loop(state.clone(), shutdown.clone()),
        worker::spawn_worker_loop(state, shutdown),
    ]
}
