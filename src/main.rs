use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
mod middleware;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use http::HeaderValue;

mod config;
mod db;
mod domain;
mod error;
mod event_bus;
mod routes;
mod services;

use config::Config;
use services::init;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reminder_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting reminder engine");

    // Initialize database
    let pool = init::init_db(&config).await?;

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
    });

    // Spawn background workers (scheduler + notification worker), wired to
    // a shared shutdown broadcast so they drain in step with the server.
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let worker_handles = init::spawn_background_workers(app_state.clone(), shutdown_tx.clone());

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(routes::health::health_check))
        // Push subscription management
        .nest("/push-subscriptions", routes::push_subscriptions::router())
        // Task completion and worker ack
        .nest("/tasks", routes::tasks::router())
        // External scheduler binding
        .nest("/reminders", routes::reminders::router())
        // Add shared state
        .with_state(app_state.clone())
        // CSP middleware: set Content-Security-Policy headers
        .layer(axum::middleware::from_fn(middleware::csp::csp_middleware))
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(
                    config
                        .server
                        .frontend_url
                        .parse::<HeaderValue>()
                        .expect("Invalid FRONTEND_URL for CORS"),
                )
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::PUT,
                    http::Method::DELETE,
                    http::Method::OPTIONS,
                    http::Method::PATCH,
                ])
                .allow_headers([
                    http::header::CONTENT_TYPE,
                    http::header::AUTHORIZATION,
                    http::header::ACCEPT,
                ])
                .allow_credentials(true),
        );

    // Start server
    let host = config.server.host.clone();
    let port = config.server.port;
    let addr = format!("{}:{}", host, port);

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .await?;

    for handle in worker_handles {
        handle.abort();
    }

    Ok(())
}

async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, notifying background workers");
    let _ = shutdown_tx.send(());
}
