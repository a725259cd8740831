use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, extract::DefaultBodyLimit, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::api::{self, AppState};
use super::db::{DbHandle, HelpdeskDb};
use super::ws;
use crate::config::HelpdeskToml;

/// Attachment uploads a single form post may carry at full size.
const MAX_FILES_PER_REQUEST: u64 = 8;

/// Configuration for the helpdesk server.
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("panichd.db"),
            dev_mode: false,
        }
    }
}

/// Build the full application router with the HTTP API and the event
/// stream.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state
        .config
        .settings
        .attachments_max_bytes()
        .saturating_mul(MAX_FILES_PER_REQUEST)
        .try_into()
        .unwrap_or(usize::MAX);

    api::api_router()
        .route("/ws", get(ws::ws_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the helpdesk server.
pub async fn start_server(server: ServerConfig, config: HelpdeskToml) -> Result<()> {
    // Ensure parent directory exists for DB
    if let Some(parent) = server.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    std::fs::create_dir_all(&config.settings.attachments_path)
        .context("Failed to create attachments directory")?;

    let db = HelpdeskDb::new(&server.db_path).context("Failed to initialize helpdesk database")?;
    for warning in config.validate() {
        warn!("config: {}", warning);
    }

    let state = Arc::new(AppState::new(DbHandle::new(db), config));
    let mut app = build_router(state);

    if server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if server.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!("PanicHD running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
