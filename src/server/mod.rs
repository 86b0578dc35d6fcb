//! HTTP + WebSocket surface.
//!
//! | Module | Responsibility                                                |
//! |--------|---------------------------------------------------------------|
//! | `api`  | REST handlers, `AppState`, `ApiError`, acting-user extractor  |
//! | `ws`   | One `BoardSession` per socket; drag gestures in, boards out   |

pub mod api;
pub mod ws;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::access::NavEntry;
use crate::access::nav::default_catalog;
use crate::board::TransitionEngine;
use crate::store::{BoardDb, SqliteStore};
use api::AppState;

/// Configuration for the board server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub feed_capacity: usize,
    pub dev_mode: bool,
    pub catalog: Vec<NavEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3142,
            db_path: PathBuf::from(".claimboard/claimboard.db"),
            feed_capacity: 256,
            dev_mode: false,
            catalog: default_catalog(),
        }
    }
}

/// Build the full application router with API and WebSocket routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the board server.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    // Ensure parent directory exists for DB
    if let Some(parent) = config.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let db = BoardDb::new(&config.db_path).context("Failed to initialize board database")?;
    let state = Arc::new(AppState {
        store: Arc::new(SqliteStore::new(db, config.feed_capacity)),
        engine: TransitionEngine::default(),
        catalog: config.catalog,
    });

    let mut app = build_router(state);

    let host = if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
        "0.0.0.0"
    } else {
        config.host.as_str()
    };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, db = %config.db_path.display(), "claimboard listening");
    println!("Claimboard running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
