//! HTTP surface of the storage engine.
//!
//! Routing, multipart parsing, and authentication live in front of this
//! server; the routes here expose the store/stat/stream/delete and archive
//! operations directly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method, StatusCode},
    Json, Router,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use darkroom_common::Error;
use darkroom_db::pool::DbPool;

use crate::archive::ArchiveService;
use crate::config::Config;
use crate::notifications::NotificationManager;
use crate::storage::StorageService;

pub mod routes_archives;
pub mod routes_files;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub storage: StorageService,
    pub archives: ArchiveService,
    pub notifier: Arc<NotificationManager>,
}

impl AppContext {
    /// Build a full context from a config and an initialized pool.
    pub fn new(db: DbPool, config: Config) -> Self {
        let notifier = Arc::new(NotificationManager::new(&config.notify));
        let storage = StorageService::new(db.clone(), config.storage.clone());
        let archives =
            ArchiveService::new(db.clone(), storage.clone(), config.archives.clone())
                .with_notifier(notifier.clone());

        Self {
            db,
            config: Arc::new(config),
            storage,
            archives,
            notifier,
        }
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::PUT, Method::POST, Method::DELETE])
        .allow_origin(Any)
        .allow_headers([header::CONTENT_TYPE, header::RANGE]);

    Router::new()
        .merge(routes_files::file_routes())
        .merge(routes_archives::archive_routes())
        // Uploads stream straight to disk, so the default 2 MB cap is
        // both unnecessary and far too small for camera originals.
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Map a core error onto the HTTP status the caller acts on.
///
/// Expired is deliberately distinct from NotFound: 410 tells the caller to
/// request a new archive, 404 to verify the id.
pub fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Expired(_) => StatusCode::GONE,
        Error::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
        Error::Unsupported(_) => StatusCode::CONFLICT,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::Database(_) | Error::Io(_) | Error::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// JSON error body in the shape the routes answer with.
pub fn error_response(err: &Error) -> (StatusCode, Json<serde_json::Value>) {
    (
        error_status(err),
        Json(serde_json::json!({ "error": err.to_string() })),
    )
}

/// Spawn the periodic sweep of expired chunks and archives.
pub fn start_cleanup_task(ctx: AppContext) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_secs(ctx.config.cleanup.interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;

            match ctx.storage.cleanup_expired_chunks() {
                Ok(n) if n > 0 => tracing::debug!("Cleanup removed {} chunks", n),
                Ok(_) => {}
                Err(e) => tracing::warn!("Chunk cleanup failed: {}", e),
            }

            match ctx.archives.cleanup_expired() {
                Ok(n) if n > 0 => tracing::debug!("Cleanup removed {} archives", n),
                Ok(_) => {}
                Err(e) => tracing::warn!("Archive cleanup failed: {}", e),
            }
        }
    })
}

/// Serve the router until ctrl-c.
pub async fn serve(ctx: AppContext) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", ctx.config.server.host, ctx.config.server.port)
        .parse()?;

    let cleanup = start_cleanup_task(ctx.clone());
    let app = create_router(ctx);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup.abort();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
