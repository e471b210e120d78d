//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates an in-memory DB, a temp-dir
//! backed storage config, and a full [`AppContext`]. The [`with_server`]
//! constructor starts Axum on a random port for HTTP-level testing.
//!
//! [`with_server`]: TestHarness::with_server

use std::net::SocketAddr;

use darkroom::config::Config;
use darkroom::server::{create_router, AppContext};
use darkroom_db::pool::{init_memory_pool, DbPool};
use tempfile::TempDir;

/// Test harness wrapping a fully-constructed [`AppContext`] backed by an
/// in-memory database and temp-dir blob storage.
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    _assets_dir: TempDir,
    _archives_dir: TempDir,
}

impl TestHarness {
    /// Create a new harness with default configuration, in-memory DB, and
    /// temp dirs for blobs and archives.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a new harness with a custom configuration. The storage and
    /// archive directories are always replaced with temp dirs.
    pub fn with_config(mut config: Config) -> Self {
        let assets_dir = TempDir::new().expect("failed to create assets dir");
        let archives_dir = TempDir::new().expect("failed to create archives dir");
        config.storage.base_path = assets_dir.path().to_path_buf();
        config.archives.dir = archives_dir.path().to_path_buf();

        let db = init_memory_pool().expect("failed to create in-memory pool");
        let ctx = AppContext::new(db.clone(), config);

        Self {
            ctx,
            db,
            _assets_dir: assets_dir,
            _archives_dir: archives_dir,
        }
    }

    /// Start an Axum server on a random port and return the harness
    /// together with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::with_server_config(Config::default()).await
    }

    /// Start an Axum server with custom config on a random port.
    pub async fn with_server_config(config: Config) -> (Self, SocketAddr) {
        let harness = Self::with_config(config);
        let app = create_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> darkroom_db::pool::PooledConnection {
        darkroom_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }
}
