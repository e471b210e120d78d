//! Darkroom-DB: Metadata schema, migrations, and query operations.
//!
//! This crate provides the durable out-of-band metadata store for darkroom
//! using SQLite with rusqlite and r2d2 connection pooling. It holds the
//! stored-file catalog, the chunk index for large files, and archive
//! lifecycle records.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `models` - Rust models matching the database schema
//! - `queries` - Database query operations
//!
//! # Example
//!
//! ```no_run
//! use darkroom_db::pool::{init_pool, get_conn};
//! use darkroom_db::queries::chunks;
//! use darkroom_common::FileId;
//!
//! let pool = init_pool("/var/lib/darkroom/db.sqlite").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let count = chunks::count_for_file(&conn, FileId::new()).unwrap();
//! println!("chunks: {}", count);
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
