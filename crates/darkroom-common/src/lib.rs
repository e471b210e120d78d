//! Darkroom-Common: Shared types, constants, and utilities.
//!
//! This crate provides common functionality used across darkroom:
//!
//! - **Typed IDs**: Type-safe UUID wrappers for files, projects, and archives
//! - **Core Types**: Enums for asset kinds and archive filters
//! - **Error Handling**: The delivery-engine error taxonomy and result alias
//!
//! # Examples
//!
//! ```
//! use darkroom_common::{FileId, AssetKind, Error, Result};
//!
//! let file_id = FileId::new();
//! let kind = AssetKind::Original;
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("file"))
//! }
//! ```

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
