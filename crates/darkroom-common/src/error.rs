//! Common error types used throughout darkroom.
//!
//! This module provides a unified error type covering the failure cases of
//! the storage/delivery engine: missing files and records, expired archives,
//! unsatisfiable byte ranges, and database or I/O failures.

/// Common error type for darkroom.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested file, chunk, or archive record was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The referenced archive exists but its expiry has passed.
    ///
    /// Distinct from [`Error::NotFound`] because caller remediation differs:
    /// request a fresh archive rather than double-checking the id.
    #[error("Expired: {0}")]
    Expired(String),

    /// The requested byte range starts past the end of the file.
    #[error("Range not satisfiable: requested start {start} for size {size}")]
    RangeNotSatisfiable { start: u64, size: u64 },

    /// The operation is not valid for the target (e.g. chunking an archive).
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input was provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new NotFound error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Expired error.
    pub fn expired<S: Into<String>>(msg: S) -> Self {
        Self::Expired(msg.into())
    }

    /// Create a new Unsupported error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a new Database error.
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new InvalidInput error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a new Io error from a message (for collaborator failures, etc).
    pub fn io<S: Into<String>>(msg: S) -> Self {
        Self::Io(std::io::Error::other(msg.into()))
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
