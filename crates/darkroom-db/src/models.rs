//! Internal Rust models matching the database schema.
//!
//! Strongly-typed structures mapping to the `files`, `chunks`, and
//! `archives` tables. All models use types from darkroom-common where
//! appropriate.

use chrono::{DateTime, Utc};
use darkroom_common::{ArchiveFilter, ArchiveId, AssetKind, FileId, ProjectId};
use serde::{Deserialize, Serialize};

/// Stored file catalog entry.
///
/// The row is created by the upload layer before bytes hit disk; the
/// storage service fills in `storage_path` via the path allocator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredFile {
    pub id: FileId,
    pub project_id: ProjectId,
    pub original_name: String,
    pub kind: AssetKind,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
}

/// A single persisted chunk of a large file.
///
/// Chunks are a derived, rebuildable cache of the on-disk bytes, unique
/// per (file_id, chunk_idx), and expire independently of the file.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub file_id: FileId,
    pub chunk_idx: u32,
    pub payload: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

/// Archive build status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveStatus {
    Pending,
    Completed,
    Failed,
}

impl std::fmt::Display for ArchiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ArchiveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid archive status: {}", s)),
        }
    }
}

/// Bulk download archive record.
///
/// Expiry is a read-time condition, not a status transition: a completed
/// archive past `expires_at` must be refused distinctly from not-found.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Archive {
    pub id: ArchiveId,
    pub project_id: ProjectId,
    pub filter: ArchiveFilter,
    pub status: ArchiveStatus,
    pub size_bytes: Option<i64>,
    pub storage_path: Option<String>,
    pub error_message: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Archive {
    /// Whether the archive's expiry has passed at the given instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
