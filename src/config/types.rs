use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub archives: ArchiveConfig,

    #[serde(default)]
    pub notify: Vec<NotifyTarget>,

    #[serde(default)]
    pub cleanup: CleanupConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Storage engine tuning.
///
/// Passed explicitly at construction so independently configured
/// instances can coexist (per tenant, per test).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory for stored blobs. The on-disk layout below it is
    /// `{base_path}/{year}/{month:02}/{fileId}.{ext}` and is a fixed
    /// contract with already-stored assets.
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Files at or above this size are served via the chunk index.
    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold: u64,

    /// Fixed chunk window size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Time-to-live stamped on chunk rows at materialization.
    #[serde(default = "default_chunk_ttl_hours")]
    pub chunk_ttl_hours: u64,

    /// How many chunk rows go into one insert transaction.
    #[serde(default = "default_chunk_batch")]
    pub chunk_insert_batch: usize,
}

fn default_base_path() -> PathBuf {
    PathBuf::from("./data/assets")
}
fn default_large_file_threshold() -> u64 {
    25 * 1024 * 1024
}
fn default_chunk_size() -> u64 {
    255 * 1024
}
fn default_chunk_ttl_hours() -> u64 {
    24
}
fn default_chunk_batch() -> usize {
    16
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            large_file_threshold: default_large_file_threshold(),
            chunk_size: default_chunk_size(),
            chunk_ttl_hours: default_chunk_ttl_hours(),
            chunk_insert_batch: default_chunk_batch(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArchiveConfig {
    /// Directory for finished zip bundles.
    #[serde(default = "default_archive_dir")]
    pub dir: PathBuf,

    /// Default time-to-live for new archives when the request names none.
    #[serde(default = "default_archive_ttl_hours")]
    pub default_ttl_hours: u64,
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("./data/archives")
}
fn default_archive_ttl_hours() -> u64 {
    48
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: default_archive_dir(),
            default_ttl_hours: default_archive_ttl_hours(),
        }
    }
}

/// An opaque webhook target notified on store/delete/archive-completed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifyTarget {
    pub name: String,
    pub url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CleanupConfig {
    /// Seconds between expired-chunk and expired-archive sweeps.
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
}

fn default_cleanup_interval() -> u64 {
    15 * 60
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval(),
        }
    }
}
