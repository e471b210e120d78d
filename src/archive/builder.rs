//! Archive build orchestration.
//!
//! An archive is created pending, built by a spawned task that streams each
//! member file sequentially through a bounded copy buffer into a zip
//! writer, and marked completed or failed. Expiry is enforced at read time,
//! independent of when physical cleanup runs. Archives are never chunked:
//! they are typically downloaded once, shortly after creation.

use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use darkroom_common::{ArchiveFilter, ArchiveId, Error, ProjectId, Result};
use darkroom_db::models::{Archive, ArchiveStatus, StoredFile};
use darkroom_db::pool::{get_conn, DbPool};
use darkroom_db::queries::{archives, files};

use crate::config::ArchiveConfig;
use crate::notifications::NotificationManager;
use crate::storage::StorageService;

/// Service owning the archive lifecycle: create, build, status, download,
/// and expiry sweep.
#[derive(Clone)]
pub struct ArchiveService {
    db: DbPool,
    storage: StorageService,
    config: ArchiveConfig,
    notifier: Option<std::sync::Arc<NotificationManager>>,
}

impl ArchiveService {
    pub fn new(db: DbPool, storage: StorageService, config: ArchiveConfig) -> Self {
        Self {
            db,
            storage,
            config,
            notifier: None,
        }
    }

    /// Attach a notification manager for archive-completed events.
    pub fn with_notifier(mut self, notifier: std::sync::Arc<NotificationManager>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Absolute path of an archive blob.
    fn blob_path(&self, relative: &str) -> PathBuf {
        self.config.dir.join(relative)
    }

    /// Create a pending archive and spawn its build task.
    ///
    /// Fire-and-forget relative to the caller: the returned record is
    /// pending and the caller polls status separately. The build runs to
    /// completion or failure once started.
    pub fn create_archive(
        &self,
        project_id: ProjectId,
        filter: ArchiveFilter,
        ttl_hours: Option<u64>,
    ) -> Result<Archive> {
        let id = ArchiveId::new();
        let ttl = ttl_hours.unwrap_or(self.config.default_ttl_hours);
        let expires_at = Utc::now() + Duration::hours(ttl as i64);

        let conn = get_conn(&self.db)?;
        let archive = archives::create_archive(&conn, id, project_id, filter, expires_at)?;
        drop(conn);

        let svc = self.clone();
        let record = archive.clone();
        tokio::spawn(async move {
            svc.build_archive(record).await;
        });

        Ok(archive)
    }

    /// Build an archive to completion or failure, updating its record.
    pub async fn build_archive(&self, archive: Archive) {
        let relative = format!("{}.zip", archive.id);
        let output = self.blob_path(&relative);

        let db = self.db.clone();
        let storage = self.storage.clone();
        let record = archive.clone();
        let output_for_build = output.clone();

        let built = tokio::task::spawn_blocking(move || {
            build_zip(&db, &storage, &record, &output_for_build)
        })
        .await;

        let result = match built {
            Ok(result) => result,
            Err(e) => Err(Error::internal(format!("archive build task panicked: {}", e))),
        };

        match result {
            Ok(size_bytes) => {
                tracing::info!(
                    "Archive {} completed: {} bytes at {}",
                    archive.id,
                    size_bytes,
                    relative
                );
                if let Err(e) = self.record_completed(archive.id, &relative, size_bytes) {
                    tracing::warn!("Failed to record completion of archive {}: {}", archive.id, e);
                }
                if let Some(notifier) = &self.notifier {
                    notifier
                        .notify(
                            "archive.completed",
                            serde_json::json!({
                                "archiveId": archive.id,
                                "projectId": archive.project_id,
                                "sizeBytes": size_bytes,
                            }),
                        )
                        .await;
                }
            }
            Err(e) => {
                tracing::warn!("Archive {} failed: {}", archive.id, e);
                // Discard partial output; a missing file is already fine.
                if let Err(rm) = fs::remove_file(&output) {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("Failed to remove partial archive {}: {}", archive.id, rm);
                    }
                }
                if let Err(db_err) = self.record_failed(archive.id, &e.to_string()) {
                    tracing::warn!("Failed to record failure of archive {}: {}", archive.id, db_err);
                }
            }
        }
    }

    fn record_completed(&self, id: ArchiveId, relative: &str, size_bytes: i64) -> Result<()> {
        let conn = get_conn(&self.db)?;
        archives::mark_completed(&conn, id, relative, size_bytes)
    }

    fn record_failed(&self, id: ArchiveId, message: &str) -> Result<()> {
        let conn = get_conn(&self.db)?;
        archives::mark_failed(&conn, id, message)
    }

    /// Get an archive's current record.
    pub fn status(&self, id: ArchiveId) -> Result<Archive> {
        let conn = get_conn(&self.db)?;
        archives::get_archive(&conn, id)
    }

    /// Open a completed, unexpired archive for download.
    ///
    /// Expiry is checked before anything else: a stale archive is refused
    /// as Expired even when its blob still exists on disk, and distinctly
    /// from NotFound.
    pub async fn open_download(&self, id: ArchiveId) -> Result<(Archive, ReaderStream<File>)> {
        let archive = self.status(id)?;

        if archive.is_expired_at(Utc::now()) {
            return Err(Error::expired(format!("archive {}", id)));
        }

        match archive.status {
            ArchiveStatus::Completed => {}
            ArchiveStatus::Pending => {
                return Err(Error::unsupported(format!("archive {} is still building", id)));
            }
            ArchiveStatus::Failed => {
                return Err(Error::unsupported(format!("archive {} failed to build", id)));
            }
        }

        let relative = archive
            .storage_path
            .clone()
            .ok_or_else(|| Error::internal(format!("completed archive {} has no path", id)))?;

        let file = File::open(self.blob_path(&relative)).await?;
        Ok((archive, ReaderStream::new(file)))
    }

    /// Remove expired archives: blobs first (fail-soft), then rows.
    /// Returns the number of rows removed.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let conn = get_conn(&self.db)?;
        let expired = archives::list_expired(&conn, Utc::now())?;
        let mut removed = 0;

        for archive in expired {
            if let Some(relative) = &archive.storage_path {
                if let Err(e) = fs::remove_file(self.blob_path(relative)) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("Failed to remove archive blob {}: {}", relative, e);
                    }
                }
            }
            if archives::delete_archive(&conn, archive.id)? {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("Removed {} expired archives", removed);
        }
        Ok(removed)
    }
}

/// Stream every matching member file into a zip at `output`, one file and
/// one copy buffer at a time. Returns the final zip size in bytes.
fn build_zip(
    db: &DbPool,
    storage: &StorageService,
    archive: &Archive,
    output: &Path,
) -> Result<i64> {
    let members = {
        let conn = get_conn(db)?;
        files::list_project_files(&conn, archive.project_id, archive.filter)?
    };

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    let out = fs::File::create(output)?;
    let mut zip = ZipWriter::new(BufWriter::new(out));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    let mut used_names: HashSet<String> = HashSet::new();
    for member in &members {
        let entry_name = unique_entry_name(member, &mut used_names);
        zip.start_file(&entry_name, options)
            .map_err(|e| Error::io(format!("zip entry {}: {}", entry_name, e)))?;

        let mut src = fs::File::open(storage.absolute_path(&member.storage_path))?;
        // io::copy keeps a single fixed buffer resident per member file
        std::io::copy(&mut src, &mut zip)?;
    }

    let mut inner = zip
        .finish()
        .map_err(|e| Error::io(format!("zip finalize: {}", e)))?;
    inner.flush()?;
    drop(inner);

    let size = fs::metadata(output)?.len() as i64;
    Ok(size)
}

/// Zip entry name for a member, de-duplicated against earlier entries.
fn unique_entry_name(member: &StoredFile, used: &mut HashSet<String>) -> String {
    if used.insert(member.original_name.clone()) {
        return member.original_name.clone();
    }
    let name = format!("{}_{}", member.id, member.original_name);
    used.insert(name.clone());
    name
}
