//! Core storage orchestration.
//!
//! Writes blobs under the allocated `{year}/{month:02}/{id}.{ext}` layout,
//! lazily materializes large files into the chunk index, and serves both
//! plain and chunk-reconstructed byte streams. Every operation holds at
//! most one I/O-buffer-sized window resident regardless of file size.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{Duration, Utc};
use futures::Stream;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use darkroom_common::{ByteRange, Error, FileId, Result};
use darkroom_db::pool::{get_conn, DbPool};
use darkroom_db::queries::chunks;

use crate::config::StorageConfig;
use crate::storage::allocator;

/// Size and existence of an on-disk blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    pub size: u64,
    pub exists: bool,
}

/// Storage service orchestrating disk blobs and the chunk index.
#[derive(Clone)]
pub struct StorageService {
    db: DbPool,
    config: StorageConfig,
}

impl StorageService {
    /// Create a new storage service over a metadata pool and explicit config.
    pub fn new(db: DbPool, config: StorageConfig) -> Self {
        Self { db, config }
    }

    /// Root directory for stored blobs.
    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    /// Absolute filesystem path for a relative storage path.
    pub fn absolute_path(&self, relative_path: &str) -> PathBuf {
        self.config.base_path.join(relative_path)
    }

    /// Write a file's bytes to its allocated path and return that path.
    ///
    /// Idempotent: re-storing the same file overwrites in place.
    pub async fn store_file(
        &self,
        file_id: FileId,
        bytes: &[u8],
        original_name: &str,
    ) -> Result<String> {
        let mut reader = bytes;
        let (relative_path, _) = self
            .store_file_from_reader(file_id, &mut reader, original_name)
            .await?;
        Ok(relative_path)
    }

    /// Stream a file's bytes to its allocated path, holding one copy
    /// buffer resident regardless of total size. Returns the path and
    /// the number of bytes written.
    ///
    /// Idempotent: re-storing the same file overwrites in place and
    /// discards chunk rows materialized from the previous bytes, so the
    /// chunk index can never serve a superseded version.
    pub async fn store_file_from_reader<R>(
        &self,
        file_id: FileId,
        reader: &mut R,
        original_name: &str,
    ) -> Result<(String, u64)>
    where
        R: tokio::io::AsyncRead + Unpin + ?Sized,
    {
        let relative_path = allocator::allocate(file_id, original_name);
        let absolute = self.absolute_path(&relative_path);

        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = File::create(&absolute).await?;
        let written = tokio::io::copy(reader, &mut file).await?;

        self.delete_chunks(file_id)?;

        tracing::debug!(
            "Stored {} bytes for file {} at {}",
            written,
            file_id,
            relative_path
        );

        Ok((relative_path, written))
    }

    /// Size and existence of a stored blob.
    ///
    /// Never fails: any I/O error, including not-found, reports
    /// `{size: 0, exists: false}`.
    pub async fn file_stats(&self, relative_path: &str) -> FileStats {
        match tokio::fs::metadata(self.absolute_path(relative_path)).await {
            Ok(meta) => FileStats {
                size: meta.len(),
                exists: true,
            },
            Err(_) => FileStats {
                size: 0,
                exists: false,
            },
        }
    }

    /// Whether a file of the given size is served via the chunk index.
    /// The threshold boundary is inclusive.
    pub fn should_use_chunking(&self, size: u64) -> bool {
        size >= self.config.large_file_threshold
    }

    /// Materialize the chunk rows for a large file.
    ///
    /// No-op below the chunking threshold and when a complete row set
    /// already exists. A partial set left behind by an interrupted
    /// materialization is discarded and rebuilt from the blob; a failure
    /// mid-build likewise discards whatever batches already committed, so
    /// the index is always either complete or empty. Reads the blob once
    /// in fixed windows, inserting rows in bounded batches stamped with
    /// the configured TTL. Returns the chunk count.
    pub async fn create_chunks_for_file(
        &self,
        file_id: FileId,
        relative_path: &str,
    ) -> Result<u32> {
        let stats = self.file_stats(relative_path).await;
        if !stats.exists {
            return Err(Error::not_found(format!(
                "file {} at {}",
                file_id, relative_path
            )));
        }
        if !self.should_use_chunking(stats.size) {
            return Ok(0);
        }

        let expected = stats.size.div_ceil(self.config.chunk_size) as u32;

        {
            let conn = get_conn(&self.db)?;
            let existing = chunks::count_for_file(&conn, file_id)?;
            if existing == expected {
                return Ok(existing);
            }
            if existing > 0 {
                chunks::delete_for_file(&conn, file_id)?;
            }
        }

        let expires_at = Utc::now() + Duration::hours(self.config.chunk_ttl_hours as i64);

        match self
            .materialize_windows(file_id, relative_path, expected, expires_at)
            .await
        {
            Ok(Some(count)) => {
                tracing::info!(
                    "Materialized {} chunks for file {} ({} bytes)",
                    count,
                    file_id,
                    stats.size
                );
                Ok(count)
            }
            // Lost the race; the winner's rows stand.
            Ok(None) => self.chunk_count(file_id),
            Err(e) => {
                // Committed batches must not outlive the failed build.
                if let Err(cleanup) = self.delete_chunks(file_id) {
                    tracing::warn!(
                        "Failed to discard partial chunks for file {}: {}",
                        file_id,
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }

    /// Read the blob in fixed windows and insert the chunk rows. `None`
    /// means a concurrent materialization won the race.
    async fn materialize_windows(
        &self,
        file_id: FileId,
        relative_path: &str,
        expected: u32,
        expires_at: chrono::DateTime<Utc>,
    ) -> Result<Option<u32>> {
        let chunk_size = self.config.chunk_size;
        let mut file = File::open(self.absolute_path(relative_path)).await?;
        let mut next_idx: u32 = 0;
        let mut batch: Vec<Vec<u8>> = Vec::with_capacity(self.config.chunk_insert_batch);

        loop {
            let mut window = vec![0u8; chunk_size as usize];
            let mut filled = 0;
            while filled < window.len() {
                let n = file.read(&mut window[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            window.truncate(filled);
            batch.push(window);

            if batch.len() == self.config.chunk_insert_batch {
                if !self.flush_chunk_batch(file_id, &mut next_idx, &mut batch, expires_at)? {
                    return Ok(None);
                }
            }
        }

        if !batch.is_empty()
            && !self.flush_chunk_batch(file_id, &mut next_idx, &mut batch, expires_at)?
        {
            return Ok(None);
        }

        if next_idx != expected {
            return Err(Error::internal(format!(
                "chunk count mismatch for file {}: wrote {}, expected {}",
                file_id, next_idx, expected
            )));
        }

        Ok(Some(next_idx))
    }

    /// Insert the pending batch; `false` means a concurrent materialization
    /// won the race and ours should stand down.
    fn flush_chunk_batch(
        &self,
        file_id: FileId,
        next_idx: &mut u32,
        batch: &mut Vec<Vec<u8>>,
        expires_at: chrono::DateTime<Utc>,
    ) -> Result<bool> {
        let conn = get_conn(&self.db)?;
        let inserted = chunks::insert_batch(&conn, file_id, *next_idx, batch, expires_at)?;
        if inserted {
            *next_idx += batch.len() as u32;
            batch.clear();
        } else {
            tracing::debug!("Lost chunk materialization race for file {}", file_id);
        }
        Ok(inserted)
    }

    fn chunk_count(&self, file_id: FileId) -> Result<u32> {
        let conn = get_conn(&self.db)?;
        chunks::count_for_file(&conn, file_id)
    }

    /// Point lookup of a single chunk's payload.
    pub fn get_chunk(&self, file_id: FileId, chunk_idx: u32) -> Result<Vec<u8>> {
        let conn = get_conn(&self.db)?;
        chunks::get_chunk(&conn, file_id, chunk_idx)?.ok_or_else(|| {
            Error::not_found(format!("chunk {} of file {}", chunk_idx, file_id))
        })
    }

    /// Delete chunk rows whose expiry has passed. Returns the removed count.
    pub fn cleanup_expired_chunks(&self) -> Result<usize> {
        let conn = get_conn(&self.db)?;
        let removed = chunks::delete_expired(&conn, Utc::now())?;
        if removed > 0 {
            tracing::info!("Removed {} expired chunks", removed);
        }
        Ok(removed)
    }

    /// Open a lazy byte stream over a stored blob, optionally bounded by an
    /// inclusive byte range.
    pub async fn create_read_stream(
        &self,
        relative_path: &str,
        range: Option<ByteRange>,
    ) -> Result<ReaderStream<tokio::io::Take<File>>> {
        let mut file = File::open(self.absolute_path(relative_path)).await?;

        let take = match range {
            Some(range) => {
                file.seek(SeekFrom::Start(range.start)).await?;
                file.take(range.len())
            }
            None => file.take(u64::MAX),
        };

        Ok(ReaderStream::new(take))
    }

    /// Reconstruct a logical byte range from persisted chunk rows.
    ///
    /// Yields one bounded window at a time, slicing boundary chunks to the
    /// requested range. Byte-identical to [`create_read_stream`] over the
    /// same logical range.
    ///
    /// [`create_read_stream`]: StorageService::create_read_stream
    pub fn create_chunked_read_stream(
        &self,
        file_id: FileId,
        range: ByteRange,
    ) -> impl Stream<Item = Result<Bytes>> {
        let db = self.db.clone();
        let chunk_size = self.config.chunk_size;

        futures::stream::try_unfold(range.start, move |pos| {
            let db = db.clone();
            async move {
                if pos > range.end {
                    return Ok(None);
                }

                let chunk_idx = (pos / chunk_size) as u32;
                let conn = get_conn(&db)?;
                let payload = chunks::get_chunk(&conn, file_id, chunk_idx)?.ok_or_else(|| {
                    Error::not_found(format!("chunk {} of file {}", chunk_idx, file_id))
                })?;

                let offset = (pos % chunk_size) as usize;
                if offset >= payload.len() {
                    return Err(Error::internal(format!(
                        "chunk {} of file {} shorter than requested offset",
                        chunk_idx, file_id
                    )));
                }

                let remaining = range.end - pos + 1;
                let available = payload.len() - offset;
                let take = (available as u64).min(remaining) as usize;

                let slice = Bytes::copy_from_slice(&payload[offset..offset + take]);
                Ok(Some((slice, pos + take as u64)))
            }
        })
    }

    /// Remove a stored blob. Best-effort: a missing target is success.
    pub async fn delete_file(&self, relative_path: &str) -> Result<()> {
        match tokio::fs::remove_file(self.absolute_path(relative_path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove all chunk rows for a file. Best-effort: zero rows is success.
    pub fn delete_chunks(&self, file_id: FileId) -> Result<()> {
        let conn = get_conn(&self.db)?;
        chunks::delete_for_file(&conn, file_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use darkroom_db::pool::init_memory_pool;
    use futures::StreamExt;

    fn test_service(threshold: u64, chunk_size: u64) -> (StorageService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            base_path: dir.path().to_path_buf(),
            large_file_threshold: threshold,
            chunk_size,
            chunk_ttl_hours: 24,
            chunk_insert_batch: 4,
        };
        let db = init_memory_pool().unwrap();
        (StorageService::new(db, config), dir)
    }

    async fn collect_reader<S, B, E>(mut stream: S) -> Vec<u8>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: std::fmt::Debug,
    {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.extend_from_slice(item.unwrap().as_ref());
        }
        out
    }

    #[tokio::test]
    async fn test_store_then_read_roundtrip() {
        let (svc, _dir) = test_service(1024 * 1024, 256);
        let file_id = FileId::new();
        let bytes: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();

        let path = svc.store_file(file_id, &bytes, "roundtrip.dng").await.unwrap();
        assert!(path.ends_with(&format!("{}.dng", file_id)));

        let stream = svc.create_read_stream(&path, None).await.unwrap();
        assert_eq!(collect_reader(stream).await, bytes);
    }

    #[tokio::test]
    async fn test_store_is_overwrite_safe() {
        let (svc, _dir) = test_service(1024, 256);
        let file_id = FileId::new();

        let path1 = svc.store_file(file_id, b"first", "a.jpg").await.unwrap();
        let path2 = svc.store_file(file_id, b"second", "a.jpg").await.unwrap();
        assert_eq!(path1, path2);

        let stream = svc.create_read_stream(&path2, None).await.unwrap();
        assert_eq!(collect_reader(stream).await, b"second");
    }

    #[tokio::test]
    async fn test_file_stats_missing_never_fails() {
        let (svc, _dir) = test_service(1024, 256);
        let stats = svc.file_stats("2026/01/nope.bin").await;
        assert_eq!(stats, FileStats { size: 0, exists: false });
    }

    #[tokio::test]
    async fn test_file_stats_existing() {
        let (svc, _dir) = test_service(1024, 256);
        let file_id = FileId::new();
        let path = svc.store_file(file_id, &[7u8; 321], "x.tif").await.unwrap();

        let stats = svc.file_stats(&path).await;
        assert_eq!(stats, FileStats { size: 321, exists: true });
    }

    #[test]
    fn test_chunking_threshold_inclusive() {
        let (svc, _dir) = test_service(100, 10);
        assert!(!svc.should_use_chunking(99));
        assert!(svc.should_use_chunking(100));
        assert!(svc.should_use_chunking(101));
    }

    #[tokio::test]
    async fn test_materialize_chunks_and_reassemble() {
        let (svc, _dir) = test_service(100, 33);
        let file_id = FileId::new();
        let bytes: Vec<u8> = (0..200u32).map(|i| (i % 256) as u8).collect();
        let path = svc.store_file(file_id, &bytes, "big.cr3").await.unwrap();

        let count = svc.create_chunks_for_file(file_id, &path).await.unwrap();
        assert_eq!(count, 200u32.div_ceil(33));

        // Concatenating all chunks reproduces the original bytes; the last
        // chunk carries the remainder.
        let mut reassembled = Vec::new();
        for idx in 0..count {
            reassembled.extend(svc.get_chunk(file_id, idx).unwrap());
        }
        assert_eq!(reassembled, bytes);
        assert_eq!(
            svc.get_chunk(file_id, count - 1).unwrap().len() as u64,
            200 % 33
        );
    }

    #[tokio::test]
    async fn test_materialize_below_threshold_is_noop() {
        let (svc, _dir) = test_service(1000, 100);
        let file_id = FileId::new();
        let path = svc.store_file(file_id, &[1u8; 500], "small.jpg").await.unwrap();

        assert_eq!(svc.create_chunks_for_file(file_id, &path).await.unwrap(), 0);
        assert!(svc.get_chunk(file_id, 0).is_err());
    }

    #[tokio::test]
    async fn test_materialize_twice_is_idempotent() {
        let (svc, dir) = test_service(100, 40);
        let file_id = FileId::new();
        let path = svc.store_file(file_id, &[9u8; 120], "big.dng").await.unwrap();

        let first = svc.create_chunks_for_file(file_id, &path).await.unwrap();
        assert_eq!(first, 3);

        // Remove the blob: the second call must not re-read the source.
        tokio::fs::remove_file(dir.path().join(&path)).await.unwrap();
        let err = svc.create_chunks_for_file(file_id, &path).await;
        assert!(err.is_err());

        // Restore and verify the count is simply re-reported.
        svc.store_file(file_id, &[9u8; 120], "big.dng").await.unwrap();
        let second = svc.create_chunks_for_file(file_id, &path).await.unwrap();
        assert_eq!(second, 3);
        assert_eq!(svc.get_chunk(file_id, 0).unwrap(), vec![9u8; 40]);
    }

    #[tokio::test]
    async fn test_restore_invalidates_chunk_rows() {
        let (svc, _dir) = test_service(100, 40);
        let file_id = FileId::new();

        let path = svc.store_file(file_id, &[b'a'; 200], "r.raw").await.unwrap();
        svc.create_chunks_for_file(file_id, &path).await.unwrap();

        // Overwrite with different bytes of the same length, then
        // materialize again: the chunked stream must carry the new bytes.
        svc.store_file(file_id, &[b'b'; 200], "r.raw").await.unwrap();
        let count = svc.create_chunks_for_file(file_id, &path).await.unwrap();
        assert_eq!(count, 5);

        let chunked = svc.create_chunked_read_stream(file_id, ByteRange::new(0, 199));
        futures::pin_mut!(chunked);
        assert_eq!(collect_reader(chunked).await, vec![b'b'; 200]);
    }

    #[tokio::test]
    async fn test_partial_chunk_set_is_rebuilt() {
        let (svc, _dir) = test_service(100, 40);
        let file_id = FileId::new();
        let path = svc.store_file(file_id, &[7u8; 200], "p.raw").await.unwrap();

        // An interrupted build leaves a committed prefix short of the
        // five rows this blob needs.
        {
            let conn = get_conn(&svc.db).unwrap();
            chunks::insert_batch(
                &conn,
                file_id,
                0,
                &[vec![0u8; 40], vec![0u8; 40]],
                Utc::now() + Duration::hours(1),
            )
            .unwrap();
        }

        let count = svc.create_chunks_for_file(file_id, &path).await.unwrap();
        assert_eq!(count, 5);

        let mut reassembled = Vec::new();
        for idx in 0..count {
            reassembled.extend(svc.get_chunk(file_id, idx).unwrap());
        }
        assert_eq!(reassembled, vec![7u8; 200]);
    }

    #[tokio::test]
    async fn test_store_from_reader_reports_written_size() {
        let (svc, _dir) = test_service(1 << 20, 256);
        let file_id = FileId::new();
        let bytes = vec![9u8; 777];

        let mut reader = &bytes[..];
        let (path, written) = svc
            .store_file_from_reader(file_id, &mut reader, "s.jpg")
            .await
            .unwrap();
        assert_eq!(written, 777);

        let stream = svc.create_read_stream(&path, None).await.unwrap();
        assert_eq!(collect_reader(stream).await, bytes);
    }

    #[tokio::test]
    async fn test_materialize_missing_file_fails_loud() {
        let (svc, _dir) = test_service(100, 40);
        let err = svc
            .create_chunks_for_file(FileId::new(), "2026/01/ghost.cr3")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_ranged_read_stream() {
        let (svc, _dir) = test_service(1 << 20, 256);
        let file_id = FileId::new();
        let bytes = b"0123456789".to_vec();
        let path = svc.store_file(file_id, &bytes, "digits.txt").await.unwrap();

        let stream = svc
            .create_read_stream(&path, Some(ByteRange::new(2, 5)))
            .await
            .unwrap();
        assert_eq!(collect_reader(stream).await, b"2345");
    }

    #[tokio::test]
    async fn test_chunked_stream_matches_plain_stream() {
        let (svc, _dir) = test_service(50, 16);
        let file_id = FileId::new();
        let bytes: Vec<u8> = (0..130u32).map(|i| (i * 7 % 256) as u8).collect();
        let path = svc.store_file(file_id, &bytes, "asset.raw").await.unwrap();
        svc.create_chunks_for_file(file_id, &path).await.unwrap();

        for range in [
            ByteRange::new(0, 129),
            ByteRange::new(0, 15),
            ByteRange::new(10, 40),
            ByteRange::new(16, 31),
            ByteRange::new(120, 129),
            ByteRange::new(129, 129),
        ] {
            let plain = svc.create_read_stream(&path, Some(range)).await.unwrap();
            let chunked = svc.create_chunked_read_stream(file_id, range);
            futures::pin_mut!(chunked);
            assert_eq!(
                collect_reader(chunked).await,
                collect_reader(plain).await,
                "range {:?}",
                range
            );
        }
    }

    #[tokio::test]
    async fn test_cleanup_expired_chunks_counts() {
        let (svc, _dir) = test_service(10, 8);
        let file_id = FileId::new();
        let path = svc.store_file(file_id, &[5u8; 24], "t.raw").await.unwrap();
        svc.create_chunks_for_file(file_id, &path).await.unwrap();

        // Fresh rows are in the future; nothing to remove.
        assert_eq!(svc.cleanup_expired_chunks().unwrap(), 0);
        assert_eq!(svc.get_chunk(file_id, 0).unwrap(), vec![5u8; 8]);
    }

    #[tokio::test]
    async fn test_delete_file_and_chunks_fail_soft() {
        let (svc, _dir) = test_service(10, 8);
        let file_id = FileId::new();
        let path = svc.store_file(file_id, &[3u8; 16], "d.raw").await.unwrap();
        svc.create_chunks_for_file(file_id, &path).await.unwrap();

        svc.delete_file(&path).await.unwrap();
        svc.delete_chunks(file_id).unwrap();

        // Already-absent targets never fail.
        svc.delete_file(&path).await.unwrap();
        svc.delete_chunks(file_id).unwrap();
        svc.delete_file("2026/01/never-stored.bin").await.unwrap();
    }
}
