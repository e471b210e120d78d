//! Download stream planning.
//!
//! Given a stored file's declared size and an optional Range header, decide
//! between plain and chunk-reconstructed streaming and compute the
//! partial-content framing the HTTP layer maps onto 200/206 responses.

pub mod range;

pub use range::{content_range, parse_range_header, resolve_range, RangeSpec};

use darkroom_common::{ByteRange, Error, Result};
use darkroom_db::models::StoredFile;

use crate::storage::StorageService;

/// A resolved download: which stream to build and how to frame it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlan {
    /// Serve via the chunk index instead of a direct file stream.
    pub chunked: bool,
    /// Resolved byte range; `None` means the full entity.
    pub range: Option<ByteRange>,
    /// Declared total size of the entity.
    pub total_size: u64,
    /// Bytes the response body will carry.
    pub content_length: u64,
    /// `Content-Range` value for partial responses.
    pub content_range: Option<String>,
}

impl DownloadPlan {
    /// Whether the HTTP layer should answer 206 instead of 200.
    pub fn is_partial(&self) -> bool {
        self.range.is_some()
    }
}

/// Build the download plan for a stored file.
///
/// Looks up the declared size, lazily materializes chunks when the file
/// crosses the chunking threshold (idempotent), and resolves the optional
/// Range header. A missing blob where a size was expected is reported,
/// never treated as empty.
pub async fn plan_download(
    storage: &StorageService,
    file: &StoredFile,
    range_header: Option<&str>,
) -> Result<DownloadPlan> {
    let stats = storage.file_stats(&file.storage_path).await;
    if !stats.exists {
        return Err(Error::not_found(format!(
            "blob for file {} at {}",
            file.id, file.storage_path
        )));
    }

    let size = file.size_bytes as u64;
    let chunked = storage.should_use_chunking(size);
    if chunked {
        storage
            .create_chunks_for_file(file.id, &file.storage_path)
            .await?;
    }

    let range = match range_header.and_then(parse_range_header) {
        Some(spec) => Some(resolve_range(spec, size)?),
        None => None,
    };

    Ok(match range {
        Some(range) => DownloadPlan {
            chunked,
            range: Some(range),
            total_size: size,
            content_length: range.len(),
            content_range: Some(content_range(range, size)),
        },
        None => DownloadPlan {
            chunked,
            range: None,
            total_size: size,
            content_length: size,
            content_range: None,
        },
    })
}
