//! Deterministic on-disk path allocation.
//!
//! Relative paths follow the fixed scheme `{year}/{month:02}/{fileId}.{ext}`.
//! The layout is a compatibility contract with already-stored assets and
//! must not change across reimplementations.

use chrono::{DateTime, Datelike, Utc};
use darkroom_common::FileId;
use std::path::Path;

/// Fallback extension when the original name carries none.
const DEFAULT_EXTENSION: &str = "bin";

/// Compute the relative storage path for a file.
///
/// Deterministic for the same file ID within the same calendar month.
/// Pure function of its inputs and wall-clock time; performs no I/O.
/// Callers must create the containing directory before writing.
pub fn allocate(file_id: FileId, original_name: &str) -> String {
    allocate_at(file_id, original_name, Utc::now())
}

/// Compute the relative storage path at an explicit instant.
pub fn allocate_at(file_id: FileId, original_name: &str, when: DateTime<Utc>) -> String {
    let ext = extension_of(original_name);
    format!("{}/{:02}/{}.{}", when.year(), when.month(), file_id, ext)
}

/// Lower-cased extension of a filename, defaulting to `bin`.
fn extension_of(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}
