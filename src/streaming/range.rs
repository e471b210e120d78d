//! HTTP Range header parsing and resolution.
//!
//! Parsing is purely syntactic; resolving against a file size is where an
//! out-of-bounds start becomes a distinct range-not-satisfiable error
//! instead of being silently served as a full file.

use darkroom_common::{ByteRange, Error, Result};

/// A syntactically valid `bytes=` range before resolution against a size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=500-999` or `bytes=500-` (open end).
    FromTo(u64, Option<u64>),
    /// `bytes=-500` (last 500 bytes).
    Suffix(u64),
}

/// Parse an HTTP Range header.
///
/// Supports formats:
/// - bytes=0-499
/// - bytes=500-999
/// - bytes=500-
/// - bytes=-500 (last 500 bytes)
///
/// Returns `None` for anything malformed; per HTTP semantics a malformed
/// Range header is ignored and the full entity served.
pub fn parse_range_header(header: &str) -> Option<RangeSpec> {
    let header = header.strip_prefix("bytes=")?;

    let parts: Vec<&str> = header.split('-').collect();
    if parts.len() != 2 {
        return None;
    }

    let start = parts[0].trim();
    let end = parts[1].trim();

    match (start.is_empty(), end.is_empty()) {
        // bytes=-500 (last 500 bytes)
        (true, false) => {
            let suffix_len: u64 = end.parse().ok()?;
            if suffix_len == 0 {
                return None;
            }
            Some(RangeSpec::Suffix(suffix_len))
        }
        // bytes=500- (from 500 to end)
        (false, true) => {
            let start: u64 = start.parse().ok()?;
            Some(RangeSpec::FromTo(start, None))
        }
        // bytes=0-499
        (false, false) => {
            let start: u64 = start.parse().ok()?;
            let end: u64 = end.parse().ok()?;
            if start > end {
                return None;
            }
            Some(RangeSpec::FromTo(start, Some(end)))
        }
        // bytes=- (invalid)
        (true, true) => None,
    }
}

/// Resolve a parsed range against the file size.
///
/// The end offset is clamped to `size - 1`. A range starting past the last
/// byte is a client-error condition, never a full-file fallback.
pub fn resolve_range(spec: RangeSpec, size: u64) -> Result<ByteRange> {
    match spec {
        RangeSpec::FromTo(start, end) => {
            if start >= size {
                return Err(Error::RangeNotSatisfiable { start, size });
            }
            let end = end.map_or(size - 1, |e| e.min(size - 1));
            Ok(ByteRange::new(start, end))
        }
        RangeSpec::Suffix(suffix_len) => {
            if size == 0 {
                return Err(Error::RangeNotSatisfiable { start: 0, size });
            }
            let start = size.saturating_sub(suffix_len);
            Ok(ByteRange::new(start, size - 1))
        }
    }
}

/// Format a `Content-Range` header value for a resolved range.
pub fn content_range(range: ByteRange, size: u64) -> String {
    format!("bytes {}-{}/{}", range.start, range.end, size)
}
