//! Core enums shared across the storage and archive layers.

use serde::{Deserialize, Serialize};

/// Kind of a stored asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Camera original (raw or full-resolution capture).
    Original,
    /// Processed rendition derived from an original.
    Rendition,
    /// Sidecar file (edit recipes, XMP, embedded previews).
    Sidecar,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Original => write!(f, "original"),
            Self::Rendition => write!(f, "rendition"),
            Self::Sidecar => write!(f, "sidecar"),
        }
    }
}

impl std::str::FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(Self::Original),
            "rendition" => Ok(Self::Rendition),
            "sidecar" => Ok(Self::Sidecar),
            _ => Err(format!("Invalid asset kind: {}", s)),
        }
    }
}

/// Selection predicate for which of a project's assets go into an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFilter {
    /// Only processed renditions.
    RenditionsOnly,
    /// Every stored asset including originals and sidecars.
    Everything,
}

impl ArchiveFilter {
    /// Whether a given asset kind is included by this filter.
    pub fn includes(&self, kind: AssetKind) -> bool {
        match self {
            Self::RenditionsOnly => kind == AssetKind::Rendition,
            Self::Everything => true,
        }
    }
}

impl std::fmt::Display for ArchiveFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RenditionsOnly => write!(f, "renditions_only"),
            Self::Everything => write!(f, "everything"),
        }
    }
}

impl std::str::FromStr for ArchiveFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "renditions_only" => Ok(Self::RenditionsOnly),
            "everything" => Ok(Self::Everything),
            _ => Err(format!("Invalid archive filter: {}", s)),
        }
    }
}

/// Inclusive byte range of a partial-content request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Construct a range; `end` is inclusive.
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes the range covers. Never zero: both ends are inclusive.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}
