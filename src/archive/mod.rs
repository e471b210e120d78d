//! Bulk zip export of a project's stored files.

mod builder;

pub use builder::ArchiveService;
