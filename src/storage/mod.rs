//! Storage engine: path allocation, blob writes, chunk materialization,
//! plain and chunked streaming, deletion, and expiry cleanup.

pub mod allocator;
mod service;

pub use service::{FileStats, StorageService};
