//! Darkroom - storage and delivery engine for large photographic assets
//!
//! This library crate exposes the core functionality for integration testing.

pub mod archive;
pub mod config;
pub mod notifications;
pub mod server;
pub mod storage;
pub mod streaming;
