//! Database query operations, grouped by table.

pub mod archives;
pub mod chunks;
pub mod files;
