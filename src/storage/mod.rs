//! This module defines the record history: the canonical line format and the
//! append-only store that mirrors every line to a durable file.
pub mod format;
pub mod log_store;

pub use log_store::LogStore;
