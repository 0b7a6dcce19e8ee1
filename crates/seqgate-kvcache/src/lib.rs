//! seqgate KvCache - Persistent local key-value cache
//!
//! This crate provides the disk-backed layer consulted before the database:
//! - Packed, order-preserving key layouts for the three tables
//! - Read-only lookups with exact and best-prefix matching
//! - A bounded ring of runtime errors and per-table disabling
//! - A writer that builds table files

pub mod error;
pub mod keys;
pub mod runtime_errors;
pub mod store;
pub mod tables;
pub mod writer;

pub use error::{KvCacheError, KvCacheResult};
pub use runtime_errors::{RuntimeError, RuntimeErrors};
pub use store::LocalKvCache;
pub use tables::KvTable;
pub use writer::KvTableWriter;
