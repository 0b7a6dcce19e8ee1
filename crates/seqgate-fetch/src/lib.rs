//! seqgate Fetch - Database access layer
//!
//! This crate provides:
//! - The [`DbDriver`] seam to the distributed database and its query model
//! - [`FetchTask`], a retrying, cancellable state machine that reports
//!   records to its owner as [`FetchEvent`]s
//! - [`MemoryDriver`], an in-memory driver with scriptable failures

pub mod driver;
pub mod memory;
pub mod task;

pub use driver::{DbDriver, DbError, DbPage, DbQuery, DbRecord};
pub use memory::MemoryDriver;
pub use task::{FetchEvent, FetchId, FetchOptions, FetchState, FetchTask};
