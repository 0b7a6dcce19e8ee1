//! seqgate Common - Shared types and utilities
//!
//! This crate provides the identifiers, record types, error definitions and
//! configuration used across all seqgate components.

pub mod config;
pub mod error;
pub mod types;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use types::*;
