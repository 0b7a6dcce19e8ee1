//! Error types for seqgate
//!
//! This module defines the common error type shared by caches, the fetch
//! layer and request processors.

use thiserror::Error;

/// Common result type for seqgate operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Common error type for seqgate
#[derive(Debug, Error)]
pub enum GatewayError {
    // Lookup errors
    #[error("seq-id not found: {0}")]
    SeqIdNotFound(String),

    #[error("blob not found: {0}")]
    BlobNotFound(String),

    #[error("named annotation not found: {0}")]
    AnnotationNotFound(String),

    // Request errors
    #[error("invalid seq-id: {0}")]
    InvalidSeqId(String),

    #[error("invalid blob id: {0}")]
    InvalidBlobId(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Database errors
    #[error("database query timeout")]
    Timeout,

    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(String),

    // Local cache errors
    #[error("local cache error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("request cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a local cache error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Check if this is a retryable error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_))
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SeqIdNotFound(_) | Self::BlobNotFound(_) | Self::AnnotationNotFound(_)
        )
    }

    /// HTTP-equivalent status code reported in reply messages
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidSeqId(_) | Self::InvalidBlobId(_) | Self::InvalidArgument(_) => 400,

            // 404 Not Found
            Self::SeqIdNotFound(_) | Self::BlobNotFound(_) | Self::AnnotationNotFound(_) => 404,

            // 499 Client Closed Request
            Self::Cancelled => 499,

            // 500 Internal Server Error
            Self::Timeout
            | Self::Unavailable(_)
            | Self::Database(_)
            | Self::Storage(_)
            | Self::Io(_)
            | Self::Configuration(_)
            | Self::Internal(_) => 500,
        }
    }
}
