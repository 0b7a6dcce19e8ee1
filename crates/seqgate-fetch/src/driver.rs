//! Database driver seam
//!
//! The distributed database is reached only through [`DbDriver`]. A query
//! returns one page of records at a time together with an opaque paging
//! state that resumes it.

use async_trait::async_trait;
use bytes::Bytes;
use seqgate_common::{BioseqInfo, BlobId, BlobInfo, GatewayError, NamedAnnotRecord, Si2CsiRecord};
use std::time::Duration;

/// One database query
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DbQuery {
    /// Bioseq info rows of an accession, narrowed by the known components
    BioseqInfo {
        keyspace: String,
        accession: String,
        version: Option<i32>,
        seq_id_type: Option<i16>,
        gi: Option<i64>,
    },
    /// Secondary id to canonical id rows
    Si2Csi {
        keyspace: String,
        sec_seq_id: String,
        sec_seq_id_type: Option<i16>,
    },
    /// Blob properties; newest first when no version is given
    BlobProp {
        blob_id: BlobId,
        last_modified: Option<i64>,
    },
    /// Payload chunks of one blob version, in chunk order
    BlobChunks { blob_id: BlobId, last_modified: i64 },
    /// Named annotations in one keyspace (partition)
    NamedAnnots {
        keyspace: String,
        accession: String,
        version: i32,
        seq_id_type: i16,
        names: Vec<String>,
    },
    /// CDD annotation records of one sequence
    Cdd {
        accession: String,
        version: i32,
        seq_id_type: i16,
    },
}

impl DbQuery {
    /// Short name for logs and call accounting
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BioseqInfo { .. } => "bioseq_info",
            Self::Si2Csi { .. } => "si2csi",
            Self::BlobProp { .. } => "blob_prop",
            Self::BlobChunks { .. } => "blob_chunks",
            Self::NamedAnnots { .. } => "named_annots",
            Self::Cdd { .. } => "cdd",
        }
    }
}

/// One row produced by a query
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DbRecord {
    BioseqInfo(BioseqInfo),
    Si2Csi(Si2CsiRecord),
    BlobProp(BlobInfo),
    BlobChunk {
        blob_id: BlobId,
        chunk_no: i32,
        data: Bytes,
    },
    /// Named annotation or CDD record
    NamedAnnot(NamedAnnotRecord),
}

/// One page of results
#[derive(Clone, Debug, Default)]
pub struct DbPage {
    pub records: Vec<DbRecord>,
    /// Resumes the query; `None` once exhausted
    pub paging_state: Option<Bytes>,
}

/// Database access errors
#[derive(Clone, Debug, thiserror::Error)]
pub enum DbError {
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),
}

impl DbError {
    /// Transient errors worth another attempt
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

impl From<DbError> for GatewayError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Timeout(_) => Self::Timeout,
            DbError::Unavailable(msg) => Self::Unavailable(msg),
            DbError::Query(msg) => Self::Database(msg),
        }
    }
}

/// Narrow interface to the distributed database
#[async_trait]
pub trait DbDriver: Send + Sync {
    /// Fetch one page of `query`, resuming from `paging_state` when given
    async fn fetch_page(
        &self,
        query: &DbQuery,
        paging_state: Option<Bytes>,
        page_size: usize,
    ) -> Result<DbPage, DbError>;
}
