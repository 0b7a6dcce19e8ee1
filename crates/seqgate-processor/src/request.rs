//! Parsed requests

use crate::metrics::RequestKind;
use seqgate_common::{BlobId, IncludeInfo};

/// Which layers a request may use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// In-memory and persistent caches only; a miss is not found
    CacheOnly,
    /// Skip the caches and go to the database
    DbOnly,
    /// Caches first, then the database
    #[default]
    CacheThenDb,
}

impl CacheMode {
    pub const fn use_cache(self) -> bool {
        !matches!(self, Self::DbOnly)
    }

    pub const fn use_db(self) -> bool {
        !matches!(self, Self::CacheOnly)
    }
}

/// Resolve a seq-id to its bioseq info
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub seq_id: String,
    pub seq_id_type: Option<i16>,
    /// Fields the client wants
    pub include: IncludeInfo,
    pub cache_mode: CacheMode,
}

/// Retrieve a blob by id
#[derive(Debug, Clone)]
pub struct GetBlobRequest {
    pub blob_id: BlobId,
    /// Exact version; newest when unset
    pub last_modified: Option<i64>,
    /// Enables exclude-blob bookkeeping
    pub client_id: Option<String>,
    pub cache_mode: CacheMode,
}

/// Retrieve named annotations of a seq-id
#[derive(Debug, Clone)]
pub struct AnnotRequest {
    pub seq_id: String,
    pub seq_id_type: Option<i16>,
    pub names: Vec<String>,
    pub cache_mode: CacheMode,
}

/// Resolve a seq-id and retrieve its blob
#[derive(Debug, Clone)]
pub struct GetRequest {
    pub seq_id: String,
    pub seq_id_type: Option<i16>,
    pub client_id: Option<String>,
    pub cache_mode: CacheMode,
}

#[derive(Debug, Clone)]
pub enum Request {
    Resolve(ResolveRequest),
    GetBlob(GetBlobRequest),
    NamedAnnot(AnnotRequest),
    Get(GetRequest),
}

impl Request {
    pub const fn kind(&self) -> RequestKind {
        match self {
            Self::Resolve(_) => RequestKind::Resolve,
            Self::GetBlob(_) => RequestKind::GetBlob,
            Self::NamedAnnot(_) => RequestKind::NamedAnnot,
            Self::Get(_) => RequestKind::Get,
        }
    }
}
