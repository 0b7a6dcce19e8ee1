//! seqgate Cache - Bounded in-memory caches
//!
//! This crate provides the in-memory layer in front of the persistent
//! key-value cache and the database:
//! - A generic size-bounded TTL cache with FIFO eviction
//! - Bioseq info, blob properties, named annotation, tax id and CDD caches
//! - The per-client exclude-blob ledger

pub mod annot;
pub mod bioseq;
pub mod blob;
pub mod exclude;
pub mod tax_id;
pub mod ttl;

pub use annot::{AnnotCache, AnnotKey, CddCache};
pub use bioseq::{pick, BioseqInfoCache, RequestKey};
pub use blob::{BlobPropCache, BlobPropKey};
pub use exclude::{ExcludeAddResult, ExcludeBlobCache, ExcludeState};
pub use tax_id::TaxIdCache;
pub use ttl::{CacheStats, TtlCache, TtlIndex};

use seqgate_common::config::CacheConfig;

/// All in-memory caches, built from one configuration section
pub struct MemoryCaches {
    pub bioseq_info: BioseqInfoCache,
    pub blob_prop: BlobPropCache,
    pub annot: AnnotCache,
    pub tax_id: TaxIdCache,
    pub cdd: CddCache,
}

impl MemoryCaches {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            bioseq_info: BioseqInfoCache::new(config.bioseq_info),
            blob_prop: BlobPropCache::new(config.blob_prop),
            annot: AnnotCache::new(config.annot),
            tax_id: TaxIdCache::new(config.tax_id),
            cdd: CddCache::new(config.cdd),
        }
    }
}
