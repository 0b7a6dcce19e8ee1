//! Blob properties cache

use crate::ttl::{CacheStats, TtlCache};
use seqgate_common::config::CacheLimits;
use seqgate_common::{BlobId, BlobInfo};

/// Blob props keyed by blob id and, optionally, an exact modification time.
///
/// `last_modified: None` stands for "newest known version".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobPropKey {
    pub blob_id: BlobId,
    pub last_modified: Option<i64>,
}

impl BlobPropKey {
    pub const fn new(blob_id: BlobId, last_modified: Option<i64>) -> Self {
        Self {
            blob_id,
            last_modified,
        }
    }
}

pub struct BlobPropCache {
    cache: TtlCache<BlobPropKey, BlobInfo>,
}

impl BlobPropCache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            cache: TtlCache::new(limits.max_size, limits.ttl()),
        }
    }

    pub fn find(&self, blob_id: BlobId, last_modified: Option<i64>) -> Option<BlobInfo> {
        self.cache.find(&BlobPropKey::new(blob_id, last_modified))
    }

    /// Cache under the exact version and, when asked for the newest, under
    /// the versionless key too
    pub fn add(&self, info: BlobInfo, requested_newest: bool) {
        if requested_newest {
            self.cache
                .add(BlobPropKey::new(info.blob_id, None), info.clone());
        }
        self.cache
            .add(BlobPropKey::new(info.blob_id, Some(info.last_modified)), info);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
