//! Named annotation and CDD caches

use crate::ttl::{CacheStats, TtlCache};
use seqgate_common::config::CacheLimits;
use seqgate_common::{AnnotInfo, CddInfo, SeqKey};
use std::collections::BTreeSet;

/// Annotation name plus the identifier set it was requested for.
/// Names compare case-insensitively; the key holds the upper-cased form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotKey {
    pub name: String,
    pub seq_ids: BTreeSet<String>,
}

impl AnnotKey {
    pub fn new<I, S>(name: impl Into<String>, seq_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name: String = name.into();
        Self {
            name: name.to_ascii_uppercase(),
            seq_ids: seq_ids.into_iter().map(Into::into).collect(),
        }
    }
}

pub struct AnnotCache {
    cache: TtlCache<AnnotKey, AnnotInfo>,
}

impl AnnotCache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            cache: TtlCache::new(limits.max_size, limits.ttl()),
        }
    }

    pub fn find(&self, key: &AnnotKey) -> Option<AnnotInfo> {
        self.cache.find(key)
    }

    pub fn add(&self, info: AnnotInfo) {
        let key = AnnotKey::new(info.name.as_str(), info.seq_ids.iter().cloned());
        self.cache.add(key, info);
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

/// CDD annotation records per canonical sequence
pub struct CddCache {
    cache: TtlCache<SeqKey, CddInfo>,
}

impl CddCache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            cache: TtlCache::new(limits.max_size, limits.ttl()),
        }
    }

    pub fn find(&self, key: &SeqKey) -> Option<CddInfo> {
        self.cache.find(key)
    }

    pub fn add(&self, key: SeqKey, info: CddInfo) {
        self.cache.add(key, info);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
