//! Tax id cache

use crate::ttl::TtlCache;
use seqgate_common::config::CacheLimits;
use seqgate_common::SeqKey;

/// Canonical sequence key to taxonomy id
pub struct TaxIdCache {
    cache: TtlCache<SeqKey, i32>,
}

impl TaxIdCache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            cache: TtlCache::new(limits.max_size, limits.ttl()),
        }
    }

    pub fn find(&self, key: &SeqKey) -> Option<i32> {
        self.cache.find(key)
    }

    /// Zero means "unknown" and is not cached
    pub fn add(&self, key: SeqKey, tax_id: i32) {
        if tax_id > 0 {
            self.cache.add(key, tax_id);
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tax_id_not_cached() {
        let cache = TaxIdCache::new(CacheLimits::new(10, 60_000));
        let key = SeqKey {
            accession: "NC_000001".to_string(),
            version: 11,
            seq_id_type: 10,
        };
        cache.add(key.clone(), 0);
        assert!(cache.is_empty());

        cache.add(key.clone(), 9606);
        assert_eq!(cache.find(&key), Some(9606));
    }
}
