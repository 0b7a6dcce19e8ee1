//! Bounded TTL cache
//!
//! Entries carry a deadline and are evicted in insertion order once the
//! cache holds more than `max_size` of them. Access never promotes an entry:
//! the eviction queue is strictly FIFO.
//!
//! Two ordered maps share a sequence number instead of pointers:
//!
//! ```text
//! entries: key -> Slot { value, deadline, seq }
//! fifo:    seq -> key            (first = oldest insertion)
//! ```
//!
//! Every live entry appears exactly once in each map. Removing by key looks
//! up `seq` in the slot; removing from the head pops `fifo` and drops the
//! matching slot. Both are O(log n).

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ops::RangeBounds;
use std::time::{Duration, Instant};

/// Cache statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to respect `max_size`
    pub evictions: u64,
    /// Entries dropped because their deadline passed
    pub expirations: u64,
    /// Current number of entries
    pub len: usize,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Slot<V> {
    value: V,
    /// `None` when the TTL is too large to represent
    deadline: Option<Instant>,
    seq: u64,
}

impl<V> Slot<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| d <= now)
    }
}

/// Unsynchronized TTL index.
///
/// Callers that need several indices updated together (see
/// [`crate::BioseqInfoCache`]) keep more than one of these behind a single
/// lock; everyone else uses [`TtlCache`].
pub struct TtlIndex<K, V> {
    entries: BTreeMap<K, Slot<V>>,
    fifo: BTreeMap<u64, K>,
    next_seq: u64,
    max_size: usize,
    ttl: Duration,
    stats: CacheStats,
}

impl<K: Ord + Clone, V> TtlIndex<K, V> {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: BTreeMap::new(),
            fifo: BTreeMap::new(),
            next_seq: 0,
            max_size,
            ttl,
            stats: CacheStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            len: self.entries.len(),
            ..self.stats
        }
    }

    /// Look up `key`, discarding the expired FIFO prefix first
    pub fn find(&mut self, key: &K, now: Instant) -> Option<&V> {
        self.purge_expired(now);

        let expired = match self.entries.get(key) {
            Some(slot) => slot.is_expired(now),
            None => {
                self.stats.misses += 1;
                return None;
            }
        };
        if expired {
            self.remove(key);
            self.stats.expirations += 1;
            self.stats.misses += 1;
            return None;
        }

        self.stats.hits += 1;
        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Look up `key` without sweeping or counting
    pub fn peek(&self, key: &K, now: Instant) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| &slot.value)
    }

    /// Live entries with keys in `range`, in key order
    pub fn range<R>(&self, range: R, now: Instant) -> impl Iterator<Item = (&K, &V)>
    where
        R: RangeBounds<K>,
    {
        self.entries
            .range(range)
            .filter(move |(_, slot)| !slot.is_expired(now))
            .map(|(key, slot)| (key, &slot.value))
    }

    /// Insert or replace `key`, then trim the oldest insertions
    pub fn add(&mut self, key: K, value: V, now: Instant) {
        if let Some(old) = self.entries.remove(&key) {
            self.fifo.remove(&old.seq);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.fifo.insert(seq, key.clone());
        self.entries.insert(
            key,
            Slot {
                value,
                deadline: now.checked_add(self.ttl),
                seq,
            },
        );

        while self.entries.len() > self.max_size {
            let Some((_, oldest)) = self.fifo.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            self.stats.evictions += 1;
        }
    }

    /// Remove `key` from both indices
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.entries.remove(key)?;
        self.fifo.remove(&slot.seq);
        Some(slot.value)
    }

    /// Drop every entry at the head of the FIFO whose deadline has passed.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let mut purged = 0;
        while let Some(head) = self.fifo.first_entry() {
            let expired = self
                .entries
                .get(head.get())
                .is_none_or(|slot| slot.is_expired(now));
            if !expired {
                break;
            }
            let key = head.remove();
            self.entries.remove(&key);
            purged += 1;
        }
        self.stats.expirations += purged as u64;
        purged
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.fifo.clear();
    }

    /// Keys from oldest to newest insertion
    pub fn keys_in_insertion_order(&self) -> impl Iterator<Item = &K> {
        self.fifo.values()
    }
}

/// Thread-safe bounded TTL cache
pub struct TtlCache<K, V> {
    inner: Mutex<TtlIndex<K, V>>,
}

impl<K: Ord + Clone, V: Clone> TtlCache<K, V> {
    /// Create a new cache holding at most `max_size` entries for `ttl` each
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(TtlIndex::new(max_size, ttl)),
        }
    }

    /// Look up a value; expired entries are removed as a side effect
    pub fn find(&self, key: &K) -> Option<V> {
        self.find_at(key, Instant::now())
    }

    pub fn find_at(&self, key: &K, now: Instant) -> Option<V> {
        self.inner.lock().find(key, now).cloned()
    }

    /// Insert or replace a value, resetting its deadline
    pub fn add(&self, key: K, value: V) {
        self.add_at(key, value, Instant::now());
    }

    pub fn add_at(&self, key: K, value: V, now: Instant) {
        self.inner.lock().add(key, value, now);
    }

    /// Explicitly drop an entry
    pub fn drop_key(&self, key: &K) -> Option<V> {
        self.inner.lock().remove(key)
    }

    pub fn purge_expired(&self) -> usize {
        self.inner.lock().purge_expired(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(10);

    #[test]
    fn test_add_and_find() {
        let cache = TtlCache::new(10, TTL);
        cache.add("a".to_string(), 1);

        assert_eq!(cache.find(&"a".to_string()), Some(1));
        assert_eq!(cache.find(&"b".to_string()), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fifo_eviction_keeps_most_recent_distinct_keys() {
        let cache = TtlCache::new(3, TTL);
        let now = Instant::now();
        for (i, key) in [1, 2, 3, 2, 4, 5, 2, 6].into_iter().enumerate() {
            cache.add_at(key, i, now);
        }

        // Most recent distinct insertions: 6, 2, 5
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.find_at(&6, now), Some(7));
        assert_eq!(cache.find_at(&2, now), Some(6));
        assert_eq!(cache.find_at(&5, now), Some(5));
        assert_eq!(cache.find_at(&4, now), None);
        assert_eq!(cache.find_at(&1, now), None);
    }

    #[test]
    fn test_access_does_not_promote() {
        let cache = TtlCache::new(2, TTL);
        let now = Instant::now();
        cache.add_at(1, "one", now);
        cache.add_at(2, "two", now);

        // Reading 1 must not save it from eviction
        assert_eq!(cache.find_at(&1, now), Some("one"));
        cache.add_at(3, "three", now);

        assert_eq!(cache.find_at(&1, now), None);
        assert_eq!(cache.find_at(&2, now), Some("two"));
        assert_eq!(cache.find_at(&3, now), Some("three"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_expired_entry_is_removed_on_find() {
        let cache = TtlCache::new(10, Duration::from_millis(100));
        let start = Instant::now();
        cache.add_at("stale", 1, start);
        cache.add_at("other", 2, start + Duration::from_millis(80));
        assert_eq!(cache.len(), 2);

        let later = start + Duration::from_millis(150);
        assert_eq!(cache.find_at(&"stale", later), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.find_at(&"stale", later), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.find_at(&"other", later), Some(2));
    }

    #[test]
    fn test_find_sweeps_expired_prefix() {
        let mut index = TtlIndex::new(10, Duration::from_millis(100));
        let start = Instant::now();
        index.add(1, 'a', start);
        index.add(2, 'b', start);
        index.add(3, 'c', start + Duration::from_millis(90));

        // Looking up an unrelated key still clears 1 and 2
        let later = start + Duration::from_millis(120);
        assert!(index.find(&42, later).is_none());
        assert_eq!(index.len(), 1);
        assert_eq!(index.keys_in_insertion_order().copied().collect::<Vec<_>>(), vec![3]);
        assert_eq!(index.stats().expirations, 2);
    }

    #[test]
    fn test_replace_resets_deadline_and_position() {
        let cache = TtlCache::new(2, Duration::from_millis(100));
        let start = Instant::now();
        cache.add_at(1, 'a', start);
        cache.add_at(2, 'b', start);
        cache.add_at(1, 'z', start + Duration::from_millis(60));

        // 2 is now the oldest insertion
        cache.add_at(3, 'c', start + Duration::from_millis(60));
        assert_eq!(cache.find_at(&2, start + Duration::from_millis(60)), None);

        // 1 lives past its original deadline
        assert_eq!(cache.find_at(&1, start + Duration::from_millis(120)), Some('z'));
    }

    #[test]
    fn test_zero_capacity_caches_nothing() {
        let cache = TtlCache::new(0, TTL);
        cache.add(1, 1);
        assert!(cache.is_empty());
        assert_eq!(cache.find(&1), None);
    }

    #[test]
    fn test_drop_key_and_clear() {
        let cache = TtlCache::new(10, TTL);
        cache.add(1, "a");
        cache.add(2, "b");

        assert_eq!(cache.drop_key(&1), Some("a"));
        assert_eq!(cache.drop_key(&1), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_range_skips_expired() {
        let mut index = TtlIndex::new(10, Duration::from_millis(100));
        let start = Instant::now();
        index.add(("acc", 1), 1, start);
        index.add(("acc", 2), 2, start + Duration::from_millis(50));
        index.add(("other", 1), 3, start + Duration::from_millis(50));

        let later = start + Duration::from_millis(120);
        let live: Vec<_> = index
            .range(("acc", 0)..=("acc", i32::MAX), later)
            .map(|(k, v)| (k.1, *v))
            .collect();
        assert_eq!(live, vec![(2, 2)]);
    }

    #[test]
    fn test_concurrent_adds_respect_capacity() {
        use std::sync::Arc;

        let cache = Arc::new(TtlCache::new(64, TTL));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..1_000 {
                        cache.add((t, i), i);
                        let _ = cache.find(&(t, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 64);
    }
}
