//! Bioseq info cache
//!
//! Records are stored once per canonical key. Many request identifiers can
//! resolve to the same canonical sequence, so a secondary index maps each
//! request key to the canonical key it resolved to. Both indices sit behind
//! one lock and are updated together.

use crate::ttl::{CacheStats, TtlIndex};
use parking_lot::Mutex;
use seqgate_common::config::{CacheLimits, TieBreak};
use seqgate_common::{BioseqInfo, SeqKey};
use std::time::Instant;
use tracing::trace;

/// Request-side key: the seq-id text as asked plus the requested type
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey {
    pub text: String,
    pub seq_id_type: Option<i16>,
}

impl RequestKey {
    pub fn new(text: impl Into<String>, seq_id_type: Option<i16>) -> Self {
        Self {
            text: text.into(),
            seq_id_type,
        }
    }
}

struct BioseqIndices {
    records: TtlIndex<SeqKey, BioseqInfo>,
    by_request: TtlIndex<RequestKey, SeqKey>,
}

/// Bioseq info cache with a request-id secondary index
pub struct BioseqInfoCache {
    inner: Mutex<BioseqIndices>,
}

impl BioseqInfoCache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            inner: Mutex::new(BioseqIndices {
                records: TtlIndex::new(limits.max_size, limits.ttl()),
                by_request: TtlIndex::new(limits.max_size, limits.ttl()),
            }),
        }
    }

    /// Find the record a request key resolved to earlier
    pub fn find(&self, request: &RequestKey) -> Option<BioseqInfo> {
        self.find_at(request, Instant::now())
    }

    pub fn find_at(&self, request: &RequestKey, now: Instant) -> Option<BioseqInfo> {
        let mut guard = self.inner.lock();
        let indices = &mut *guard;

        let key = indices.by_request.find(request, now)?.clone();
        if let Some(info) = indices.records.find(&key, now) {
            return Some(info.clone());
        }

        // Target expired or was evicted; do not leave the secondary dangling
        trace!("Dropping dangling request key {:?} -> {}", request, key);
        indices.by_request.remove(request);
        None
    }

    /// Find by canonical key
    pub fn find_canonical(&self, key: &SeqKey) -> Option<BioseqInfo> {
        self.inner
            .lock()
            .records
            .find(key, Instant::now())
            .cloned()
    }

    /// Find a record for `accession` when version and/or type are unknown.
    ///
    /// With both known this is an exact lookup; otherwise all live records of
    /// the accession are scanned and `tie_break` picks one.
    pub fn find_best(
        &self,
        accession: &str,
        version: Option<i32>,
        seq_id_type: Option<i16>,
        tie_break: TieBreak,
    ) -> Option<BioseqInfo> {
        self.find_best_at(accession, version, seq_id_type, tie_break, Instant::now())
    }

    pub fn find_best_at(
        &self,
        accession: &str,
        version: Option<i32>,
        seq_id_type: Option<i16>,
        tie_break: TieBreak,
        now: Instant,
    ) -> Option<BioseqInfo> {
        let mut guard = self.inner.lock();
        if let (Some(version), Some(seq_id_type)) = (version, seq_id_type) {
            let key = SeqKey {
                accession: accession.to_string(),
                version,
                seq_id_type,
            };
            return guard.records.find(&key, now).cloned();
        }

        guard.records.purge_expired(now);
        let low = SeqKey {
            accession: accession.to_string(),
            version: version.unwrap_or(i32::MIN),
            seq_id_type: i16::MIN,
        };
        let high = SeqKey {
            accession: accession.to_string(),
            version: version.unwrap_or(i32::MAX),
            seq_id_type: i16::MAX,
        };
        let candidates = guard
            .records
            .range(low..=high, now)
            .filter(|(key, _)| seq_id_type.is_none_or(|t| key.seq_id_type == t))
            .map(|(_, info)| info);
        pick(candidates, tie_break).cloned()
    }

    /// Store a resolved record and remember which request produced it.
    ///
    /// If the canonical record is already cached the new one is merged into
    /// it with [`BioseqInfo::update`].
    pub fn add(&self, request: RequestKey, info: BioseqInfo) {
        self.add_at(request, info, Instant::now());
    }

    pub fn add_at(&self, request: RequestKey, info: BioseqInfo, now: Instant) {
        let mut guard = self.inner.lock();
        let indices = &mut *guard;

        let key = info.canonical.key();
        let merged = match indices.records.peek(&key, now) {
            Some(existing) => {
                let mut merged = existing.clone();
                merged.update(&info);
                merged
            }
            None => info,
        };
        indices.records.add(key.clone(), merged, now);
        indices.by_request.add(request, key, now);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().records.stats()
    }
}

/// Apply a tie-break policy to records already in key order
pub fn pick<'a, I>(candidates: I, tie_break: TieBreak) -> Option<&'a BioseqInfo>
where
    I: IntoIterator<Item = &'a BioseqInfo>,
{
    tie_break.pick(candidates, |info| info.canonical.version)
}
