//! Seq-id resolution
//!
//! Resolution tries, in order: the in-memory bioseq info cache, the
//! persistent cache (primary table, then si2csi followed by the primary
//! table), and finally the database in the same order. Each database step is
//! one fetch; the resolver advances as their events arrive.

use crate::context::GatewayContext;
use crate::fetch_group::{FetchGroup, FetchPurpose};
use crate::metrics::{DataSource, LookupKind};
use crate::request::CacheMode;
use seqgate_cache::RequestKey;
use seqgate_common::{BioseqInfo, CanonicalSeqId, GatewayError, ParsedSeqId};
use seqgate_fetch::{DbQuery, DbRecord, FetchEvent};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a resolution step
#[derive(Debug)]
pub enum Resolution {
    /// A fetch is in flight
    Pending,
    Found(BioseqInfo),
    NotFound,
    Failed(GatewayError),
}

pub struct Resolver {
    ctx: Arc<GatewayContext>,
    seq_id: ParsedSeqId,
    request_key: RequestKey,
    cache_mode: CacheMode,
    /// Bioseq info rows of the fetch in flight
    candidates: Vec<BioseqInfo>,
    /// Canonical id found through si2csi
    canonical: Option<CanonicalSeqId>,
}

impl Resolver {
    pub fn new(ctx: Arc<GatewayContext>, seq_id: ParsedSeqId, cache_mode: CacheMode) -> Self {
        let request_key = RequestKey::new(seq_id.text.clone(), seq_id.seq_id_type);
        Self {
            ctx,
            seq_id,
            request_key,
            cache_mode,
            candidates: Vec::new(),
            canonical: None,
        }
    }

    pub const fn seq_id(&self) -> &ParsedSeqId {
        &self.seq_id
    }

    /// Whether a fetch of this purpose belongs to resolution
    pub const fn owns(purpose: &FetchPurpose) -> bool {
        matches!(
            purpose,
            FetchPurpose::BioseqInfo | FetchPurpose::Si2Csi | FetchPurpose::BioseqInfoByCanonical
        )
    }

    /// Try the caches; on a miss start the first database fetch
    pub fn start(&mut self, fetches: &mut FetchGroup) -> Resolution {
        if self.cache_mode.use_cache() {
            if let Some((info, source)) = self.lookup_caches() {
                return self.found(info, source);
            }
        }
        if !self.cache_mode.use_db() {
            return self.not_found();
        }

        match self.canonical.clone() {
            Some(canonical) => {
                self.fetch_by_canonical(fetches, &canonical);
            }
            None if self.seq_id.is_gi() => {
                self.fetch_si2csi(fetches);
            }
            None => {
                let query = DbQuery::BioseqInfo {
                    keyspace: self.ctx.config.db.bioseq_keyspace.clone(),
                    accession: self.seq_id.accession.clone(),
                    version: self.seq_id.version,
                    seq_id_type: self.seq_id.seq_id_type,
                    gi: None,
                };
                fetches.start(query, FetchPurpose::BioseqInfo);
            }
        }
        Resolution::Pending
    }

    /// Feed one event of a resolution fetch
    pub fn on_event(
        &mut self,
        purpose: &FetchPurpose,
        event: FetchEvent,
        fetches: &mut FetchGroup,
    ) -> Resolution {
        match event {
            FetchEvent::Data {
                record: Some(DbRecord::BioseqInfo(info)),
                ..
            } => {
                self.candidates.push(info);
                Resolution::Pending
            }
            FetchEvent::Data {
                record: Some(DbRecord::Si2Csi(record)),
                ..
            } => {
                if self.canonical.is_none() {
                    self.canonical = Some(record.canonical);
                }
                Resolution::Pending
            }
            FetchEvent::Data {
                record: Some(other),
                ..
            } => {
                warn!("Unexpected record during resolution: {:?}", other);
                Resolution::Pending
            }
            FetchEvent::Data { last: true, .. } => self.step_done(purpose, fetches),
            FetchEvent::Data { .. } | FetchEvent::Cancelled { .. } => Resolution::Pending,
            FetchEvent::Error { error, .. } => {
                self.ctx.counters.record_db_error();
                Resolution::Failed(error.into())
            }
        }
    }

    fn step_done(&mut self, purpose: &FetchPurpose, fetches: &mut FetchGroup) -> Resolution {
        match purpose {
            FetchPurpose::BioseqInfo | FetchPurpose::BioseqInfoByCanonical => {
                let candidates = std::mem::take(&mut self.candidates);
                let tie_break = self.ctx.config.resolve.tie_break;
                if let Some(info) = tie_break.pick(candidates, |info| info.canonical.version) {
                    return self.found(info, DataSource::Db);
                }
                if *purpose == FetchPurpose::BioseqInfo {
                    return self.fetch_si2csi(fetches);
                }
                self.not_found()
            }
            FetchPurpose::Si2Csi => match self.canonical.clone() {
                Some(canonical) => {
                    self.ctx
                        .counters
                        .record_lookup(LookupKind::Si2Csi, DataSource::Db);
                    if let Some(info) = self.cached_canonical(&canonical) {
                        return self.found(info, DataSource::Cache);
                    }
                    self.fetch_by_canonical(fetches, &canonical)
                }
                None => {
                    self.ctx
                        .counters
                        .record_lookup(LookupKind::Si2Csi, DataSource::NotFound);
                    self.not_found()
                }
            },
            _ => Resolution::Pending,
        }
    }

    fn lookup_caches(&mut self) -> Option<(BioseqInfo, DataSource)> {
        let caches = &self.ctx.caches;
        let kv = &self.ctx.kv_cache;
        let tie_break = self.ctx.config.resolve.tie_break;
        let seq_id = &self.seq_id;

        if let Some(info) = caches.bioseq_info.find(&self.request_key) {
            return Some((info, DataSource::Cache));
        }
        if !seq_id.is_gi() {
            if let Some(info) = caches.bioseq_info.find_best(
                &seq_id.accession,
                seq_id.version,
                seq_id.seq_id_type,
                tie_break,
            ) {
                return Some((info, DataSource::Cache));
            }
            if let Some(info) = kv.lookup_bioseq_info(
                &seq_id.accession,
                seq_id.version,
                seq_id.seq_id_type,
                None,
                tie_break,
            ) {
                return Some((info, DataSource::KvCache));
            }
        }

        let csi = kv.lookup_si2csi(&seq_id.accession, seq_id.seq_id_type)?;
        self.ctx
            .counters
            .record_lookup(LookupKind::Si2Csi, DataSource::KvCache);
        let canonical = csi.canonical;
        if let Some(info) = caches.bioseq_info.find_canonical(&canonical.key()) {
            return Some((info, DataSource::Cache));
        }
        let found = kv.lookup_bioseq_info(
            &canonical.accession,
            Some(canonical.version),
            Some(canonical.seq_id_type),
            None,
            tie_break,
        );
        if found.is_none() {
            // The database can still supply the record for this canonical id
            self.canonical = Some(canonical);
        }
        found.map(|info| (info, DataSource::KvCache))
    }

    /// Memory-cache record for a canonical id learned from si2csi
    fn cached_canonical(&self, canonical: &CanonicalSeqId) -> Option<BioseqInfo> {
        if !self.cache_mode.use_cache() {
            return None;
        }
        self.ctx.caches.bioseq_info.find_canonical(&canonical.key())
    }

    fn fetch_si2csi(&mut self, fetches: &mut FetchGroup) -> Resolution {
        let query = DbQuery::Si2Csi {
            keyspace: self.ctx.config.db.bioseq_keyspace.clone(),
            sec_seq_id: self.seq_id.accession.clone(),
            sec_seq_id_type: self.seq_id.seq_id_type,
        };
        fetches.start(query, FetchPurpose::Si2Csi);
        Resolution::Pending
    }

    fn fetch_by_canonical(
        &mut self,
        fetches: &mut FetchGroup,
        canonical: &CanonicalSeqId,
    ) -> Resolution {
        let query = DbQuery::BioseqInfo {
            keyspace: self.ctx.config.db.bioseq_keyspace.clone(),
            accession: canonical.accession.clone(),
            version: Some(canonical.version),
            seq_id_type: Some(canonical.seq_id_type),
            gi: None,
        };
        fetches.start(query, FetchPurpose::BioseqInfoByCanonical);
        Resolution::Pending
    }

    fn found(&mut self, mut info: BioseqInfo, source: DataSource) -> Resolution {
        debug!(
            "Resolved '{}' to {} from {}",
            self.seq_id.text,
            info.canonical,
            source.as_str()
        );
        self.ctx
            .counters
            .record_lookup(LookupKind::BioseqInfo, source);
        info.request_id.clone_from(&self.seq_id.text);

        let caches = &self.ctx.caches;
        caches
            .bioseq_info
            .add(self.request_key.clone(), info.clone());
        caches.tax_id.add(info.canonical.key(), info.tax_id);
        Resolution::Found(info)
    }

    fn not_found(&mut self) -> Resolution {
        debug!("Seq-id '{}' not found", self.seq_id.text);
        self.ctx
            .counters
            .record_lookup(LookupKind::BioseqInfo, DataSource::NotFound);
        Resolution::NotFound
    }

    /// Error for a failed resolution of this seq-id
    pub fn not_found_error(&self) -> GatewayError {
        GatewayError::SeqIdNotFound(self.seq_id.text.clone())
    }
}
