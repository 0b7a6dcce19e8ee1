//! Named annotation processor
//!
//! Resolves the seq-id, then serves each requested annotation name from the
//! annotation cache or the database. Regular names are fetched with one
//! query per configured keyspace; the CDD name goes to the CDD store. The
//! fetches run side by side and their records are forwarded as they arrive.

use crate::fetch_group::FetchPurpose;
use crate::metrics::{DataSource, LookupKind};
use crate::processor::{Processor, ProcessorCore, ProcessorStatus};
use crate::reply::{ReplyItem, ReplyMessage};
use crate::request::AnnotRequest;
use crate::resolver::{Resolution, Resolver};
use seqgate_cache::AnnotKey;
use seqgate_common::{
    AnnotInfo, CanonicalSeqId, CddInfo, GatewayError, NamedAnnotRecord, ParsedSeqId,
};
use seqgate_fetch::{DbQuery, DbRecord, FetchEvent};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct AnnotProcessor {
    core: ProcessorCore,
    request: AnnotRequest,
    resolver: Option<Resolver>,
    /// Requested names, duplicates removed, request order kept
    names: Vec<String>,
    canonical: Option<CanonicalSeqId>,
    found: HashSet<String>,
    /// Database records per name, cached once every fetch succeeded
    fetched: BTreeMap<String, Vec<NamedAnnotRecord>>,
    fetched_cdd: Option<Vec<NamedAnnotRecord>>,
    error: Option<GatewayError>,
}

impl AnnotProcessor {
    pub fn new(core: ProcessorCore, request: AnnotRequest) -> Self {
        let names = dedup_names(&request.names);
        Self {
            core,
            request,
            resolver: None,
            names,
            canonical: None,
            found: HashSet::new(),
            fetched: BTreeMap::new(),
            fetched_cdd: None,
            error: None,
        }
    }

    fn is_cdd(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(&self.core.ctx.config.db.cdd_annot_name)
    }

    fn on_resolution(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Pending => {}
            Resolution::Found(info) => self.start_annots(info.canonical),
            Resolution::NotFound => {
                if let Some(resolver) = &self.resolver {
                    let err = resolver.not_found_error();
                    self.core.fail(&err);
                }
            }
            Resolution::Failed(err) => self.core.fail(&err),
        }
    }

    fn start_annots(&mut self, canonical: CanonicalSeqId) {
        let ctx = Arc::clone(&self.core.ctx);
        let cache_mode = self.request.cache_mode;
        let seq_ids = [canonical.to_string()];
        let mut db_names = Vec::new();

        for name in self.names.clone() {
            if self.is_cdd(&name) {
                let cached = cache_mode
                    .use_cache()
                    .then(|| ctx.caches.cdd.find(&canonical.key()))
                    .flatten();
                if let Some(cdd) = cached {
                    ctx.counters.record_lookup(LookupKind::Cdd, DataSource::Cache);
                    self.send_records(&name, cdd.records);
                } else if cache_mode.use_db() {
                    self.fetched_cdd = Some(Vec::new());
                    self.core.fetches.start(
                        DbQuery::Cdd {
                            accession: canonical.accession.clone(),
                            version: canonical.version,
                            seq_id_type: canonical.seq_id_type,
                        },
                        FetchPurpose::Cdd,
                    );
                }
                continue;
            }

            let cached = cache_mode
                .use_cache()
                .then(|| ctx.caches.annot.find(&AnnotKey::new(name.as_str(), seq_ids.clone())))
                .flatten();
            match cached {
                Some(annot) => {
                    ctx.counters
                        .record_lookup(LookupKind::NamedAnnot, DataSource::Cache);
                    self.send_records(&name, annot.records);
                }
                None => db_names.push(name),
            }
        }

        if !db_names.is_empty() && cache_mode.use_db() {
            for keyspace in &ctx.config.db.annot_keyspaces {
                let query = DbQuery::NamedAnnots {
                    keyspace: keyspace.clone(),
                    accession: canonical.accession.clone(),
                    version: canonical.version,
                    seq_id_type: canonical.seq_id_type,
                    names: db_names.clone(),
                };
                self.core.fetches.start(
                    query,
                    FetchPurpose::NamedAnnots {
                        keyspace: keyspace.clone(),
                    },
                );
            }
            debug!(
                "Fetching {} annotation names from {} keyspaces",
                db_names.len(),
                ctx.config.db.annot_keyspaces.len()
            );
        }

        self.canonical = Some(canonical);
        self.try_finish();
    }

    fn send_records(&mut self, name: &str, records: Vec<NamedAnnotRecord>) {
        if records.is_empty() {
            return;
        }
        self.found.insert(name.to_string());
        for record in records {
            self.core.reply.data(ReplyItem::NamedAnnot(record));
        }
    }

    fn on_annot_event(&mut self, purpose: &FetchPurpose, event: FetchEvent) {
        match event {
            FetchEvent::Data {
                record: Some(DbRecord::NamedAnnot(record)),
                ..
            } => {
                let name = if *purpose == FetchPurpose::Cdd {
                    self.fetched_cdd.get_or_insert_with(Vec::new).push(record.clone());
                    self.core.ctx.config.db.cdd_annot_name.clone()
                } else {
                    self.fetched
                        .entry(record.annot_name.clone())
                        .or_default()
                        .push(record.clone());
                    record.annot_name.clone()
                };
                self.found.insert(name);
                self.core.reply.data(ReplyItem::NamedAnnot(record));
            }
            FetchEvent::Data {
                record: Some(other),
                ..
            } => warn!("Unexpected record for {:?}: {:?}", purpose, other),
            FetchEvent::Data { last: true, .. } => self.try_finish(),
            FetchEvent::Data { .. } | FetchEvent::Cancelled { .. } => {}
            FetchEvent::Error { error, .. } => {
                self.core.ctx.counters.record_db_error();
                self.error.get_or_insert(error.into());
                self.try_finish();
            }
        }
    }

    /// Finish once every annotation fetch has reported its last event
    fn try_finish(&mut self) {
        if !self.core.fetches.is_empty() || self.core.is_terminal() {
            return;
        }
        if let Some(err) = self.error.take() {
            self.core.fail(&err);
            return;
        }

        self.store_fetched();
        let missing: Vec<String> = self
            .names
            .iter()
            .filter(|name| !self.found.iter().any(|f| f.eq_ignore_ascii_case(name)))
            .cloned()
            .collect();
        for name in &missing {
            let err = GatewayError::AnnotationNotFound(name.clone());
            self.core.reply.message(ReplyMessage::from_error(&err));
        }

        if self.found.is_empty() {
            self.core.finish(ProcessorStatus::NotFound, 404);
        } else {
            self.core.complete();
        }
    }

    fn store_fetched(&mut self) {
        let Some(canonical) = &self.canonical else {
            return;
        };
        let ctx = &self.core.ctx;
        let seq_ids: BTreeSet<String> = [canonical.to_string()].into_iter().collect();

        for (name, records) in std::mem::take(&mut self.fetched) {
            ctx.counters
                .record_lookup(LookupKind::NamedAnnot, DataSource::Db);
            ctx.caches.annot.add(AnnotInfo {
                name,
                seq_ids: seq_ids.clone(),
                records,
            });
        }
        if let Some(records) = self.fetched_cdd.take() {
            if records.is_empty() {
                ctx.counters.record_lookup(LookupKind::Cdd, DataSource::NotFound);
            } else {
                ctx.counters.record_lookup(LookupKind::Cdd, DataSource::Db);
                ctx.caches.cdd.add(canonical.key(), CddInfo { records });
            }
        }
    }
}

fn dedup_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .filter(|name| !name.is_empty() && seen.insert(name.as_str()))
        .cloned()
        .collect()
}

impl Processor for AnnotProcessor {
    fn name(&self) -> &'static str {
        "get_na"
    }

    fn core(&self) -> &ProcessorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProcessorCore {
        &mut self.core
    }

    fn process(&mut self) {
        if self.names.is_empty() {
            let err = GatewayError::invalid_argument("no annotation names requested");
            self.core.fail(&err);
            return;
        }
        let seq_id = match ParsedSeqId::parse(&self.request.seq_id, self.request.seq_id_type) {
            Ok(seq_id) => seq_id,
            Err(e) => {
                self.core.fail(&e);
                return;
            }
        };
        let resolver = self.resolver.insert(Resolver::new(
            Arc::clone(&self.core.ctx),
            seq_id,
            self.request.cache_mode,
        ));
        let resolution = resolver.start(&mut self.core.fetches);
        self.on_resolution(resolution);
    }

    fn process_event(&mut self, event: FetchEvent) {
        let Some(purpose) = self.core.route(&event) else {
            return;
        };
        if Resolver::owns(&purpose) {
            let Some(resolver) = self.resolver.as_mut() else {
                return;
            };
            let resolution = resolver.on_event(&purpose, event, &mut self.core.fetches);
            self.on_resolution(resolution);
        } else {
            self.on_annot_event(&purpose, event);
        }
    }
}
