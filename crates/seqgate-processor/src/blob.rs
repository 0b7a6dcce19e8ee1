//! Blob retrieval shared by the get-blob and get processors
//!
//! With a client id the blob is first registered in the exclude-blob cache.
//! The registration is marked completed once the last chunk went out and is
//! rolled back on every other way out (not found, error, cancel).

use crate::context::GatewayContext;
use crate::fetch_group::{FetchGroup, FetchPurpose};
use crate::metrics::{DataSource, LookupKind};
use crate::reply::{ExcludeReason, ReplyItem, ReplyWriter};
use crate::request::CacheMode;
use seqgate_cache::ExcludeAddResult;
use seqgate_common::{BlobId, BlobInfo, GatewayError};
use seqgate_fetch::{DbQuery, DbRecord, FetchEvent};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a blob retrieval stands after a step
#[derive(Debug)]
pub enum BlobProgress {
    Pending,
    /// Properties and every chunk were sent
    Done,
    /// Skipped because of the exclude-blob cache
    Excluded,
    Failed(GatewayError),
}

pub struct BlobRetrieval {
    ctx: Arc<GatewayContext>,
    blob_id: BlobId,
    last_modified: Option<i64>,
    client_id: Option<String>,
    cache_mode: CacheMode,
    registered: bool,
    completed: bool,
    /// First (newest) properties row of the fetch in flight
    fetched_props: Option<BlobInfo>,
    expected_chunks: i32,
    received_chunks: i32,
}

impl BlobRetrieval {
    pub fn new(
        ctx: Arc<GatewayContext>,
        blob_id: BlobId,
        last_modified: Option<i64>,
        client_id: Option<String>,
        cache_mode: CacheMode,
    ) -> Self {
        Self {
            ctx,
            blob_id,
            last_modified,
            client_id,
            cache_mode,
            registered: false,
            completed: false,
            fetched_props: None,
            expected_chunks: 0,
            received_chunks: 0,
        }
    }

    pub const fn blob_id(&self) -> BlobId {
        self.blob_id
    }

    pub const fn owns(purpose: &FetchPurpose) -> bool {
        matches!(purpose, FetchPurpose::BlobProp | FetchPurpose::BlobChunks)
    }

    pub fn start(&mut self, reply: &mut ReplyWriter, fetches: &mut FetchGroup) -> BlobProgress {
        if let Some(client) = &self.client_id {
            let reason = match self.ctx.exclude_blobs.add(client, self.blob_id) {
                ExcludeAddResult::Added => None,
                ExcludeAddResult::InProgress => Some(ExcludeReason::InProgress),
                ExcludeAddResult::AlreadySent => Some(ExcludeReason::Sent),
            };
            if let Some(reason) = reason {
                debug!("Blob {} excluded for client {}: {:?}", self.blob_id, client, reason);
                self.ctx.counters.record_blob_excluded();
                reply.data(ReplyItem::BlobExcluded {
                    blob_id: self.blob_id,
                    reason,
                });
                return BlobProgress::Excluded;
            }
            self.registered = true;
        }

        if self.cache_mode.use_cache() {
            if let Some((info, source)) = self.lookup_caches() {
                self.ctx.counters.record_lookup(LookupKind::BlobProp, source);
                return self.send_props(info, reply, fetches);
            }
        }
        if !self.cache_mode.use_db() {
            return self.not_found();
        }

        let query = DbQuery::BlobProp {
            blob_id: self.blob_id,
            last_modified: self.last_modified,
        };
        fetches.start(query, FetchPurpose::BlobProp);
        BlobProgress::Pending
    }

    pub fn on_event(
        &mut self,
        purpose: &FetchPurpose,
        event: FetchEvent,
        reply: &mut ReplyWriter,
        fetches: &mut FetchGroup,
    ) -> BlobProgress {
        match event {
            FetchEvent::Data {
                record: Some(DbRecord::BlobProp(info)),
                ..
            } => {
                if self.fetched_props.is_none() {
                    self.fetched_props = Some(info);
                }
                BlobProgress::Pending
            }
            FetchEvent::Data {
                record: Some(DbRecord::BlobChunk {
                    blob_id,
                    chunk_no,
                    data,
                }),
                ..
            } => {
                self.received_chunks += 1;
                reply.data(ReplyItem::BlobChunk {
                    blob_id,
                    chunk_no,
                    data,
                });
                BlobProgress::Pending
            }
            FetchEvent::Data {
                record: Some(other),
                ..
            } => {
                warn!("Unexpected record during blob retrieval: {:?}", other);
                BlobProgress::Pending
            }
            FetchEvent::Data { last: true, .. } => match purpose {
                FetchPurpose::BlobProp => self.props_fetched(reply, fetches),
                FetchPurpose::BlobChunks => self.chunks_fetched(),
                _ => BlobProgress::Pending,
            },
            FetchEvent::Data { .. } | FetchEvent::Cancelled { .. } => BlobProgress::Pending,
            FetchEvent::Error { error, .. } => {
                self.ctx.counters.record_db_error();
                self.abandon();
                BlobProgress::Failed(error.into())
            }
        }
    }

    /// Roll back the exclude-blob registration unless the blob was delivered
    pub fn abandon(&mut self) {
        if !self.registered || self.completed {
            return;
        }
        if let Some(client) = &self.client_id {
            self.ctx.exclude_blobs.remove(client, self.blob_id);
            debug!("Rolled back blob {} for client {}", self.blob_id, client);
        }
        self.registered = false;
    }

    fn lookup_caches(&self) -> Option<(BlobInfo, DataSource)> {
        if let Some(info) = self.ctx.caches.blob_prop.find(self.blob_id, self.last_modified) {
            return Some((info, DataSource::Cache));
        }
        let info = self
            .ctx
            .kv_cache
            .lookup_blob_prop(self.blob_id, self.last_modified)?;
        self.ctx
            .caches
            .blob_prop
            .add(info.clone(), self.last_modified.is_none());
        Some((info, DataSource::KvCache))
    }

    fn props_fetched(&mut self, reply: &mut ReplyWriter, fetches: &mut FetchGroup) -> BlobProgress {
        match self.fetched_props.take() {
            Some(info) => {
                self.ctx
                    .counters
                    .record_lookup(LookupKind::BlobProp, DataSource::Db);
                self.ctx
                    .caches
                    .blob_prop
                    .add(info.clone(), self.last_modified.is_none());
                self.send_props(info, reply, fetches)
            }
            None => self.not_found(),
        }
    }

    fn send_props(
        &mut self,
        info: BlobInfo,
        reply: &mut ReplyWriter,
        fetches: &mut FetchGroup,
    ) -> BlobProgress {
        let last_modified = info.last_modified;
        self.expected_chunks = info.n_chunks;
        reply.data(ReplyItem::BlobProp(info));

        if self.expected_chunks <= 0 {
            return self.delivered();
        }
        let query = DbQuery::BlobChunks {
            blob_id: self.blob_id,
            last_modified,
        };
        fetches.start(query, FetchPurpose::BlobChunks);
        BlobProgress::Pending
    }

    fn chunks_fetched(&mut self) -> BlobProgress {
        if self.received_chunks < self.expected_chunks {
            self.abandon();
            return BlobProgress::Failed(GatewayError::database(format!(
                "blob {} returned {} of {} chunks",
                self.blob_id, self.received_chunks, self.expected_chunks
            )));
        }
        self.delivered()
    }

    fn delivered(&mut self) -> BlobProgress {
        if let Some(client) = &self.client_id {
            if self.registered {
                self.ctx.exclude_blobs.set_completed(client, self.blob_id, true);
            }
        }
        self.completed = true;
        BlobProgress::Done
    }

    fn not_found(&mut self) -> BlobProgress {
        self.ctx
            .counters
            .record_lookup(LookupKind::BlobProp, DataSource::NotFound);
        self.abandon();
        BlobProgress::Failed(GatewayError::BlobNotFound(self.blob_id.to_string()))
    }
}
