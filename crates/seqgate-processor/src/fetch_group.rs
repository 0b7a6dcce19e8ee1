//! Fetches owned by one processor

use crate::context::GatewayContext;
use seqgate_fetch::{DbQuery, FetchEvent, FetchId, FetchOptions, FetchTask};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What a fetch was started for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPurpose {
    /// Bioseq info by the requested accession
    BioseqInfo,
    /// Secondary id to canonical id
    Si2Csi,
    /// Bioseq info by a canonical id found through si2csi
    BioseqInfoByCanonical,
    BlobProp,
    BlobChunks,
    /// Named annotations in one keyspace
    NamedAnnots { keyspace: String },
    Cdd,
}

/// Spawns fetch tasks and tracks which of them are still outstanding.
///
/// Every task gets a child token of the group token, so cancelling the group
/// cancels all of them. A fetch stays outstanding until its terminal event
/// has been read.
pub struct FetchGroup {
    ctx: Arc<GatewayContext>,
    options: FetchOptions,
    events: mpsc::UnboundedSender<FetchEvent>,
    cancel: CancellationToken,
    next_id: FetchId,
    outstanding: HashMap<FetchId, FetchPurpose>,
}

impl FetchGroup {
    pub fn new(
        ctx: Arc<GatewayContext>,
        events: mpsc::UnboundedSender<FetchEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let options = ctx.fetch_options();
        Self {
            ctx,
            options,
            events,
            cancel,
            next_id: 1,
            outstanding: HashMap::new(),
        }
    }

    /// Spawn a fetch on the current runtime
    pub fn start(&mut self, query: DbQuery, purpose: FetchPurpose) -> FetchId {
        let id = self.next_id;
        self.next_id += 1;

        debug!("Starting fetch {} ({}) for {:?}", id, query.kind(), purpose);
        let task = FetchTask::new(
            id,
            query,
            Arc::clone(&self.ctx.driver),
            self.options,
            self.events.clone(),
            self.cancel.child_token(),
        );
        self.outstanding.insert(id, purpose);
        self.ctx.counters.record_fetch_started();
        tokio::spawn(task.run());
        id
    }

    /// Purpose of an outstanding fetch
    pub fn purpose(&self, id: FetchId) -> Option<&FetchPurpose> {
        self.outstanding.get(&id)
    }

    /// Mark a fetch as fully drained
    pub fn read_finished(&mut self, id: FetchId) -> Option<FetchPurpose> {
        self.outstanding.remove(&id)
    }

    /// Purpose of the event's fetch; a terminal event also retires the fetch.
    ///
    /// Events of unknown fetches yield `None`.
    pub fn route(&mut self, event: &FetchEvent) -> Option<FetchPurpose> {
        let id = event.fetch_id();
        if event.is_terminal() {
            self.read_finished(id)
        } else {
            self.purpose(id).cloned()
        }
    }

    /// Outstanding fetches with the given purpose
    pub fn count(&self, purpose: &FetchPurpose) -> usize {
        self.outstanding.values().filter(|p| *p == purpose).count()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    /// Cancel every fetch; they still report a terminal event
    pub fn cancel_all(&self) {
        if !self.outstanding.is_empty() {
            debug!("Cancelling {} outstanding fetches", self.outstanding.len());
        }
        self.cancel.cancel();
    }
}
