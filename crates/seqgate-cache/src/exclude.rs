//! Per-client blob exclusion
//!
//! Remembers which blobs each client has been sent (or is being sent) in
//! the current session so the same blob is not fetched and delivered twice.
//! A blob is registered before its fetch starts, marked completed when the
//! stream finishes, and removed again if the fetch is abandoned.

use dashmap::DashMap;
use seqgate_common::config::ExcludeBlobConfig;
use seqgate_common::BlobId;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of registering a blob for a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcludeAddResult {
    /// Newly registered; the caller owns the delivery
    Added,
    /// Another request for the same client is still delivering it
    InProgress,
    /// Delivered recently; skip it
    AlreadySent,
}

/// Delivery state of a registered blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcludeState {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy)]
struct ExcludedBlob {
    state: ExcludeState,
    /// Registration time while pending, completion time once completed
    since: Instant,
}

#[derive(Debug)]
struct ClientBlobs {
    blobs: HashMap<BlobId, ExcludedBlob>,
    /// Registration order, oldest first
    order: VecDeque<BlobId>,
    last_touch: Instant,
}

impl ClientBlobs {
    fn new(now: Instant) -> Self {
        Self {
            blobs: HashMap::new(),
            order: VecDeque::new(),
            last_touch: now,
        }
    }

    fn forget(&mut self, blob_id: BlobId) -> bool {
        if self.blobs.remove(&blob_id).is_some() {
            self.order.retain(|b| *b != blob_id);
            true
        } else {
            false
        }
    }

    /// Drop the oldest completed blob. Pending blobs are never evicted.
    fn evict_oldest_completed(&mut self) -> Option<BlobId> {
        let pos = self.order.iter().position(|id| {
            self.blobs
                .get(id)
                .is_some_and(|b| b.state == ExcludeState::Completed)
        })?;
        let blob_id = self.order.remove(pos)?;
        self.blobs.remove(&blob_id);
        Some(blob_id)
    }
}

/// Exclude-blob ledger shared by all processors
pub struct ExcludeBlobCache {
    clients: DashMap<String, ClientBlobs>,
    max_blobs_per_client: usize,
    resend_after: Duration,
    inactivity_purge: Duration,
}

impl ExcludeBlobCache {
    pub fn new(config: &ExcludeBlobConfig) -> Self {
        Self {
            clients: DashMap::new(),
            max_blobs_per_client: config.max_blobs_per_client,
            resend_after: config.resend_after(),
            inactivity_purge: config.inactivity_purge(),
        }
    }

    /// Register `blob_id` for `client`
    pub fn add(&self, client: &str, blob_id: BlobId) -> ExcludeAddResult {
        self.add_at(client, blob_id, Instant::now())
    }

    pub fn add_at(&self, client: &str, blob_id: BlobId, now: Instant) -> ExcludeAddResult {
        let mut entry = self
            .clients
            .entry(client.to_string())
            .or_insert_with(|| ClientBlobs::new(now));
        entry.last_touch = now;

        if let Some(existing) = entry.blobs.get_mut(&blob_id) {
            match existing.state {
                ExcludeState::Pending => return ExcludeAddResult::InProgress,
                ExcludeState::Completed
                    if now.saturating_duration_since(existing.since) < self.resend_after =>
                {
                    return ExcludeAddResult::AlreadySent;
                }
                ExcludeState::Completed => {
                    existing.state = ExcludeState::Pending;
                    existing.since = now;
                    return ExcludeAddResult::Added;
                }
            }
        }

        entry.blobs.insert(
            blob_id,
            ExcludedBlob {
                state: ExcludeState::Pending,
                since: now,
            },
        );
        entry.order.push_back(blob_id);

        // Only pending blobs left: the cap is exceeded until they complete
        while entry.blobs.len() > self.max_blobs_per_client {
            if entry.evict_oldest_completed().is_none() {
                break;
            }
        }
        ExcludeAddResult::Added
    }

    /// Mark a registered blob as delivered (or back to pending).
    ///
    /// Returns false if the blob is not registered for the client.
    pub fn set_completed(&self, client: &str, blob_id: BlobId, completed: bool) -> bool {
        self.set_completed_at(client, blob_id, completed, Instant::now())
    }

    pub fn set_completed_at(
        &self,
        client: &str,
        blob_id: BlobId,
        completed: bool,
        now: Instant,
    ) -> bool {
        let Some(mut entry) = self.clients.get_mut(client) else {
            return false;
        };
        entry.last_touch = now;
        let Some(blob) = entry.blobs.get_mut(&blob_id) else {
            return false;
        };
        blob.state = if completed {
            ExcludeState::Completed
        } else {
            ExcludeState::Pending
        };
        blob.since = now;
        true
    }

    /// Roll back a registration
    pub fn remove(&self, client: &str, blob_id: BlobId) -> bool {
        self.clients
            .get_mut(client)
            .is_some_and(|mut entry| entry.forget(blob_id))
    }

    pub fn state(&self, client: &str, blob_id: BlobId) -> Option<ExcludeState> {
        self.clients
            .get(client)
            .and_then(|entry| entry.blobs.get(&blob_id).map(|b| b.state))
    }

    /// Blobs a client has been sent, as a request's exclude list
    pub fn completed_blobs(&self, client: &str) -> Vec<BlobId> {
        self.clients
            .get(client)
            .map(|entry| {
                entry
                    .order
                    .iter()
                    .filter(|id| {
                        entry
                            .blobs
                            .get(id)
                            .is_some_and(|b| b.state == ExcludeState::Completed)
                    })
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Forget clients that have been idle for longer than the inactivity limit
    pub fn purge_inactive(&self) -> usize {
        self.purge_inactive_at(Instant::now())
    }

    pub fn purge_inactive_at(&self, now: Instant) -> usize {
        let before = self.clients.len();
        self.clients.retain(|_, entry| {
            now.saturating_duration_since(entry.last_touch) <= self.inactivity_purge
        });
        let purged = before.saturating_sub(self.clients.len());
        if purged > 0 {
            debug!("Purged {} inactive exclude-blob clients", purged);
        }
        purged
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
