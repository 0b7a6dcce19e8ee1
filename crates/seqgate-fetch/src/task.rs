//! Fetch task state machine
//!
//! A [`FetchTask`] runs one query against a [`DbDriver`] and reports what it
//! finds as [`FetchEvent`]s on a channel owned by the requesting processor.
//!
//! ```text
//!   Init ──► FetchStarted ──► Done
//!     │           │
//!     └───────────┴─────────► Error
//!     (cancellation from any non-terminal state) ──► Cancelled
//! ```
//!
//! Per task the events are, in order: one `Data` per record, then exactly one
//! terminal event (`Data { last: true }`, `Error` or `Cancelled`).
//! Cancellation is checked before every event is sent.

use crate::driver::{DbDriver, DbError, DbQuery, DbRecord};
use bytes::Bytes;
use seqgate_common::config::DbConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Identifies a fetch within its processor
pub type FetchId = u64;

/// Fetch task state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchState {
    Init,
    FetchStarted,
    Done,
    Error,
    Cancelled,
}

impl FetchState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }
}

/// Message from a fetch task to its processor
#[derive(Clone, Debug)]
pub enum FetchEvent {
    /// A record, or the terminal `last` marker (which carries no record)
    Data {
        fetch_id: FetchId,
        record: Option<DbRecord>,
        last: bool,
    },
    /// Terminal failure after retries were spent
    Error { fetch_id: FetchId, error: DbError },
    /// Terminal drain marker after cancellation
    Cancelled { fetch_id: FetchId },
}

impl FetchEvent {
    #[must_use]
    pub const fn fetch_id(&self) -> FetchId {
        match self {
            Self::Data { fetch_id, .. } | Self::Error { fetch_id, .. } | Self::Cancelled { fetch_id } => {
                *fetch_id
            }
        }
    }

    /// Whether this is the last event of its fetch
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        match self {
            Self::Data { last, .. } => *last,
            Self::Error { .. } | Self::Cancelled { .. } => true,
        }
    }
}

/// Per-task limits
#[derive(Clone, Copy, Debug)]
pub struct FetchOptions {
    /// Bound on each driver call
    pub timeout: Duration,
    /// Retries after the first attempt of each page, for transient errors only
    pub max_retries: u32,
    pub page_size: usize,
}

impl From<&DbConfig> for FetchOptions {
    fn from(config: &DbConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_retries: config.max_retries,
            page_size: config.page_size.max(1),
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&DbConfig::default())
    }
}

/// One outstanding database operation
pub struct FetchTask {
    id: FetchId,
    query: DbQuery,
    driver: Arc<dyn DbDriver>,
    options: FetchOptions,
    state: FetchState,
    retries: u32,
    /// Retries spent on the page in flight
    page_retries: u32,
    paging_state: Option<Bytes>,
    last_error: Option<DbError>,
    events: mpsc::UnboundedSender<FetchEvent>,
    cancel: CancellationToken,
}

impl FetchTask {
    pub fn new(
        id: FetchId,
        query: DbQuery,
        driver: Arc<dyn DbDriver>,
        options: FetchOptions,
        events: mpsc::UnboundedSender<FetchEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            query,
            driver,
            options,
            state: FetchState::Init,
            retries: 0,
            page_retries: 0,
            paging_state: None,
            last_error: None,
            events,
            cancel,
        }
    }

    pub const fn id(&self) -> FetchId {
        self.id
    }

    pub const fn query(&self) -> &DbQuery {
        &self.query
    }

    pub const fn state(&self) -> FetchState {
        self.state
    }

    /// Retries spent so far
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    pub const fn last_error(&self) -> Option<&DbError> {
        self.last_error.as_ref()
    }

    pub const fn has_error(&self) -> bool {
        self.last_error.is_some()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation; safe to call any number of times
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drive the task to a terminal state
    pub async fn run(mut self) -> FetchState {
        while !self.state.is_terminal() {
            self.wait().await;
        }
        self.state
    }

    /// Advance one step: one driver call, then dispatch of its results.
    pub async fn wait(&mut self) -> FetchState {
        if self.state.is_terminal() {
            return self.state;
        }
        if self.cancel.is_cancelled() {
            return self.finish_cancelled();
        }

        let driver = Arc::clone(&self.driver);
        let cancel = self.cancel.clone();
        let call = driver.fetch_page(&self.query, self.paging_state.clone(), self.options.page_size);
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            r = tokio::time::timeout(self.options.timeout, call) => Some(r),
        };
        let Some(result) = outcome else {
            return self.finish_cancelled();
        };
        let result = result.unwrap_or(Err(DbError::Timeout(self.options.timeout)));

        match result {
            Ok(page) => {
                self.state = FetchState::FetchStarted;
                self.page_retries = 0;
                let exhausted = page.paging_state.is_none();
                self.paging_state = page.paging_state;
                for record in page.records {
                    if !self.emit(FetchEvent::Data {
                        fetch_id: self.id,
                        record: Some(record),
                        last: false,
                    }) {
                        return self.finish_cancelled();
                    }
                }
                if exhausted {
                    if !self.emit(FetchEvent::Data {
                        fetch_id: self.id,
                        record: None,
                        last: true,
                    }) {
                        return self.finish_cancelled();
                    }
                    self.state = FetchState::Done;
                }
            }
            Err(e) if e.is_retryable() && self.page_retries < self.options.max_retries => {
                self.retries += 1;
                self.page_retries += 1;
                warn!(
                    "Fetch {} ({}) failed, retry {}/{}: {}",
                    self.id,
                    self.query.kind(),
                    self.page_retries,
                    self.options.max_retries,
                    e
                );
                self.last_error = Some(e);
            }
            Err(e) => {
                error!("Fetch {} ({}) failed: {}", self.id, self.query.kind(), e);
                self.last_error = Some(e.clone());
                if !self.emit(FetchEvent::Error {
                    fetch_id: self.id,
                    error: e,
                }) {
                    return self.finish_cancelled();
                }
                self.state = FetchState::Error;
            }
        }
        self.state
    }

    /// Send an event unless cancelled. A closed channel counts as cancellation.
    fn emit(&self, event: FetchEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if self.events.send(event).is_err() {
            debug!("Fetch {} receiver gone; cancelling", self.id);
            self.cancel.cancel();
            return false;
        }
        true
    }

    fn finish_cancelled(&mut self) -> FetchState {
        debug!("Fetch {} ({}) cancelled", self.id, self.query.kind());
        self.state = FetchState::Cancelled;
        let _ = self.events.send(FetchEvent::Cancelled { fetch_id: self.id });
        self.state
    }
}
