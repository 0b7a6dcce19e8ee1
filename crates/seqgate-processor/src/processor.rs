//! Processor contract and the loop that drives it
//!
//! A processor is started once with [`Processor::process`], then fed the
//! events of the fetches it spawned. It may finish right away (everything
//! came from a cache) or after any number of fetches. [`drive`] signals the
//! reply sink exactly once, after the processor reached a terminal status
//! and every one of its fetches has reported its terminal event.

use crate::context::GatewayContext;
use crate::fetch_group::{FetchGroup, FetchPurpose};
use crate::metrics::RequestKind;
use crate::reply::{ReplySink, ReplyWriter};
use seqgate_common::GatewayError;
use seqgate_fetch::FetchEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Processor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorStatus {
    Created,
    Processing,
    Done,
    NotFound,
    Error,
    Cancelled,
}

impl ProcessorStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done | Self::NotFound | Self::Error | Self::Cancelled
        )
    }
}

/// State every processor carries
pub struct ProcessorCore {
    pub ctx: Arc<GatewayContext>,
    pub reply: ReplyWriter,
    pub fetches: FetchGroup,
    kind: RequestKind,
    status: ProcessorStatus,
    cancel: CancellationToken,
}

impl ProcessorCore {
    pub fn new(
        ctx: Arc<GatewayContext>,
        kind: RequestKind,
        sink: Box<dyn ReplySink>,
        events: mpsc::UnboundedSender<FetchEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reply: ReplyWriter::new(sink, cancel.clone()),
            fetches: FetchGroup::new(Arc::clone(&ctx), events, cancel.child_token()),
            ctx,
            kind,
            status: ProcessorStatus::Created,
            cancel,
        }
    }

    pub const fn kind(&self) -> RequestKind {
        self.kind
    }

    pub const fn status(&self) -> ProcessorStatus {
        self.status
    }

    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Terminal and no fetch left to drain
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal() && self.fetches.is_empty()
    }

    pub fn begin(&mut self) {
        if self.status == ProcessorStatus::Created {
            self.status = ProcessorStatus::Processing;
        }
    }

    /// Purpose of the event's fetch, or `None` if the event should be ignored.
    ///
    /// Terminal events retire their fetch even when ignored.
    pub fn route(&mut self, event: &FetchEvent) -> Option<FetchPurpose> {
        let purpose = self.fetches.route(event);
        if self.status.is_terminal() {
            return None;
        }
        purpose
    }

    pub fn complete(&mut self) {
        self.finish(ProcessorStatus::Done, 200);
    }

    /// Report `err` and finish with the matching status
    pub fn fail(&mut self, err: &GatewayError) {
        self.reply.error(err);
        let status = if err.is_not_found() {
            ProcessorStatus::NotFound
        } else {
            ProcessorStatus::Error
        };
        self.finish(status, err.http_status_code());
    }

    /// Move to a terminal status and emit the completion
    pub fn finish(&mut self, status: ProcessorStatus, code: u16) {
        if self.status.is_terminal() {
            return;
        }
        debug!("{} processor finished: {:?} ({})", self.kind.as_str(), status, code);
        self.status = status;
        self.reply.completion(code);
        self.ctx.counters.record_reply(self.kind, code);
        if !self.fetches.is_empty() {
            self.fetches.cancel_all();
        }
    }

    /// Cancel the request. Returns false if it had already finished.
    pub fn cancel(&mut self) -> bool {
        self.cancel.cancel();
        if self.status.is_terminal() {
            return false;
        }
        debug!(
            "{} processor cancelled with {} fetches outstanding",
            self.kind.as_str(),
            self.fetches.outstanding()
        );
        self.status = ProcessorStatus::Cancelled;
        self.ctx.counters.record_cancelled(self.kind);
        true
    }
}

/// One request being served
pub trait Processor: Send {
    fn name(&self) -> &'static str;

    fn core(&self) -> &ProcessorCore;

    fn core_mut(&mut self) -> &mut ProcessorCore;

    /// Start serving the request; called once
    fn process(&mut self);

    /// Handle one event of a fetch this processor started
    fn process_event(&mut self, event: FetchEvent);

    /// Undo side effects of an unfinished request
    fn on_cancel(&mut self) {}

    fn cancel(&mut self) {
        if self.core_mut().cancel() {
            self.on_cancel();
        }
    }

    fn status(&self) -> ProcessorStatus {
        self.core().status()
    }

    fn is_finished(&self) -> bool {
        self.core().is_finished()
    }
}

/// A processor together with its event stream and cancellation token
pub struct ProcessorHandle {
    processor: Box<dyn Processor>,
    events: mpsc::UnboundedReceiver<FetchEvent>,
    cancel: CancellationToken,
}

impl ProcessorHandle {
    pub fn new(
        processor: Box<dyn Processor>,
        events: mpsc::UnboundedReceiver<FetchEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            processor,
            events,
            cancel,
        }
    }

    pub fn name(&self) -> &'static str {
        self.processor.name()
    }

    /// Token that cancels the request (e.g. when the client goes away)
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Serve the request to the end
    pub async fn run(self) -> ProcessorStatus {
        drive(self.processor, self.events, self.cancel).await
    }
}

/// Run `processor` until it and all its fetches are finished
pub async fn drive(
    mut processor: Box<dyn Processor>,
    mut events: mpsc::UnboundedReceiver<FetchEvent>,
    cancel: CancellationToken,
) -> ProcessorStatus {
    let mut cancel_seen = cancel.is_cancelled();
    if cancel_seen {
        processor.cancel();
    } else {
        processor.core_mut().begin();
        processor.process();
    }

    while !processor.is_finished() {
        tokio::select! {
            biased;
            () = cancel.cancelled(), if !cancel_seen => {
                cancel_seen = true;
                processor.cancel();
            }
            event = events.recv() => match event {
                Some(event) => processor.process_event(event),
                None => {
                    warn!("{} processor lost its fetch events", processor.name());
                    break;
                }
            }
        }
    }

    processor.core_mut().reply.signal_finished();
    processor.status()
}
