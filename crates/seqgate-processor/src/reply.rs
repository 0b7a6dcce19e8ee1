//! Reply side of a request
//!
//! Processors push records, messages and one completion into a
//! [`ReplySink`]. [`ReplyWriter`] sits in front of the sink and drops every
//! emission once the request is cancelled.

use bytes::Bytes;
use seqgate_common::{BioseqInfo, BlobId, BlobInfo, GatewayError, NamedAnnotRecord};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a blob was not sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcludeReason {
    /// Another request of the same client is delivering it
    InProgress,
    /// The client received it recently
    Sent,
}

/// One data item of a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyItem {
    BioseqInfo(BioseqInfo),
    BlobProp(BlobInfo),
    BlobChunk {
        blob_id: BlobId,
        chunk_no: i32,
        data: Bytes,
    },
    BlobExcluded {
        blob_id: BlobId,
        reason: ExcludeReason,
    },
    NamedAnnot(NamedAnnotRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Info,
    Warning,
    Error,
}

/// Status message attached to a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMessage {
    pub status: u16,
    pub severity: Severity,
    pub text: String,
}

impl ReplyMessage {
    pub fn new(status: u16, severity: Severity, text: impl Into<String>) -> Self {
        Self {
            status,
            severity,
            text: text.into(),
        }
    }

    pub fn from_error(err: &GatewayError) -> Self {
        let status = err.http_status_code();
        let severity = if err.is_not_found() {
            Severity::Warning
        } else {
            Severity::Error
        };
        Self::new(status, severity, err.to_string())
    }
}

/// Consumer of reply output (the transport side)
pub trait ReplySink: Send {
    fn prepare_data(&mut self, item: ReplyItem);
    fn prepare_message(&mut self, message: ReplyMessage);
    /// Terminal status of the reply stream; called at most once
    fn prepare_completion(&mut self, status: u16);
    /// Whether enough output is buffered to be worth a flush
    fn is_output_ready(&self) -> bool;
    fn flush(&mut self);
    /// Called exactly once, after the processor and all its fetches finished
    fn signal_processor_finished(&mut self);
}

/// One unit of buffered output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyFrame {
    Data(ReplyItem),
    Message(ReplyMessage),
    Completion(u16),
    Finished,
}

/// Sink that buffers frames and flushes them in batches to a channel
pub struct BufferedReply {
    buffer: Vec<ReplyFrame>,
    batch_size: usize,
    tx: mpsc::UnboundedSender<Vec<ReplyFrame>>,
}

impl BufferedReply {
    pub fn new(batch_size: usize) -> (Self, mpsc::UnboundedReceiver<Vec<ReplyFrame>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reply = Self {
            buffer: Vec::new(),
            batch_size: batch_size.max(1),
            tx,
        };
        (reply, rx)
    }

    fn push(&mut self, frame: ReplyFrame) {
        self.buffer.push(frame);
    }
}

impl ReplySink for BufferedReply {
    fn prepare_data(&mut self, item: ReplyItem) {
        self.push(ReplyFrame::Data(item));
    }

    fn prepare_message(&mut self, message: ReplyMessage) {
        self.push(ReplyFrame::Message(message));
    }

    fn prepare_completion(&mut self, status: u16) {
        self.push(ReplyFrame::Completion(status));
    }

    fn is_output_ready(&self) -> bool {
        self.buffer.len() >= self.batch_size
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.buffer);
        if self.tx.send(batch).is_err() {
            debug!("Reply receiver gone; dropping output");
        }
    }

    fn signal_processor_finished(&mut self) {
        self.push(ReplyFrame::Finished);
        self.flush();
    }
}

/// Cancellation-aware front of a [`ReplySink`]
pub struct ReplyWriter {
    sink: Box<dyn ReplySink>,
    cancel: CancellationToken,
    completed: bool,
    finished: bool,
}

impl ReplyWriter {
    pub fn new(sink: Box<dyn ReplySink>, cancel: CancellationToken) -> Self {
        Self {
            sink,
            cancel,
            completed: false,
            finished: false,
        }
    }

    fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && !self.completed
    }

    pub fn data(&mut self, item: ReplyItem) {
        if !self.is_open() {
            return;
        }
        self.sink.prepare_data(item);
        if self.sink.is_output_ready() {
            self.sink.flush();
        }
    }

    pub fn message(&mut self, message: ReplyMessage) {
        if !self.is_open() {
            return;
        }
        self.sink.prepare_message(message);
    }

    pub fn error(&mut self, err: &GatewayError) {
        self.message(ReplyMessage::from_error(err));
    }

    /// Emit the terminal status; later calls are ignored
    pub fn completion(&mut self, status: u16) {
        if !self.is_open() {
            return;
        }
        self.completed = true;
        self.sink.prepare_completion(status);
        self.sink.flush();
    }

    pub const fn is_completed(&self) -> bool {
        self.completed
    }

    /// Tell the sink the processor is done; only the first call reaches it
    pub fn signal_finished(&mut self) {
        if self.finished {
            warn!("Processor finished signalled twice");
            return;
        }
        self.finished = true;
        self.sink.signal_processor_finished();
    }
}
