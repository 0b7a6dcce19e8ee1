//! Processor construction and dispatch

use crate::annot::AnnotProcessor;
use crate::context::GatewayContext;
use crate::get::GetProcessor;
use crate::get_blob::GetBlobProcessor;
use crate::processor::{Processor, ProcessorCore, ProcessorHandle, ProcessorStatus};
use crate::reply::ReplySink;
use crate::request::Request;
use crate::resolve::ResolveProcessor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Builds the processor variant for a request
#[derive(Clone)]
pub struct ProcessorFactory {
    ctx: Arc<GatewayContext>,
}

impl ProcessorFactory {
    pub const fn new(ctx: Arc<GatewayContext>) -> Self {
        Self { ctx }
    }

    pub const fn context(&self) -> &Arc<GatewayContext> {
        &self.ctx
    }

    pub fn create(&self, request: Request, sink: Box<dyn ReplySink>) -> ProcessorHandle {
        self.create_with_token(request, sink, CancellationToken::new())
    }

    /// Like [`Self::create`], cancelled through `cancel`
    pub fn create_with_token(
        &self,
        request: Request,
        sink: Box<dyn ReplySink>,
        cancel: CancellationToken,
    ) -> ProcessorHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let core = ProcessorCore::new(
            Arc::clone(&self.ctx),
            request.kind(),
            sink,
            events_tx,
            cancel.clone(),
        );
        let processor: Box<dyn Processor> = match request {
            Request::Resolve(req) => Box::new(ResolveProcessor::new(core, req)),
            Request::GetBlob(req) => Box::new(GetBlobProcessor::new(core, req)),
            Request::NamedAnnot(req) => Box::new(AnnotProcessor::new(core, req)),
            Request::Get(req) => Box::new(GetProcessor::new(core, req)),
        };
        debug!("Created {} processor", processor.name());
        ProcessorHandle::new(processor, events_rx, cancel)
    }
}

/// Runs each request on its own task
pub struct Dispatcher {
    factory: ProcessorFactory,
    shutdown: CancellationToken,
    active: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(factory: ProcessorFactory) -> Self {
        Self {
            factory,
            shutdown: CancellationToken::new(),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawn a processor for `request`. The returned token cancels just this
    /// request.
    pub fn dispatch(
        &self,
        request: Request,
        sink: Box<dyn ReplySink>,
    ) -> (CancellationToken, JoinHandle<ProcessorStatus>) {
        let handle = self
            .factory
            .create_with_token(request, sink, self.shutdown.child_token());
        let cancel = handle.cancel_token();
        let active = Arc::clone(&self.active);
        active.fetch_add(1, Ordering::Relaxed);

        let task = tokio::spawn(async move {
            let status = handle.run().await;
            active.fetch_sub(1, Ordering::Relaxed);
            status
        });
        (cancel, task)
    }

    /// Requests still running
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Cancel every running request
    pub fn shutdown(&self) {
        info!("Cancelling {} active requests", self.active());
        self.shutdown.cancel();
    }
}
