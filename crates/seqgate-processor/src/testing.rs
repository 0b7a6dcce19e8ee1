//! Test fixtures shared by the processor tests

use crate::context::GatewayContext;
use crate::factory::ProcessorFactory;
use crate::processor::{ProcessorHandle, ProcessorStatus};
use crate::reply::{ReplyItem, ReplyMessage, ReplySink};
use crate::request::Request;
use bytes::Bytes;
use parking_lot::Mutex;
use seqgate_common::{
    seq_id_type, BioseqInfo, BlobId, BlobInfo, CanonicalSeqId, GatewayConfig, IncludeInfo,
    NamedAnnotRecord,
};
use seqgate_fetch::MemoryDriver;
use seqgate_kvcache::LocalKvCache;
use std::collections::BTreeSet;
use std::sync::Arc;

/// What a [`RecordingSink`] saw; flushes are not recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Data(ReplyItem),
    Message(ReplyMessage),
    Completion(u16),
    Finished,
}

pub struct RecordingSink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
}

impl RecordingSink {
    pub fn new() -> (Self, Arc<Mutex<Vec<SinkCall>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl ReplySink for RecordingSink {
    fn prepare_data(&mut self, item: ReplyItem) {
        self.calls.lock().push(SinkCall::Data(item));
    }

    fn prepare_message(&mut self, message: ReplyMessage) {
        self.calls.lock().push(SinkCall::Message(message));
    }

    fn prepare_completion(&mut self, status: u16) {
        self.calls.lock().push(SinkCall::Completion(status));
    }

    fn is_output_ready(&self) -> bool {
        false
    }

    fn flush(&mut self) {}

    fn signal_processor_finished(&mut self) {
        self.calls.lock().push(SinkCall::Finished);
    }
}

/// Context over `driver` with the persistent cache disabled
pub fn test_context(driver: Arc<MemoryDriver>) -> Arc<GatewayContext> {
    test_context_with(GatewayConfig::default(), driver)
}

pub fn test_context_with(mut config: GatewayConfig, driver: Arc<MemoryDriver>) -> Arc<GatewayContext> {
    config.db.timeout_ms = 1_000;
    Arc::new(GatewayContext::with_kv_cache(
        config,
        LocalKvCache::disabled(),
        driver,
    ))
}

pub fn start_request(
    ctx: &Arc<GatewayContext>,
    request: Request,
) -> (ProcessorHandle, Arc<Mutex<Vec<SinkCall>>>) {
    let (sink, calls) = RecordingSink::new();
    let handle = ProcessorFactory::new(Arc::clone(ctx)).create(request, Box::new(sink));
    (handle, calls)
}

pub async fn run_request(
    ctx: &Arc<GatewayContext>,
    request: Request,
) -> (ProcessorStatus, Vec<SinkCall>) {
    let (handle, calls) = start_request(ctx, request);
    let status = handle.run().await;
    let calls = calls.lock().clone();
    (status, calls)
}

pub fn data_items(calls: &[SinkCall]) -> Vec<ReplyItem> {
    calls
        .iter()
        .filter_map(|call| match call {
            SinkCall::Data(item) => Some(item.clone()),
            _ => None,
        })
        .collect()
}

pub fn bioseq_info(accession: &str, version: i32, seq_type: i16, gi: i64) -> BioseqInfo {
    BioseqInfo {
        request_id: String::new(),
        canonical: CanonicalSeqId::new(accession, version, seq_type, gi),
        mol: 1,
        length: 248_956_422,
        state: 10,
        seq_state: 10,
        tax_id: 9606,
        hash: -1_001_566_593,
        date_changed: 1_541_548_800_000,
        seq_ids: BTreeSet::from([(seq_id_type::GI, gi.to_string())]),
        blob_id: "4.100".to_string(),
        include: IncludeInfo::ALL,
    }
}

pub fn blob_info(blob_id: BlobId, last_modified: i64, n_chunks: i32) -> BlobInfo {
    BlobInfo {
        blob_id,
        last_modified,
        flags: 0,
        size: 64,
        size_unpacked: 128,
        n_chunks,
        id2_info: String::new(),
    }
}

pub fn annot_record(name: &str, accession: &str, version: i32, start: i32) -> NamedAnnotRecord {
    NamedAnnotRecord {
        annot_name: name.to_string(),
        accession: accession.to_string(),
        version,
        seq_id_type: seq_id_type::OTHER,
        blob_id: BlobId::new(26, start),
        last_modified: 1_000,
        start,
        stop: start + 100,
        annot_info: Bytes::from(format!("annot {name}")),
    }
}
