//! Get processor: resolve a seq-id, then deliver its blob

use crate::blob::{BlobProgress, BlobRetrieval};
use crate::processor::{Processor, ProcessorCore};
use crate::reply::ReplyItem;
use crate::request::GetRequest;
use crate::resolver::{Resolution, Resolver};
use seqgate_common::{BlobId, GatewayError, ParsedSeqId};
use seqgate_fetch::FetchEvent;
use std::sync::Arc;

pub struct GetProcessor {
    core: ProcessorCore,
    request: GetRequest,
    resolver: Option<Resolver>,
    blob: Option<BlobRetrieval>,
}

impl GetProcessor {
    pub const fn new(core: ProcessorCore, request: GetRequest) -> Self {
        Self {
            core,
            request,
            resolver: None,
            blob: None,
        }
    }

    fn on_resolution(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Pending => {}
            Resolution::Found(info) => {
                let blob_id = info.blob();
                self.core.reply.data(ReplyItem::BioseqInfo(info));
                match blob_id {
                    Some(blob_id) => self.start_blob(blob_id),
                    None => {
                        let err = GatewayError::BlobNotFound(format!(
                            "no blob for seq-id '{}'",
                            self.request.seq_id
                        ));
                        self.core.fail(&err);
                    }
                }
            }
            Resolution::NotFound => {
                if let Some(resolver) = &self.resolver {
                    let err = resolver.not_found_error();
                    self.core.fail(&err);
                }
            }
            Resolution::Failed(err) => self.core.fail(&err),
        }
    }

    fn start_blob(&mut self, blob_id: BlobId) {
        let core = &mut self.core;
        let blob = self.blob.insert(BlobRetrieval::new(
            Arc::clone(&core.ctx),
            blob_id,
            None,
            self.request.client_id.clone(),
            self.request.cache_mode,
        ));
        let progress = blob.start(&mut core.reply, &mut core.fetches);
        self.on_progress(progress);
    }

    fn on_progress(&mut self, progress: BlobProgress) {
        match progress {
            BlobProgress::Pending => {}
            BlobProgress::Done | BlobProgress::Excluded => self.core.complete(),
            BlobProgress::Failed(err) => self.core.fail(&err),
        }
    }
}

impl Processor for GetProcessor {
    fn name(&self) -> &'static str {
        "get"
    }

    fn core(&self) -> &ProcessorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProcessorCore {
        &mut self.core
    }

    fn process(&mut self) {
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
            if let Some(resolver) = self.resolver.as_mut() {
                let resolution = resolver.on_event(&purpose, event, &mut self.core.fetches);
                self.on_resolution(resolution);
            }
        } else if let Some(blob) = self.blob.as_mut() {
            let core = &mut self.core;
            let progress = blob.on_event(&purpose, event, &mut core.reply, &mut core.fetches);
            self.on_progress(progress);
        }
    }

    fn on_cancel(&mut self) {
        if let Some(blob) = self.blob.as_mut() {
            blob.abandon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ProcessorStatus;
    use crate::request::{CacheMode, Request};
    use crate::testing::{bioseq_info, blob_info, data_items, run_request, test_context, SinkCall};
    use bytes::Bytes;
    use seqgate_cache::ExcludeState;
    use seqgate_common::seq_id_type;
    use seqgate_fetch::MemoryDriver;

    fn get(seq_id: &str) -> Request {
        Request::Get(GetRequest {
            seq_id: seq_id.to_string(),
            seq_id_type: None,
            client_id: Some("client-g".to_string()),
            cache_mode: CacheMode::CacheThenDb,
        })
    }

    #[tokio::test]
    async fn test_resolve_then_blob() {
        let blob_id = BlobId::new(4, 100);
        let driver = Arc::new(MemoryDriver::new());
        driver.add_bioseq_info(bioseq_info("NC_000001", 11, seq_id_type::OTHER, 1));
        driver.add_blob_prop(blob_info(blob_id, 5_000, 1));
        driver.add_blob_chunks(blob_id, 5_000, vec![Bytes::from_static(b"payload")]);
        let ctx = test_context(Arc::clone(&driver));

        let (status, calls) = run_request(&ctx, get("NC_000001.11")).await;
        assert_eq!(status, ProcessorStatus::Done);

        let items = data_items(&calls);
        assert_eq!(items.len(), 3);
        assert!(matches!(&items[0], ReplyItem::BioseqInfo(info) if info.blob_id == "4.100"));
        assert!(matches!(&items[1], ReplyItem::BlobProp(_)));
        assert!(matches!(&items[2], ReplyItem::BlobChunk { chunk_no: 0, .. }));
        assert_eq!(
            ctx.exclude_blobs.state("client-g", blob_id),
            Some(ExcludeState::Completed)
        );
    }

    #[tokio::test]
    async fn test_missing_blob_after_resolution() {
        let driver = Arc::new(MemoryDriver::new());
        driver.add_bioseq_info(bioseq_info("NC_000001", 11, seq_id_type::OTHER, 1));
        let ctx = test_context(Arc::clone(&driver));

        let (status, calls) = run_request(&ctx, get("NC_000001")).await;
        assert_eq!(status, ProcessorStatus::NotFound);
        assert_eq!(data_items(&calls).len(), 1);
        assert!(calls.contains(&SinkCall::Completion(404)));
        assert_eq!(ctx.exclude_blobs.state("client-g", BlobId::new(4, 100)), None);
    }
}
