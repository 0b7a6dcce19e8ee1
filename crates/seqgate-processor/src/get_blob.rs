//! Get-blob processor: blob properties and chunks by blob id

use crate::blob::{BlobProgress, BlobRetrieval};
use crate::processor::{Processor, ProcessorCore};
use crate::request::GetBlobRequest;
use seqgate_fetch::FetchEvent;
use std::sync::Arc;

pub struct GetBlobProcessor {
    core: ProcessorCore,
    blob: BlobRetrieval,
}

impl GetBlobProcessor {
    pub fn new(core: ProcessorCore, request: GetBlobRequest) -> Self {
        let blob = BlobRetrieval::new(
            Arc::clone(&core.ctx),
            request.blob_id,
            request.last_modified,
            request.client_id,
            request.cache_mode,
        );
        Self { core, blob }
    }

    fn on_progress(&mut self, progress: BlobProgress) {
        match progress {
            BlobProgress::Pending => {}
            BlobProgress::Done | BlobProgress::Excluded => self.core.complete(),
            BlobProgress::Failed(err) => self.core.fail(&err),
        }
    }
}

impl Processor for GetBlobProcessor {
    fn name(&self) -> &'static str {
        "getblob"
    }

    fn core(&self) -> &ProcessorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProcessorCore {
        &mut self.core
    }

    fn process(&mut self) {
        let core = &mut self.core;
        let progress = self.blob.start(&mut core.reply, &mut core.fetches);
        self.on_progress(progress);
    }

    fn process_event(&mut self, event: FetchEvent) {
        let Some(purpose) = self.core.route(&event) else {
            return;
        };
        let core = &mut self.core;
        let progress = self
            .blob
            .on_event(&purpose, event, &mut core.reply, &mut core.fetches);
        self.on_progress(progress);
    }

    fn on_cancel(&mut self) {
        self.blob.abandon();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ProcessorStatus;
    use crate::reply::{ExcludeReason, ReplyItem};
    use crate::request::{CacheMode, Request};
    use crate::testing::{
        blob_info, data_items, run_request, start_request, test_context, test_context_with,
        SinkCall,
    };
    use seqgate_common::GatewayConfig;
    use bytes::Bytes;
    use seqgate_cache::ExcludeState;
    use seqgate_common::BlobId;
    use seqgate_fetch::{DbError, MemoryDriver};
    use std::time::Duration;

    const BLOB: BlobId = BlobId::new(4, 100);

    fn get_blob(client: Option<&str>, cache_mode: CacheMode) -> Request {
        Request::GetBlob(GetBlobRequest {
            blob_id: BLOB,
            last_modified: None,
            client_id: client.map(str::to_string),
            cache_mode,
        })
    }

    fn driver_with_blob() -> Arc<MemoryDriver> {
        let driver = Arc::new(MemoryDriver::new());
        driver.add_blob_prop(blob_info(BLOB, 1_000, 2));
        driver.add_blob_prop(blob_info(BLOB, 2_000, 2));
        driver.add_blob_chunks(
            BLOB,
            2_000,
            vec![Bytes::from_static(b"chunk-0"), Bytes::from_static(b"chunk-1")],
        );
        driver
    }

    #[tokio::test]
    async fn test_newest_blob_with_chunks() {
        let driver = driver_with_blob();
        let ctx = test_context(Arc::clone(&driver));

        let (status, calls) = run_request(&ctx, get_blob(Some("client-a"), CacheMode::CacheThenDb)).await;
        assert_eq!(status, ProcessorStatus::Done);

        let items = data_items(&calls);
        assert_eq!(items.len(), 3);
        assert!(matches!(&items[0], ReplyItem::BlobProp(info) if info.last_modified == 2_000));
        assert!(matches!(&items[1], ReplyItem::BlobChunk { chunk_no: 0, .. }));
        assert!(matches!(&items[2], ReplyItem::BlobChunk { chunk_no: 1, data, .. } if data.as_ref() == b"chunk-1"));
        assert_eq!(
            ctx.exclude_blobs.state("client-a", BLOB),
            Some(ExcludeState::Completed)
        );

        // Properties now come from the cache; chunks always from the database
        let (status, _) = run_request(&ctx, get_blob(None, CacheMode::CacheThenDb)).await;
        assert_eq!(status, ProcessorStatus::Done);
        assert_eq!(driver.calls("blob_prop"), 1);
        assert_eq!(driver.calls("blob_chunks"), 2);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_is_excluded() {
        let driver = driver_with_blob();
        driver.set_delay(Duration::from_millis(50));
        let ctx = test_context(Arc::clone(&driver));

        let (first, first_calls) = start_request(&ctx, get_blob(Some("client-c"), CacheMode::CacheThenDb));
        let first = tokio::spawn(first.run());
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (status, calls) = run_request(&ctx, get_blob(Some("client-c"), CacheMode::CacheThenDb)).await;
        assert_eq!(status, ProcessorStatus::Done);
        assert_eq!(
            data_items(&calls),
            vec![ReplyItem::BlobExcluded {
                blob_id: BLOB,
                reason: ExcludeReason::InProgress,
            }]
        );

        assert_eq!(first.await.unwrap(), ProcessorStatus::Done);
        assert_eq!(data_items(&first_calls.lock()).len(), 3);
        assert_eq!(ctx.counters.blobs_excluded(), 1);

        let (_, calls) = run_request(&ctx, get_blob(Some("client-c"), CacheMode::CacheThenDb)).await;
        assert_eq!(data_items(&calls).len(), 3);
    }

    #[tokio::test]
    async fn test_request_after_completion_is_served() {
        let driver = driver_with_blob();
        let ctx = test_context_with(GatewayConfig::default(), Arc::clone(&driver));

        let (status, calls) = run_request(&ctx, get_blob(Some("client-d"), CacheMode::CacheThenDb)).await;
        assert_eq!(status, ProcessorStatus::Done);
        assert_eq!(data_items(&calls).len(), 3);

        let (status, calls) = run_request(&ctx, get_blob(Some("client-d"), CacheMode::CacheThenDb)).await;
        assert_eq!(status, ProcessorStatus::Done);
        assert_eq!(data_items(&calls).len(), 3);
        assert_eq!(ctx.counters.blobs_excluded(), 0);
    }

    #[tokio::test]
    async fn test_resend_window_suppresses_recent_blob() {
        let driver = driver_with_blob();
        let mut config = GatewayConfig::default();
        config.exclude_blob.resend_after_ms = 60_000;
        let ctx = test_context_with(config, Arc::clone(&driver));

        let (_, calls) = run_request(&ctx, get_blob(Some("client-e"), CacheMode::CacheThenDb)).await;
        assert_eq!(data_items(&calls).len(), 3);

        let (status, calls) = run_request(&ctx, get_blob(Some("client-e"), CacheMode::CacheThenDb)).await;
        assert_eq!(status, ProcessorStatus::Done);
        assert_eq!(
            data_items(&calls),
            vec![ReplyItem::BlobExcluded {
                blob_id: BLOB,
                reason: ExcludeReason::Sent,
            }]
        );
        assert_eq!(driver.calls("blob_chunks"), 1);
    }

    #[tokio::test]
    async fn test_not_found_rolls_back_registration() {
        let driver = Arc::new(MemoryDriver::new());
        let ctx = test_context(Arc::clone(&driver));

        let (status, calls) = run_request(&ctx, get_blob(Some("client-a"), CacheMode::CacheThenDb)).await;
        assert_eq!(status, ProcessorStatus::NotFound);
        assert!(calls.contains(&SinkCall::Completion(404)));
        assert_eq!(ctx.exclude_blobs.state("client-a", BLOB), None);
    }

    #[tokio::test]
    async fn test_cache_only_miss_rolls_back() {
        let driver = driver_with_blob();
        let ctx = test_context(Arc::clone(&driver));

        let (status, calls) = run_request(&ctx, get_blob(Some("client-a"), CacheMode::CacheOnly)).await;
        assert_eq!(status, ProcessorStatus::NotFound);
        assert!(calls.contains(&SinkCall::Completion(404)));
        assert_eq!(ctx.exclude_blobs.state("client-a", BLOB), None);
        assert_eq!(driver.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_chunk_error_rolls_back() {
        let driver = Arc::new(MemoryDriver::new());
        driver.add_blob_prop(blob_info(BLOB, 2_000, 2));
        // Properties succeed; chunk fetch keeps failing
        let ctx = test_context(Arc::clone(&driver));
        ctx.caches.blob_prop.add(blob_info(BLOB, 2_000, 2), true);
        driver.fail_next(3, DbError::Timeout(Duration::from_millis(1)));

        let (status, calls) = run_request(&ctx, get_blob(Some("client-a"), CacheMode::CacheThenDb)).await;
        assert_eq!(status, ProcessorStatus::Error);
        assert!(calls.contains(&SinkCall::Completion(500)));
        assert_eq!(ctx.exclude_blobs.state("client-a", BLOB), None);
        assert_eq!(ctx.counters.db_errors(), 1);
    }

    #[tokio::test]
    async fn test_cancel_mid_flight() {
        let driver = driver_with_blob();
        driver.set_delay(Duration::from_millis(200));
        let ctx = test_context(Arc::clone(&driver));

        let (handle, calls) = start_request(&ctx, get_blob(Some("client-a"), CacheMode::CacheThenDb));
        let cancel = handle.cancel_token();
        let task = tokio::spawn(handle.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert_eq!(task.await.unwrap(), ProcessorStatus::Cancelled);
        assert_eq!(calls.lock().clone(), vec![SinkCall::Finished]);
        assert_eq!(ctx.exclude_blobs.state("client-a", BLOB), None);
    }

    #[tokio::test]
    async fn test_cancel_before_start_emits_nothing() {
        let driver = driver_with_blob();
        let ctx = test_context(Arc::clone(&driver));

        let (handle, calls) = start_request(&ctx, get_blob(Some("client-a"), CacheMode::CacheThenDb));
        handle.cancel_token().cancel();
        assert_eq!(handle.run().await, ProcessorStatus::Cancelled);
        assert_eq!(calls.lock().clone(), vec![SinkCall::Finished]);
        assert_eq!(driver.total_calls(), 0);
    }
}
