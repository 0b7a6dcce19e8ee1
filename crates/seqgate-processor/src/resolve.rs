//! Resolve processor: seq-id to bioseq info

use crate::processor::{Processor, ProcessorCore};
use crate::reply::ReplyItem;
use crate::request::ResolveRequest;
use crate::resolver::{Resolution, Resolver};
use seqgate_common::ParsedSeqId;
use seqgate_fetch::FetchEvent;
use std::sync::Arc;

pub struct ResolveProcessor {
    core: ProcessorCore,
    request: ResolveRequest,
    resolver: Option<Resolver>,
}

impl ResolveProcessor {
    pub const fn new(core: ProcessorCore, request: ResolveRequest) -> Self {
        Self {
            core,
            request,
            resolver: None,
        }
    }

    fn on_resolution(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Pending => {}
            Resolution::Found(mut info) => {
                info.include = info.include.intersection(self.request.include);
                self.core.reply.data(ReplyItem::BioseqInfo(info));
                self.core.complete();
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
}

impl Processor for ResolveProcessor {
    fn name(&self) -> &'static str {
        "resolve"
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
        let Some(resolver) = self.resolver.as_mut() else {
            return;
        };
        let resolution = resolver.on_event(&purpose, event, &mut self.core.fetches);
        self.on_resolution(resolution);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{DataSource, LookupKind};
    use crate::processor::ProcessorStatus;
    use crate::request::{CacheMode, Request};
    use crate::testing::{bioseq_info, data_items, run_request, test_context, SinkCall};
    use seqgate_common::{seq_id_type, IncludeInfo};
    use crate::context::GatewayContext;
    use seqgate_common::GatewayConfig;
    use seqgate_fetch::{DbError, MemoryDriver};
    use seqgate_kvcache::{KvTable, KvTableWriter};

    fn resolve(seq_id: &str, cache_mode: CacheMode) -> Request {
        Request::Resolve(ResolveRequest {
            seq_id: seq_id.to_string(),
            seq_id_type: None,
            include: IncludeInfo::ALL,
            cache_mode,
        })
    }

    #[tokio::test]
    async fn test_resolve_then_served_from_cache() {
        let driver = Arc::new(MemoryDriver::new());
        driver.add_bioseq_info(bioseq_info("NC_000001", 11, seq_id_type::GENBANK, 12345));
        let ctx = test_context(Arc::clone(&driver));

        let (status, calls) = run_request(&ctx, resolve("NC_000001", CacheMode::CacheThenDb)).await;
        assert_eq!(status, ProcessorStatus::Done);
        let items = data_items(&calls);
        assert_eq!(items.len(), 1);
        let ReplyItem::BioseqInfo(info) = &items[0] else {
            panic!("expected bioseq info, got {:?}", items[0]);
        };
        assert_eq!(info.canonical.version, 11);
        assert_eq!(info.canonical.seq_id_type, seq_id_type::GENBANK);
        assert_eq!(info.canonical.gi, 12345);
        assert_eq!(info.request_id, "NC_000001");
        assert_eq!(calls.last(), Some(&SinkCall::Finished));
        assert!(calls.contains(&SinkCall::Completion(200)));
        assert_eq!(driver.calls("bioseq_info"), 1);

        let (status, calls) = run_request(&ctx, resolve("NC_000001", CacheMode::CacheThenDb)).await;
        assert_eq!(status, ProcessorStatus::Done);
        assert_eq!(data_items(&calls).len(), 1);
        assert_eq!(driver.calls("bioseq_info"), 1);
        assert_eq!(
            ctx.counters.lookups(LookupKind::BioseqInfo, DataSource::Cache),
            1
        );
        assert_eq!(ctx.caches.tax_id.len(), 1);
    }

    #[tokio::test]
    async fn test_include_mask_is_applied() {
        let driver = Arc::new(MemoryDriver::new());
        driver.add_bioseq_info(bioseq_info("NC_000001", 11, seq_id_type::OTHER, 1));
        let ctx = test_context(Arc::clone(&driver));

        let request = Request::Resolve(ResolveRequest {
            seq_id: "NC_000001.11".to_string(),
            seq_id_type: None,
            include: IncludeInfo::CANONICAL_ID | IncludeInfo::TAX_ID,
            cache_mode: CacheMode::CacheThenDb,
        });
        let (_, calls) = run_request(&ctx, request).await;
        let items = data_items(&calls);
        let ReplyItem::BioseqInfo(info) = &items[0] else {
            panic!("expected bioseq info");
        };
        assert_eq!(info.include, IncludeInfo::CANONICAL_ID | IncludeInfo::TAX_ID);
    }

    #[tokio::test]
    async fn test_resolve_gi_through_si2csi() {
        let driver = Arc::new(MemoryDriver::new());
        let info = bioseq_info("NC_000001", 11, seq_id_type::OTHER, 568_815_597);
        driver.add_si2csi(seqgate_common::Si2CsiRecord {
            sec_seq_id: "568815597".to_string(),
            sec_seq_id_type: seq_id_type::GI,
            canonical: info.canonical.clone(),
        });
        driver.add_bioseq_info(info);
        let ctx = test_context(Arc::clone(&driver));

        let (status, calls) = run_request(&ctx, resolve("568815597", CacheMode::CacheThenDb)).await;
        assert_eq!(status, ProcessorStatus::Done);
        let items = data_items(&calls);
        let ReplyItem::BioseqInfo(found) = &items[0] else {
            panic!("expected bioseq info");
        };
        assert_eq!(found.canonical.accession, "NC_000001");
        assert_eq!(found.request_id, "568815597");
        assert_eq!(driver.calls("si2csi"), 1);
        assert_eq!(driver.calls("bioseq_info"), 1);
    }

    #[tokio::test]
    async fn test_gi_reuses_cached_canonical_record() {
        let driver = Arc::new(MemoryDriver::new());
        let info = bioseq_info("NC_000001", 11, seq_id_type::OTHER, 568_815_597);
        driver.add_si2csi(seqgate_common::Si2CsiRecord {
            sec_seq_id: "568815597".to_string(),
            sec_seq_id_type: seq_id_type::GI,
            canonical: info.canonical.clone(),
        });
        driver.add_bioseq_info(info);
        let ctx = test_context(Arc::clone(&driver));

        let (status, _) = run_request(&ctx, resolve("NC_000001.11", CacheMode::CacheThenDb)).await;
        assert_eq!(status, ProcessorStatus::Done);
        assert_eq!(driver.calls("bioseq_info"), 1);

        // si2csi maps the GI to a canonical id already held in memory
        let (status, calls) = run_request(&ctx, resolve("568815597", CacheMode::CacheThenDb)).await;
        assert_eq!(status, ProcessorStatus::Done);
        let items = data_items(&calls);
        let ReplyItem::BioseqInfo(found) = &items[0] else {
            panic!("expected bioseq info");
        };
        assert_eq!(found.canonical.accession, "NC_000001");
        assert_eq!(found.request_id, "568815597");
        assert_eq!(driver.calls("si2csi"), 1);
        assert_eq!(driver.calls("bioseq_info"), 1);
        assert_eq!(
            ctx.counters.lookups(LookupKind::BioseqInfo, DataSource::Cache),
            1
        );
    }

    #[tokio::test]
    async fn test_secondary_id_after_primary_miss() {
        let driver = Arc::new(MemoryDriver::new());
        let info = bioseq_info("NC_000001", 11, seq_id_type::OTHER, 1);
        driver.add_si2csi(seqgate_common::Si2CsiRecord {
            sec_seq_id: "CM000663".to_string(),
            sec_seq_id_type: seq_id_type::GENBANK,
            canonical: info.canonical.clone(),
        });
        driver.add_bioseq_info(info);
        let ctx = test_context(Arc::clone(&driver));

        let (status, _) = run_request(&ctx, resolve("CM000663", CacheMode::DbOnly)).await;
        assert_eq!(status, ProcessorStatus::Done);
        // Primary miss, si2csi, then bioseq info by canonical id
        assert_eq!(driver.calls("bioseq_info"), 2);
        assert_eq!(driver.calls("si2csi"), 1);
    }

    #[tokio::test]
    async fn test_unknown_seq_id_is_not_found() {
        let driver = Arc::new(MemoryDriver::new());
        let ctx = test_context(Arc::clone(&driver));

        let (status, calls) = run_request(&ctx, resolve("XX_999999", CacheMode::CacheThenDb)).await;
        assert_eq!(status, ProcessorStatus::NotFound);
        assert!(data_items(&calls).is_empty());
        assert!(calls.contains(&SinkCall::Completion(404)));
        assert!(matches!(&calls[0], SinkCall::Message(m) if m.status == 404));
    }

    #[tokio::test]
    async fn test_cache_only_miss_skips_database() {
        let driver = Arc::new(MemoryDriver::new());
        driver.add_bioseq_info(bioseq_info("NC_000001", 11, seq_id_type::OTHER, 1));
        let ctx = test_context(Arc::clone(&driver));

        let (status, _) = run_request(&ctx, resolve("NC_000001", CacheMode::CacheOnly)).await;
        assert_eq!(status, ProcessorStatus::NotFound);
        assert_eq!(driver.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_seq_id() {
        let ctx = test_context(Arc::new(MemoryDriver::new()));
        let (status, calls) = run_request(&ctx, resolve("  ", CacheMode::CacheThenDb)).await;
        assert_eq!(status, ProcessorStatus::Error);
        assert!(calls.contains(&SinkCall::Completion(400)));
    }

    #[tokio::test]
    async fn test_database_failure_reports_500() {
        let driver = Arc::new(MemoryDriver::new());
        driver.fail_next(10, DbError::Unavailable("all nodes down".into()));
        let ctx = test_context(Arc::clone(&driver));

        let (status, calls) = run_request(&ctx, resolve("NC_000001", CacheMode::DbOnly)).await;
        assert_eq!(status, ProcessorStatus::Error);
        assert!(calls.contains(&SinkCall::Completion(500)));
        assert_eq!(ctx.counters.db_errors(), 1);
        // First attempt plus two retries
        assert_eq!(driver.calls("bioseq_info"), 3);
    }

    #[tokio::test]
    async fn test_resolve_from_persistent_cache() {
        let dir = tempfile::tempdir().unwrap();
        let bioseq_path = dir.path().join("bioseq_info.redb");
        let si2csi_path = dir.path().join("si2csi.redb");
        let info = bioseq_info("NC_000001", 11, seq_id_type::OTHER, 568_815_597);
        {
            let writer = KvTableWriter::create(&bioseq_path, KvTable::BioseqInfo).unwrap();
            writer.write_bioseq_info(&[info.clone()]).unwrap();
            let writer = KvTableWriter::create(&si2csi_path, KvTable::Si2Csi).unwrap();
            writer
                .write_si2csi(&[seqgate_common::Si2CsiRecord {
                    sec_seq_id: "568815597".to_string(),
                    sec_seq_id_type: seq_id_type::GI,
                    canonical: info.canonical.clone(),
                }])
                .unwrap();
        }

        let mut config = GatewayConfig::default();
        config.kv_cache.bioseq_info_path = Some(bioseq_path);
        config.kv_cache.si2csi_path = Some(si2csi_path);
        let driver = Arc::new(MemoryDriver::new());
        let ctx = Arc::new(GatewayContext::new(config, Arc::clone(&driver) as Arc<dyn seqgate_fetch::DbDriver>));

        for seq_id in ["NC_000001", "568815597"] {
            let (status, calls) = run_request(&ctx, resolve(seq_id, CacheMode::CacheOnly)).await;
            assert_eq!(status, ProcessorStatus::Done, "{seq_id}");
            assert_eq!(data_items(&calls).len(), 1);
        }
        assert_eq!(driver.total_calls(), 0);
        // The GI maps through si2csi to the record the first request cached
        assert_eq!(
            ctx.counters.lookups(LookupKind::BioseqInfo, DataSource::KvCache),
            1
        );
        assert_eq!(
            ctx.counters.lookups(LookupKind::BioseqInfo, DataSource::Cache),
            1
        );
        assert_eq!(
            ctx.counters.lookups(LookupKind::Si2Csi, DataSource::KvCache),
            1
        );
        assert!(ctx.kv_cache.runtime_errors().is_empty());
    }
}
