//! Process-wide state shared by all processors

use crate::metrics::GatewayCounters;
use seqgate_cache::{ExcludeBlobCache, MemoryCaches};
use seqgate_common::GatewayConfig;
use seqgate_fetch::{DbDriver, FetchOptions};
use seqgate_kvcache::LocalKvCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Caches, database access and counters; owned by the server and shared
/// with every processor through an `Arc`
pub struct GatewayContext {
    pub config: GatewayConfig,
    pub caches: MemoryCaches,
    pub kv_cache: LocalKvCache,
    pub exclude_blobs: ExcludeBlobCache,
    pub driver: Arc<dyn DbDriver>,
    pub counters: GatewayCounters,
}

impl GatewayContext {
    /// Build the context, opening the persistent cache files from `config`
    pub fn new(config: GatewayConfig, driver: Arc<dyn DbDriver>) -> Self {
        let kv_cache = LocalKvCache::open(&config.kv_cache);
        Self::with_kv_cache(config, kv_cache, driver)
    }

    pub fn with_kv_cache(
        config: GatewayConfig,
        kv_cache: LocalKvCache,
        driver: Arc<dyn DbDriver>,
    ) -> Self {
        info!(
            "Gateway context ready (db timeout {:?}, {} retries, {} annotation keyspaces)",
            config.db.timeout(),
            config.db.max_retries,
            config.db.annot_keyspaces.len()
        );
        Self {
            caches: MemoryCaches::new(&config.caches),
            exclude_blobs: ExcludeBlobCache::new(&config.exclude_blob),
            kv_cache,
            driver,
            counters: GatewayCounters::new(),
            config,
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::from(&self.config.db)
    }
}

/// Periodically forget exclude-blob clients that went idle
pub fn spawn_exclude_purge(
    ctx: Arc<GatewayContext>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("Exclude-blob purge stopped");
                    break;
                }
                _ = ticker.tick() => {
                    ctx.exclude_blobs.purge_inactive();
                }
            }
        }
    })
}
