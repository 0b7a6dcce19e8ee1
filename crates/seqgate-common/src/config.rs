//! Configuration types for seqgate
//!
//! The surrounding application builds a [`GatewayConfig`] (usually from a
//! TOML file) and hands the pieces to the cache, fetch and processor
//! constructors.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Root configuration for seqgate
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// In-memory cache limits
    pub caches: CacheConfig,
    /// Persistent local key-value cache
    pub kv_cache: KvCacheConfig,
    /// Distributed database access
    pub db: DbConfig,
    /// Per-client blob exclusion
    pub exclude_blob: ExcludeBlobConfig,
    /// Seq-id resolution policy
    pub resolve: ResolveConfig,
}

impl GatewayConfig {
    /// Parse a TOML document; missing sections fall back to defaults
    pub fn from_toml_str(s: &str) -> Result<Self, GatewayError> {
        toml::from_str(s).map_err(|e| GatewayError::Configuration(e.to_string()))
    }

    /// Load a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)
            .map_err(|e| GatewayError::Configuration(format!("{}: {e}", path.display())))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

/// Size and lifetime of one bounded cache
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheLimits {
    /// Maximum number of entries
    pub max_size: usize,
    /// Entry lifetime in milliseconds
    pub ttl_ms: u64,
}

impl CacheLimits {
    #[must_use]
    pub const fn new(max_size: usize, ttl_ms: u64) -> Self {
        Self { max_size, ttl_ms }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Limits for each specialized in-memory cache
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub bioseq_info: CacheLimits,
    pub blob_prop: CacheLimits,
    pub annot: CacheLimits,
    pub tax_id: CacheLimits,
    pub cdd: CacheLimits,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            bioseq_info: CacheLimits::new(100_000, 60_000),
            blob_prop: CacheLimits::new(100_000, 60_000),
            annot: CacheLimits::new(10_000, 60_000),
            tax_id: CacheLimits::new(100_000, 300_000),
            cdd: CacheLimits::new(10_000, 60_000),
        }
    }
}

/// Persistent key-value cache files
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KvCacheConfig {
    /// Bioseq info table file (disabled when unset)
    pub bioseq_info_path: Option<PathBuf>,
    /// Secondary-id to canonical-id table file
    pub si2csi_path: Option<PathBuf>,
    /// Blob properties table file
    pub blob_prop_path: Option<PathBuf>,
    /// How many recent runtime errors to keep
    pub runtime_error_ring_size: usize,
}

impl Default for KvCacheConfig {
    fn default() -> Self {
        Self {
            bioseq_info_path: None,
            si2csi_path: None,
            blob_prop_path: None,
            runtime_error_ring_size: 100,
        }
    }
}

/// Distributed database access
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Per-call timeout (milliseconds)
    pub timeout_ms: u64,
    /// Retries after the first attempt for transient errors
    pub max_retries: u32,
    /// Rows per page
    pub page_size: usize,
    /// Keyspace holding bioseq info and si2csi tables
    pub bioseq_keyspace: String,
    /// Keyspaces (partitions) holding named annotations
    pub annot_keyspaces: Vec<String>,
    /// Annotation name routed to the CDD store
    pub cdd_annot_name: String,
}

impl DbConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_retries: 2,
            page_size: 1_000,
            bioseq_keyspace: "idmain2".to_string(),
            annot_keyspaces: vec!["nannot".to_string()],
            cdd_annot_name: "CDD".to_string(),
        }
    }
}

/// Per-client blob exclusion limits
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcludeBlobConfig {
    /// Blobs remembered per client; the oldest completed ones are purged first
    pub max_blobs_per_client: usize,
    /// A completed blob younger than this is not sent again (milliseconds).
    /// Zero, the default, only suppresses blobs still in flight.
    pub resend_after_ms: u64,
    /// Clients idle for longer than this are forgotten (milliseconds)
    pub inactivity_purge_ms: u64,
}

impl ExcludeBlobConfig {
    #[must_use]
    pub const fn resend_after(&self) -> Duration {
        Duration::from_millis(self.resend_after_ms)
    }

    #[must_use]
    pub const fn inactivity_purge(&self) -> Duration {
        Duration::from_millis(self.inactivity_purge_ms)
    }
}

impl Default for ExcludeBlobConfig {
    fn default() -> Self {
        Self {
            max_blobs_per_client: 1_000,
            resend_after_ms: 0,
            inactivity_purge_ms: 60 * 60 * 1000,
        }
    }
}

/// Which record wins when a broadened lookup matches several
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// First record in key order
    FirstMatch,
    /// Highest version; first in key order among equals
    #[default]
    HighestVersion,
}

impl TieBreak {
    /// Choose among candidates given in key order
    pub fn pick<T, I, F>(self, candidates: I, version: F) -> Option<T>
    where
        I: IntoIterator<Item = T>,
        F: Fn(&T) -> i32,
    {
        let mut candidates = candidates.into_iter();
        match self {
            Self::FirstMatch => candidates.next(),
            Self::HighestVersion => candidates.fold(None, |best, item| match best {
                Some(b) if version(&b) >= version(&item) => Some(b),
                _ => Some(item),
            }),
        }
    }
}

/// Seq-id resolution policy
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub tie_break: TieBreak,
}
