//! Gateway counters for Prometheus
//!
//! Tracks replies per request kind, where lookups were answered from, and
//! database errors.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Request kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Resolve,
    GetBlob,
    NamedAnnot,
    Get,
}

impl RequestKind {
    pub const ALL: [Self; 4] = [Self::Resolve, Self::GetBlob, Self::NamedAnnot, Self::Get];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::GetBlob => "getblob",
            Self::NamedAnnot => "get_na",
            Self::Get => "get",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Record kinds looked up through the cache layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    BioseqInfo,
    Si2Csi,
    BlobProp,
    NamedAnnot,
    Cdd,
}

impl LookupKind {
    pub const ALL: [Self; 5] = [
        Self::BioseqInfo,
        Self::Si2Csi,
        Self::BlobProp,
        Self::NamedAnnot,
        Self::Cdd,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BioseqInfo => "bioseq_info",
            Self::Si2Csi => "si2csi",
            Self::BlobProp => "blob_prop",
            Self::NamedAnnot => "named_annot",
            Self::Cdd => "cdd",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Where a lookup was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSource {
    Cache,
    KvCache,
    Db,
    NotFound,
}

impl DataSource {
    pub const ALL: [Self; 4] = [Self::Cache, Self::KvCache, Self::Db, Self::NotFound];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::KvCache => "kv_cache",
            Self::Db => "db",
            Self::NotFound => "not_found",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Per-request-kind reply counters
#[derive(Debug, Default)]
struct ReplyCounters {
    total: AtomicU64,
    success: AtomicU64,
    not_found: AtomicU64,
    client_error: AtomicU64,
    server_error: AtomicU64,
    cancelled: AtomicU64,
}

impl ReplyCounters {
    fn record(&self, status_code: u16) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let counter = match status_code {
            200..300 => &self.success,
            404 => &self.not_found,
            400..500 => &self.client_error,
            _ => &self.server_error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Process-wide counters shared by all processors
#[derive(Debug)]
pub struct GatewayCounters {
    replies: [ReplyCounters; 4],
    lookups: [[AtomicU64; 4]; 5],
    fetches_started: AtomicU64,
    db_errors: AtomicU64,
    blobs_excluded: AtomicU64,
    start_time: Instant,
}

impl Default for GatewayCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayCounters {
    pub fn new() -> Self {
        Self {
            replies: Default::default(),
            lookups: Default::default(),
            fetches_started: AtomicU64::new(0),
            db_errors: AtomicU64::new(0),
            blobs_excluded: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record the terminal status of a reply
    pub fn record_reply(&self, kind: RequestKind, status_code: u16) {
        self.replies[kind.index()].record(status_code);
    }

    pub fn record_cancelled(&self, kind: RequestKind) {
        self.replies[kind.index()]
            .cancelled
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup(&self, kind: LookupKind, source: DataSource) {
        self.lookups[kind.index()][source.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_started(&self) {
        self.fetches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_db_error(&self) {
        self.db_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blob_excluded(&self) {
        self.blobs_excluded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lookups(&self, kind: LookupKind, source: DataSource) -> u64 {
        self.lookups[kind.index()][source.index()].load(Ordering::Relaxed)
    }

    pub fn db_errors(&self) -> u64 {
        self.db_errors.load(Ordering::Relaxed)
    }

    pub fn fetches_started(&self) -> u64 {
        self.fetches_started.load(Ordering::Relaxed)
    }

    pub fn blobs_excluded(&self) -> u64 {
        self.blobs_excluded.load(Ordering::Relaxed)
    }

    /// `(success, not found, server error)` reply counts for `kind`
    pub fn replies(&self, kind: RequestKind) -> (u64, u64, u64) {
        let c = &self.replies[kind.index()];
        (
            c.success.load(Ordering::Relaxed),
            c.not_found.load(Ordering::Relaxed),
            c.server_error.load(Ordering::Relaxed),
        )
    }

    /// Export counters in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(4 * 1024);

        let _ = writeln!(
            output,
            "# HELP seqgate_uptime_seconds Gateway uptime in seconds"
        );
        let _ = writeln!(output, "# TYPE seqgate_uptime_seconds counter");
        let _ = writeln!(
            output,
            "seqgate_uptime_seconds {}",
            self.start_time.elapsed().as_secs()
        );

        let _ = writeln!(
            output,
            "# HELP seqgate_replies_total Replies by request kind and outcome"
        );
        let _ = writeln!(output, "# TYPE seqgate_replies_total counter");
        for kind in RequestKind::ALL {
            let c = &self.replies[kind.index()];
            for (outcome, counter) in [
                ("success", &c.success),
                ("not_found", &c.not_found),
                ("client_error", &c.client_error),
                ("server_error", &c.server_error),
                ("cancelled", &c.cancelled),
            ] {
                let _ = writeln!(
                    output,
                    "seqgate_replies_total{{request=\"{}\",outcome=\"{}\"}} {}",
                    kind.as_str(),
                    outcome,
                    counter.load(Ordering::Relaxed)
                );
            }
        }

        let _ = writeln!(
            output,
            "# HELP seqgate_lookups_total Lookups by record kind and answering layer"
        );
        let _ = writeln!(output, "# TYPE seqgate_lookups_total counter");
        for kind in LookupKind::ALL {
            for source in DataSource::ALL {
                let _ = writeln!(
                    output,
                    "seqgate_lookups_total{{kind=\"{}\",source=\"{}\"}} {}",
                    kind.as_str(),
                    source.as_str(),
                    self.lookups(kind, source)
                );
            }
        }

        for (name, help, value) in [
            (
                "seqgate_fetches_started_total",
                "Database fetch tasks started",
                self.fetches_started(),
            ),
            (
                "seqgate_db_errors_total",
                "Database errors reported to clients",
                self.db_errors(),
            ),
            (
                "seqgate_blobs_excluded_total",
                "Blob deliveries suppressed by the exclude-blob cache",
                self.blobs_excluded(),
            ),
        ] {
            let _ = writeln!(output, "# HELP {name} {help}");
            let _ = writeln!(output, "# TYPE {name} counter");
            let _ = writeln!(output, "{name} {value}");
        }

        output
    }
}
