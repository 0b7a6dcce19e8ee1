//! In-memory database driver
//!
//! Holds rows in plain vectors and answers [`DbQuery`]s the way the real
//! tables are clustered. Transient failures and call latency can be
//! scripted, and every call is counted per query kind.

use crate::driver::{DbDriver, DbError, DbPage, DbQuery, DbRecord};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use seqgate_common::{BioseqInfo, BlobId, BlobInfo, NamedAnnotRecord, Si2CsiRecord};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

#[derive(Default)]
struct Tables {
    bioseq_info: Vec<BioseqInfo>,
    si2csi: Vec<Si2CsiRecord>,
    blob_prop: Vec<BlobInfo>,
    blob_chunks: HashMap<(BlobId, i64), Vec<Bytes>>,
    /// Named annotations per keyspace
    named_annots: HashMap<String, Vec<NamedAnnotRecord>>,
    cdd: Vec<NamedAnnotRecord>,
}

/// Driver over in-memory tables
#[derive(Default)]
pub struct MemoryDriver {
    tables: RwLock<Tables>,
    failures: Mutex<VecDeque<DbError>>,
    delay: Mutex<Option<Duration>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bioseq_info(&self, info: BioseqInfo) {
        self.tables.write().bioseq_info.push(info);
    }

    pub fn add_si2csi(&self, record: Si2CsiRecord) {
        self.tables.write().si2csi.push(record);
    }

    pub fn add_blob_prop(&self, info: BlobInfo) {
        self.tables.write().blob_prop.push(info);
    }

    pub fn add_blob_chunks(&self, blob_id: BlobId, last_modified: i64, chunks: Vec<Bytes>) {
        self.tables
            .write()
            .blob_chunks
            .insert((blob_id, last_modified), chunks);
    }

    pub fn add_named_annot(&self, keyspace: &str, record: NamedAnnotRecord) {
        self.tables
            .write()
            .named_annots
            .entry(keyspace.to_string())
            .or_default()
            .push(record);
    }

    pub fn add_cdd(&self, record: NamedAnnotRecord) {
        self.tables.write().cdd.push(record);
    }

    /// Fail the next `count` calls with `error`
    pub fn fail_next(&self, count: usize, error: DbError) {
        let mut failures = self.failures.lock();
        failures.extend(std::iter::repeat_n(error, count));
    }

    /// Delay every call by `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Calls made for one query kind
    pub fn calls(&self, kind: &str) -> usize {
        self.calls.lock().get(kind).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    fn select(&self, query: &DbQuery) -> Vec<DbRecord> {
        let tables = self.tables.read();
        match query {
            DbQuery::BioseqInfo {
                accession,
                version,
                seq_id_type,
                gi,
                ..
            } => {
                let mut rows: Vec<_> = tables
                    .bioseq_info
                    .iter()
                    .filter(|info| {
                        let id = &info.canonical;
                        id.accession == *accession
                            && version.is_none_or(|v| v == id.version)
                            && seq_id_type.is_none_or(|t| t == id.seq_id_type)
                            && gi.is_none_or(|g| g == id.gi)
                    })
                    .cloned()
                    .collect();
                rows.sort_by_key(|info| {
                    (info.canonical.version, info.canonical.seq_id_type, info.canonical.gi)
                });
                rows.into_iter().map(DbRecord::BioseqInfo).collect()
            }
            DbQuery::Si2Csi {
                sec_seq_id,
                sec_seq_id_type,
                ..
            } => {
                let mut rows: Vec<_> = tables
                    .si2csi
                    .iter()
                    .filter(|r| {
                        r.sec_seq_id == *sec_seq_id
                            && sec_seq_id_type.is_none_or(|t| t == r.sec_seq_id_type)
                    })
                    .cloned()
                    .collect();
                rows.sort_by_key(|r| r.sec_seq_id_type);
                rows.into_iter().map(DbRecord::Si2Csi).collect()
            }
            DbQuery::BlobProp {
                blob_id,
                last_modified,
            } => {
                let mut rows: Vec<_> = tables
                    .blob_prop
                    .iter()
                    .filter(|b| {
                        b.blob_id == *blob_id && last_modified.is_none_or(|lm| lm == b.last_modified)
                    })
                    .cloned()
                    .collect();
                rows.sort_by_key(|b| std::cmp::Reverse(b.last_modified));
                rows.into_iter().map(DbRecord::BlobProp).collect()
            }
            DbQuery::BlobChunks {
                blob_id,
                last_modified,
            } => tables
                .blob_chunks
                .get(&(*blob_id, *last_modified))
                .map(|chunks| {
                    chunks
                        .iter()
                        .zip(0..)
                        .map(|(data, chunk_no)| DbRecord::BlobChunk {
                            blob_id: *blob_id,
                            chunk_no,
                            data: data.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            DbQuery::NamedAnnots {
                keyspace,
                accession,
                version,
                seq_id_type,
                names,
            } => tables
                .named_annots
                .get(keyspace)
                .map(|rows| {
                    rows.iter()
                        .filter(|r| {
                            r.accession == *accession
                                && r.version == *version
                                && r.seq_id_type == *seq_id_type
                                && names.iter().any(|n| *n == r.annot_name)
                        })
                        .cloned()
                        .map(DbRecord::NamedAnnot)
                        .collect()
                })
                .unwrap_or_default(),
            DbQuery::Cdd {
                accession,
                version,
                seq_id_type,
            } => tables
                .cdd
                .iter()
                .filter(|r| {
                    r.accession == *accession
                        && r.version == *version
                        && r.seq_id_type == *seq_id_type
                })
                .cloned()
                .map(DbRecord::NamedAnnot)
                .collect(),
        }
    }
}

fn decode_offset(paging_state: Option<&Bytes>) -> Result<usize, DbError> {
    let Some(state) = paging_state else {
        return Ok(0);
    };
    let raw: [u8; 8] = state
        .as_ref()
        .try_into()
        .map_err(|_| DbError::Query("invalid paging state".to_string()))?;
    usize::try_from(u64::from_be_bytes(raw))
        .map_err(|_| DbError::Query("invalid paging state".to_string()))
}

#[async_trait]
impl DbDriver for MemoryDriver {
    async fn fetch_page(
        &self,
        query: &DbQuery,
        paging_state: Option<Bytes>,
        page_size: usize,
    ) -> Result<DbPage, DbError> {
        *self.calls.lock().entry(query.kind()).or_default() += 1;

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        let offset = decode_offset(paging_state.as_ref())?;
        let rows = self.select(query);
        let end = offset.saturating_add(page_size.max(1)).min(rows.len());
        let records = rows.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let paging_state =
            (end < rows.len()).then(|| Bytes::copy_from_slice(&(end as u64).to_be_bytes()));

        Ok(DbPage {
            records,
            paging_state,
        })
    }
}
