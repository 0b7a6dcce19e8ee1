//! Persistent key-value cache backed by redb.
//!
//! Three tables, each in its own file, opened once and read through redb
//! read transactions only. A table that fails to open, or that turns out to
//! be corrupt at lookup time, is disabled for the rest of the process and
//! its lookups report a miss; the other tables keep working.

use crate::error::{KvCacheError, KvCacheResult};
use crate::keys;
use crate::runtime_errors::{RuntimeError, RuntimeErrors};
use crate::tables::KvTable;
use redb::{Database, ReadOnlyTable};
use seqgate_common::config::{KvCacheConfig, TieBreak};
use seqgate_common::{BioseqInfo, BlobId, BlobInfo, Si2CsiRecord};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

type RawTable = ReadOnlyTable<&'static [u8], &'static [u8]>;

/// Raw rows of a prefix scan, in key order
type Rows = Vec<(Vec<u8>, Vec<u8>)>;

struct SubCache {
    table: KvTable,
    db: Option<Database>,
    enabled: AtomicBool,
}

impl SubCache {
    fn open(table: KvTable, path: Option<&Path>, errors: &RuntimeErrors) -> Self {
        let Some(path) = path else {
            debug!("No file configured for {} cache; using database only", table);
            return Self::disabled(table);
        };

        match Self::open_db(table, path) {
            Ok(db) => {
                info!("Opened {} cache at {}", table, path.display());
                Self {
                    table,
                    db: Some(db),
                    enabled: AtomicBool::new(true),
                }
            }
            Err(e) => {
                warn!("Failed to open {} cache at {}: {}", table, path.display(), e);
                errors.record(table, format!("open {}: {e}", path.display()));
                Self::disabled(table)
            }
        }
    }

    fn open_db(table: KvTable, path: &Path) -> KvCacheResult<Database> {
        let db = Database::open(path)?;
        // Fail at open time rather than on the first lookup
        {
            let read_txn = db.begin_read()?;
            let _t = read_txn.open_table(table.definition())?;
        }
        Ok(db)
    }

    const fn disabled(table: KvTable) -> Self {
        Self {
            table,
            db: None,
            enabled: AtomicBool::new(false),
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

/// Local persistent cache consulted before any database round trip
pub struct LocalKvCache {
    bioseq_info: SubCache,
    si2csi: SubCache,
    blob_prop: SubCache,
    errors: RuntimeErrors,
}

impl LocalKvCache {
    /// Open every configured table. Never fails; failed tables are disabled.
    pub fn open(config: &KvCacheConfig) -> Self {
        let errors = RuntimeErrors::new(config.runtime_error_ring_size);
        let bioseq_info = SubCache::open(
            KvTable::BioseqInfo,
            config.bioseq_info_path.as_deref(),
            &errors,
        );
        let si2csi = SubCache::open(KvTable::Si2Csi, config.si2csi_path.as_deref(), &errors);
        let blob_prop =
            SubCache::open(KvTable::BlobProp, config.blob_prop_path.as_deref(), &errors);
        Self {
            bioseq_info,
            si2csi,
            blob_prop,
            errors,
        }
    }

    /// A cache with every table disabled
    pub fn disabled() -> Self {
        Self::open(&KvCacheConfig::default())
    }

    pub fn is_enabled(&self, table: KvTable) -> bool {
        self.sub(table).is_enabled()
    }

    /// Recent open and lookup failures, oldest first
    pub fn runtime_errors(&self) -> Vec<RuntimeError> {
        self.errors.snapshot()
    }

    const fn sub(&self, table: KvTable) -> &SubCache {
        match table {
            KvTable::BioseqInfo => &self.bioseq_info,
            KvTable::Si2Csi => &self.si2csi,
            KvTable::BlobProp => &self.blob_prop,
        }
    }

    // ---- Bioseq info ----

    /// Look up bioseq info by accession plus whatever components are known.
    ///
    /// With every component supplied this is an exact get. Otherwise the most
    /// specific key prefix is scanned and `tie_break` picks among the rows
    /// that match the supplied components.
    pub fn lookup_bioseq_info(
        &self,
        accession: &str,
        version: Option<i32>,
        seq_id_type: Option<i16>,
        gi: Option<i64>,
        tie_break: TieBreak,
    ) -> Option<BioseqInfo> {
        self.with_table(KvTable::BioseqInfo, |table| {
            if let (Some(version), Some(seq_id_type), Some(gi)) = (version, seq_id_type, gi) {
                let key = keys::pack_bioseq_info_key(accession, version, seq_id_type, gi);
                return get_decoded(table, &key);
            }

            let prefix = match (version, seq_id_type) {
                (Some(version), Some(seq_id_type)) => {
                    keys::bioseq_info_type_prefix(accession, version, seq_id_type)
                }
                (Some(version), None) => keys::bioseq_info_version_prefix(accession, version),
                (None, _) => keys::bioseq_info_prefix(accession),
            };

            let mut candidates = Vec::new();
            for (key, value) in scan_prefix(table, &prefix)? {
                let unpacked =
                    keys::unpack_bioseq_info_key(&key).ok_or_else(|| KvCacheError::MalformedKey {
                        table: KvTable::BioseqInfo,
                        key: key.clone(),
                    })?;
                if seq_id_type.is_some_and(|t| t != unpacked.seq_id_type)
                    || gi.is_some_and(|g| g != unpacked.gi)
                {
                    continue;
                }
                candidates.push((unpacked.version, value));
            }

            tie_break
                .pick(candidates, |(version, _)| *version)
                .map(|(_, value)| decode(&value))
                .transpose()
        })
    }

    // ---- Si2csi ----

    /// Map a secondary id to its canonical id; without a type the first row wins
    pub fn lookup_si2csi(&self, sec_seq_id: &str, seq_id_type: Option<i16>) -> Option<Si2CsiRecord> {
        self.with_table(KvTable::Si2Csi, |table| {
            if let Some(seq_id_type) = seq_id_type {
                return get_decoded(table, &keys::pack_si2csi_key(sec_seq_id, seq_id_type));
            }
            let prefix = keys::si2csi_prefix(sec_seq_id);
            let Some((key, value)) = scan_prefix(table, &prefix)?.into_iter().next() else {
                return Ok(None);
            };
            if keys::unpack_si2csi_key(&key).is_none() {
                return Err(KvCacheError::MalformedKey {
                    table: KvTable::Si2Csi,
                    key,
                });
            }
            decode(&value).map(Some)
        })
    }

    // ---- Blob prop ----

    /// Blob properties for an exact version, or the newest when `last_modified` is unset
    pub fn lookup_blob_prop(&self, blob_id: BlobId, last_modified: Option<i64>) -> Option<BlobInfo> {
        self.with_table(KvTable::BlobProp, |table| {
            if let Some(last_modified) = last_modified {
                let key = keys::pack_blob_prop_key(blob_id.sat, blob_id.sat_key, last_modified);
                return get_decoded(table, &key);
            }
            let prefix = keys::blob_prop_prefix(blob_id.sat, blob_id.sat_key);
            let Some((key, value)) = scan_prefix(table, &prefix)?.into_iter().next() else {
                return Ok(None);
            };
            if keys::unpack_blob_prop_key(&key).is_none() {
                return Err(KvCacheError::MalformedKey {
                    table: KvTable::BlobProp,
                    key,
                });
            }
            decode(&value).map(Some)
        })
    }

    /// Run a read against one table. Any failure disables the table.
    fn with_table<T, F>(&self, table: KvTable, f: F) -> Option<T>
    where
        F: FnOnce(&RawTable) -> KvCacheResult<Option<T>>,
    {
        let sub = self.sub(table);
        if !sub.is_enabled() {
            return None;
        }
        let db = sub.db.as_ref()?;

        let result = (|| -> KvCacheResult<Option<T>> {
            let read_txn = db.begin_read()?;
            let raw = read_txn.open_table(table.definition())?;
            f(&raw)
        })();

        match result {
            Ok(found) => found,
            Err(e) => {
                self.disable(sub, &e);
                None
            }
        }
    }

    fn disable(&self, sub: &SubCache, e: &KvCacheError) {
        if sub.enabled.swap(false, Ordering::AcqRel) {
            error!("Disabling {} cache after fatal error: {}", sub.table, e);
        }
        self.errors.record(sub.table, e.to_string());
    }
}

fn scan_prefix(table: &RawTable, prefix: &[u8]) -> KvCacheResult<Rows> {
    let mut rows = Vec::new();
    for entry in table.range(prefix..)? {
        let (key, value) = entry?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        rows.push((key.to_vec(), value.value().to_vec()));
    }
    Ok(rows)
}

fn get_decoded<T: DeserializeOwned>(table: &RawTable, key: &[u8]) -> KvCacheResult<Option<T>> {
    match table.get(key)? {
        Some(value) => Ok(Some(decode(value.value())?)),
        None => Ok(None),
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> KvCacheResult<T> {
    Ok(bincode::deserialize(bytes)?)
}
