//! Table file builder
//!
//! Produces files in the layout [`crate::LocalKvCache`] reads. Each call is
//! one write transaction.

use crate::error::{KvCacheError, KvCacheResult};
use crate::keys;
use crate::tables::KvTable;
use redb::Database;
use seqgate_common::{BioseqInfo, BlobInfo, Si2CsiRecord};
use serde::Serialize;
use std::path::Path;

/// Writer for one table file
pub struct KvTableWriter {
    db: Database,
    table: KvTable,
}

impl KvTableWriter {
    /// Create (or reopen) the file at `path` and make sure the table exists
    pub fn create(path: impl AsRef<Path>, table: KvTable) -> KvCacheResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(table.definition())?;
        }
        write_txn.commit()?;

        Ok(Self { db, table })
    }

    pub const fn table(&self) -> KvTable {
        self.table
    }

    pub fn write_bioseq_info(&self, records: &[BioseqInfo]) -> KvCacheResult<()> {
        self.write_encoded(KvTable::BioseqInfo, records, |info| {
            let id = &info.canonical;
            keys::pack_bioseq_info_key(&id.accession, id.version, id.seq_id_type, id.gi)
        })
    }

    pub fn write_si2csi(&self, records: &[Si2CsiRecord]) -> KvCacheResult<()> {
        self.write_encoded(KvTable::Si2Csi, records, |record| {
            keys::pack_si2csi_key(&record.sec_seq_id, record.sec_seq_id_type)
        })
    }

    pub fn write_blob_prop(&self, records: &[BlobInfo]) -> KvCacheResult<()> {
        self.write_encoded(KvTable::BlobProp, records, |info| {
            keys::pack_blob_prop_key(info.blob_id.sat, info.blob_id.sat_key, info.last_modified)
        })
    }

    /// Store an already packed key and value as is
    pub fn write_raw(&self, key: &[u8], value: &[u8]) -> KvCacheResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(self.table.definition())?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn write_encoded<T, F>(&self, expected: KvTable, records: &[T], key_of: F) -> KvCacheResult<()>
    where
        T: Serialize,
        F: Fn(&T) -> Vec<u8>,
    {
        if self.table != expected {
            return Err(KvCacheError::WrongTable {
                expected,
                actual: self.table,
            });
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(self.table.definition())?;
            for record in records {
                let key = key_of(record);
                let value = bincode::serialize(record)?;
                table.insert(key.as_slice(), value.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}
