//! Redb table definitions for the persistent key-value cache.
//!
//! Each table lives in its own file. Keys are the packed layouts from
//! [`crate::keys`]; values are bincode-encoded records.

use redb::TableDefinition;
use std::fmt;

// Key: accession | 0x00 | version | seq_id_type | gi, Value: BioseqInfo
pub const BIOSEQ_INFO: TableDefinition<&[u8], &[u8]> = TableDefinition::new("bioseq_info");
// Key: sec_seq_id | 0x00 | sec_seq_id_type, Value: Si2CsiRecord
pub const SI2CSI: TableDefinition<&[u8], &[u8]> = TableDefinition::new("si2csi");
// Key: sat | sat_key | !last_modified, Value: BlobInfo
pub const BLOB_PROP: TableDefinition<&[u8], &[u8]> = TableDefinition::new("blob_prop");

/// The three independently opened tables
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KvTable {
    BioseqInfo,
    Si2Csi,
    BlobProp,
}

impl KvTable {
    pub const ALL: [Self; 3] = [Self::BioseqInfo, Self::Si2Csi, Self::BlobProp];

    #[must_use]
    pub const fn definition(self) -> TableDefinition<'static, &'static [u8], &'static [u8]> {
        match self {
            Self::BioseqInfo => BIOSEQ_INFO,
            Self::Si2Csi => SI2CSI,
            Self::BlobProp => BLOB_PROP,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BioseqInfo => "bioseq_info",
            Self::Si2Csi => "si2csi",
            Self::BlobProp => "blob_prop",
        }
    }
}

impl fmt::Display for KvTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
