//! Error types for the persistent key-value cache

use crate::tables::KvTable;

/// Error type for key-value cache operations
#[derive(Debug, thiserror::Error)]
pub enum KvCacheError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("malformed key in {table}: {key:02x?}")]
    MalformedKey { table: KvTable, key: Vec<u8> },
    #[error("writer for {actual} cannot write {expected} records")]
    WrongTable { expected: KvTable, actual: KvTable },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for KvCacheError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

pub type KvCacheResult<T> = Result<T, KvCacheError>;
