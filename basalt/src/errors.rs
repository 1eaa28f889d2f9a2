use crate::lock_manager::LockError;
use crate::TableId;
use std::io;

/// Failures surfaced by the storage kernel.
#[derive(Debug)]
pub enum DbError {
    /// A lock wait timed out. The caller must abort the transaction and
    /// may retry it.
    TransactionAborted,
    /// Every slot on the page is occupied.
    PageFull,
    /// The tuple's schema does not match the table it was aimed at.
    SchemaMismatch,
    /// The tuple does not live on the page it was addressed to.
    TupleNotOnPage,
    /// Every resident page is dirty, so nothing can be evicted.
    EvictFailed,
    /// An iterator is exhausted or closed.
    NoSuchElement,
    /// No file is registered under the table id.
    MissingTable(TableId),
    /// A page or log record failed to decode.
    Corrupt(String),
    Io(io::Error),
}

impl From<io::Error> for DbError {
    fn from(err: io::Error) -> Self {
        DbError::Io(err)
    }
}

impl From<LockError> for DbError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Aborted => DbError::TransactionAborted,
        }
    }
}
