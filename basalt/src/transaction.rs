//! Transaction identities and the thin commit/abort controller.

use crate::buffer_pool::BufferPool;
use crate::errors::DbError;
use crate::wal::LogFile;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(0);

/// Opaque transaction identity. Fresh values come from a process-wide
/// monotonic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Hands out transaction ids and drives completion through the buffer
/// pool. Holds no per-transaction state of its own: the lock manager and
/// the dirty marks on cached pages already know everything needed.
pub struct TransactionManager {
    pool: Arc<BufferPool>,
    log: Arc<dyn LogFile>,
}

impl TransactionManager {
    pub fn new(pool: Arc<BufferPool>, log: Arc<dyn LogFile>) -> Self {
        Self { pool, log }
    }

    pub fn begin(&self) -> TransactionId {
        let tid = TransactionId::new();
        crate::basalt_debug_log!("[TransactionManager::begin] tx {:?}", tid);
        tid
    }

    /// Flushes everything the transaction dirtied, releases its locks, and
    /// seals the outcome with a durable commit marker.
    pub fn commit(&self, tid: TransactionId) -> Result<(), DbError> {
        crate::basalt_debug_log!("[TransactionManager::commit] tx {:?}", tid);
        self.pool.transaction_complete(tid, true)?;
        self.log.log_commit(tid)?;
        self.log.force()?;
        Ok(())
    }

    /// Drops everything the transaction dirtied and releases its locks.
    pub fn abort(&self, tid: TransactionId) -> Result<(), DbError> {
        crate::basalt_debug_log!("[TransactionManager::abort] tx {:?}", tid);
        self.pool.transaction_complete(tid, false)?;
        self.log.log_abort(tid)?;
        Ok(())
    }
}
