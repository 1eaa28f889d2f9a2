//! # Quarry
//! Operator layer for the Basalt storage kernel: sequential scans, insert
//! and delete executors, integer aggregation, and the wiring that ties a
//! catalog, buffer pool, log, and transaction controller to a data
//! directory.

pub mod aggregate_executor;
pub mod errors;
pub mod executor;

use basalt::buffer_pool::{BufferPool, DEFAULT_POOL_PAGES};
use basalt::catalog::Catalog;
use basalt::transaction::TransactionManager;
use basalt::wal::UndoRedoLog;
use std::io;
use std::path::Path;
use std::sync::Arc;

pub fn debug_logs_enabled() -> bool {
    std::env::var_os("QUARRY_DEBUG_LOG").is_some()
}

#[macro_export]
macro_rules! quarry_debug_log {
    ($($arg:tt)*) => {
        if $crate::debug_logs_enabled() {
            println!($($arg)*);
        }
    };
}

/// One database instance: a catalog of tables, a page cache bounded to
/// `pool_pages`, the undo/redo log, and the transaction controller.
pub struct Database {
    pub catalog: Arc<Catalog>,
    pub pool: Arc<BufferPool>,
    pub log: Arc<UndoRedoLog>,
    pub tm: TransactionManager,
}

impl Database {
    /// Opens a database rooted at `dir`, creating the log file if absent.
    pub fn open<P: AsRef<Path>>(dir: P, pool_pages: usize) -> io::Result<Self> {
        let catalog = Arc::new(Catalog::new());
        let log = Arc::new(UndoRedoLog::open(dir.as_ref().join("quarry.log"))?);
        let pool = Arc::new(BufferPool::new(pool_pages, catalog.clone(), log.clone()));
        let tm = TransactionManager::new(pool.clone(), log.clone());
        crate::quarry_debug_log!("[Database::open] rooted at {:?}", dir.as_ref());
        Ok(Self {
            catalog,
            pool,
            log,
            tm,
        })
    }

    /// Opens a database with the default cache capacity.
    pub fn open_default<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        Self::open(dir, DEFAULT_POOL_PAGES)
    }
}
