//! # Basalt Storage Kernel
//! The storage engine for the Quarry database.
//! This crate owns the on-disk heap format, the page cache, and the
//! concurrency control that keeps concurrent transactions serializable.

/// The page cache and the commit/abort write-back paths.
pub mod buffer_pool;
/// The table registry.
pub mod catalog;
/// The kernel error taxonomy.
pub mod errors;
/// Heap files and their iterators.
pub mod heap_file;
/// Per-page locks for strict two-phase locking.
pub mod lock_manager;
/// The slotted heap page layout.
pub mod page;
/// Transaction identities and the commit/abort controller.
pub mod transaction;
/// Tuples, field values, and schemas.
pub mod tuple;
/// The undo/redo page log.
pub mod wal;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// The default size of a single page in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// Bytes per page. Heap files sample this once when they are opened.
pub fn page_size() -> usize {
    PAGE_SIZE.load(Ordering::SeqCst)
}

/// Overrides the page size. Only tests should call this.
pub fn set_page_size(bytes: usize) {
    PAGE_SIZE.store(bytes, Ordering::SeqCst);
}

/// Restores the default page size. Only tests should call this.
pub fn reset_page_size() {
    PAGE_SIZE.store(DEFAULT_PAGE_SIZE, Ordering::SeqCst);
}

/// A unique identifier for a table. Heap files derive theirs from the
/// backing file's absolute path unless the catalog assigns one explicitly.
pub type TableId = u64;

/// Identifies a page within a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId {
    pub table_id: TableId,
    pub page_no: usize,
}

impl PageId {
    pub fn new(table_id: TableId, page_no: usize) -> Self {
        Self { table_id, page_no }
    }
}

/// Identifies one stored tuple: a slot on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

/// The access level a transaction requests on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

pub use buffer_pool::{BufferPool, PageRef};
pub use page::HeapPage;
pub use transaction::TransactionId;

pub fn debug_logs_enabled() -> bool {
    std::env::var_os("BASALT_DEBUG_LOG").is_some()
}

#[macro_export]
macro_rules! basalt_debug_log {
    ($($arg:tt)*) => {
        if $crate::debug_logs_enabled() {
            println!($($arg)*);
        }
    };
}
