//! The page cache: bounded residency, lock acquisition on behalf of
//! callers, and the commit/abort write-back paths.
//!
//! Cache state is serialized under one mutex; real concurrency between
//! transactions comes from the per-page locks. Eviction is NO STEAL: a
//! page dirtied by an uncommitted transaction never leaves the cache, so
//! disk only ever holds committed images and freshly zeroed pages.

use crate::catalog::Catalog;
use crate::errors::DbError;
use crate::lock_manager::{LockManager, LockMode};
use crate::page::HeapPage;
use crate::transaction::TransactionId;
use crate::tuple::Tuple;
use crate::wal::LogFile;
use crate::{PageId, Permissions, TableId};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Default cache capacity, in pages.
pub const DEFAULT_POOL_PAGES: usize = 50;

/// A cached page, shared between the pool and its callers.
pub type PageRef = Arc<RwLock<HeapPage>>;

#[derive(Default)]
struct PoolInner {
    resident: HashMap<PageId, PageRef>,
    /// Most recently used first.
    order: VecDeque<PageId>,
}

impl PoolInner {
    fn touch(&mut self, pid: PageId) {
        self.order.retain(|p| *p != pid);
        self.order.push_front(pid);
    }

    fn remove(&mut self, pid: PageId) {
        self.resident.remove(&pid);
        self.order.retain(|p| *p != pid);
    }
}

pub struct BufferPool {
    capacity: usize,
    inner: Mutex<PoolInner>,
    locks: LockManager,
    catalog: Arc<Catalog>,
    log: Arc<dyn LogFile>,
}

impl BufferPool {
    pub fn new(capacity: usize, catalog: Arc<Catalog>, log: Arc<dyn LogFile>) -> Self {
        Self {
            capacity,
            inner: Mutex::new(PoolInner::default()),
            locks: LockManager::new(),
            catalog,
            log,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fetches a page on behalf of `tid`, taking the matching page lock
    /// first. Blocks while another transaction holds a conflicting lock
    /// and aborts the caller if the wait times out.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permissions,
    ) -> Result<PageRef, DbError> {
        let mode = match perm {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        };
        self.locks.acquire_lock(tid, pid, mode)?;

        let mut inner = self.inner.lock();
        if let Some(page) = inner.resident.get(&pid).cloned() {
            inner.touch(pid);
            return Ok(page);
        }

        if inner.resident.len() >= self.capacity {
            self.evict_page(&mut inner)?;
        }
        let file = self.catalog.file(pid.table_id)?;
        let page = Arc::new(RwLock::new(file.read_page(pid)?));
        inner.resident.insert(pid, page.clone());
        inner.order.push_front(pid);
        Ok(page)
    }

    /// Routes the insert through the table's file, then marks and admits
    /// every mutated page.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: Tuple,
    ) -> Result<(), DbError> {
        let file = self.catalog.file(table_id)?;
        let pages = file.insert_tuple(tid, tuple, self)?;
        self.admit_dirty(tid, pages)
    }

    /// Deletes the tuple from the table its record id names.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<(), DbError> {
        let rid = tuple.record_id().ok_or(DbError::TupleNotOnPage)?;
        let file = self.catalog.file(rid.page_id.table_id)?;
        let pages = file.delete_tuple(tid, tuple, self)?;
        self.admit_dirty(tid, pages)
    }

    fn admit_dirty(&self, tid: TransactionId, pages: Vec<PageRef>) -> Result<(), DbError> {
        for page_ref in pages {
            let mut inner = self.inner.lock();
            let pid = {
                let mut page = page_ref.write();
                page.mark_dirty(Some(tid));
                page.id()
            };
            if !inner.resident.contains_key(&pid) {
                if inner.resident.len() >= self.capacity {
                    self.evict_page(&mut inner)?;
                }
                inner.resident.insert(pid, page_ref.clone());
                inner.order.push_front(pid);
            }
        }
        Ok(())
    }

    /// Drops both lock strengths for `(tid, pid)`. Meant for recovery and
    /// tests only: releasing before completion breaks two-phase locking.
    pub fn unsafe_release_page(&self, tid: TransactionId, pid: PageId) {
        self.locks.release_lock(tid, pid, LockMode::Shared);
        self.locks.release_lock(tid, pid, LockMode::Exclusive);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.locks.holds_lock(tid, pid)
    }

    /// Commit or abort: write back or drop every page `tid` dirtied, then
    /// release all of its locks.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<(), DbError> {
        crate::basalt_debug_log!(
            "[BufferPool::transaction_complete] tx {:?} commit={}",
            tid,
            commit
        );
        // Snapshot the target set first; flushing mutates the resident map.
        let dirtied: Vec<PageId> = {
            let inner = self.inner.lock();
            inner
                .resident
                .iter()
                .filter(|(_, page)| page.read().dirtied_by() == Some(tid))
                .map(|(pid, _)| *pid)
                .collect()
        };

        for pid in dirtied {
            if commit {
                {
                    let inner = self.inner.lock();
                    if let Some(page) = inner.resident.get(&pid) {
                        page.write().set_before_image();
                    }
                }
                self.flush_page(pid)?;
            } else {
                self.discard_page(pid);
            }
        }

        for pid in self.locks.pages_held_by(tid) {
            self.unsafe_release_page(tid, pid);
        }
        Ok(())
    }

    /// Writes every resident dirty page back. Breaks NO STEAL for pages
    /// owned by running transactions; recovery and shutdown use this.
    pub fn flush_all_pages(&self) -> Result<(), DbError> {
        let pids: Vec<PageId> = self.inner.lock().resident.keys().copied().collect();
        for pid in pids {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Writes back every page dirtied by `tid`.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<(), DbError> {
        let pids: Vec<PageId> = {
            let inner = self.inner.lock();
            inner
                .resident
                .iter()
                .filter(|(_, page)| page.read().dirtied_by() == Some(tid))
                .map(|(pid, _)| *pid)
                .collect()
        };
        for pid in pids {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Drops a cache entry without writing it back.
    pub fn discard_page(&self, pid: PageId) {
        self.inner.lock().remove(pid);
    }

    fn flush_page(&self, pid: PageId) -> Result<(), DbError> {
        let mut inner = self.inner.lock();
        self.flush_page_locked(&mut inner, pid)
    }

    /// Log first, force, then write the page; clean pages are left alone.
    /// The dirty check lives inside the critical section so a concurrent
    /// completion cannot slip between check and write.
    fn flush_page_locked(&self, inner: &mut PoolInner, pid: PageId) -> Result<(), DbError> {
        let Some(page_ref) = inner.resident.get(&pid).cloned() else {
            return Ok(());
        };
        let mut page = page_ref.write();
        let Some(tid) = page.dirtied_by() else {
            return Ok(());
        };

        let after = page.page_data();
        self.log.log_write(tid, pid, page.before_image(), &after)?;
        self.log.force()?;
        let file = self.catalog.file(pid.table_id)?;
        file.write_page(&page)?;

        inner.remove(pid);
        page.mark_dirty(None);
        page.set_before_image();
        Ok(())
    }

    /// Evicts the least recently used clean page. With every resident page
    /// dirty the cache cannot give up anything without exposing
    /// uncommitted writes, so the caller's operation fails instead.
    fn evict_page(&self, inner: &mut PoolInner) -> Result<(), DbError> {
        let victim = inner
            .order
            .iter()
            .rev()
            .find(|pid| {
                inner
                    .resident
                    .get(*pid)
                    .is_some_and(|page| page.read().dirtied_by().is_none())
            })
            .copied();
        match victim {
            Some(pid) => {
                crate::basalt_debug_log!("[BufferPool::evict_page] evicting clean page {:?}", pid);
                inner.remove(pid);
                Ok(())
            }
            None => Err(DbError::EvictFailed),
        }
    }

    #[cfg(test)]
    fn resident_pages(&self) -> Vec<PageId> {
        self.inner.lock().resident.keys().copied().collect()
    }
}
