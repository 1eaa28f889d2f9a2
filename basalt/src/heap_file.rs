//! Heap files: unordered tuple storage as a flat run of fixed-size pages.

use crate::buffer_pool::{BufferPool, PageRef};
use crate::errors::DbError;
use crate::page::HeapPage;
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};
use crate::{PageId, Permissions, TableId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

/// The capability set every table file variant offers. All page fetches on
/// the mutation and scan paths go through the buffer pool so the caller's
/// transaction picks up the right locks.
pub trait DbFile: Send + Sync {
    fn id(&self) -> TableId;

    fn tuple_desc(&self) -> &TupleDesc;

    /// Reads a page image straight from disk, bypassing the cache.
    fn read_page(&self, pid: PageId) -> Result<HeapPage, DbError>;

    /// Writes a page image straight to disk, bypassing the cache.
    fn write_page(&self, page: &HeapPage) -> Result<(), DbError>;

    fn num_pages(&self) -> usize;

    /// Stores the tuple somewhere in the file, growing it if every page is
    /// full. Returns the pages the operation mutated.
    fn insert_tuple(
        &self,
        tid: TransactionId,
        tuple: Tuple,
        pool: &BufferPool,
    ) -> Result<Vec<PageRef>, DbError>;

    /// Clears the slot the tuple's record id names. Returns the pages the
    /// operation mutated.
    fn delete_tuple(
        &self,
        tid: TransactionId,
        tuple: &Tuple,
        pool: &BufferPool,
    ) -> Result<Vec<PageRef>, DbError>;

    /// A restartable scan over every stored tuple, fetching pages with
    /// shared locks on behalf of `tid`.
    fn iterator<'p>(
        self: Arc<Self>,
        tid: TransactionId,
        pool: &'p BufferPool,
    ) -> Box<dyn DbFileIterator + 'p>;
}

/// Cursor over a file's tuples.
///
/// `has_next` is idempotent, `next` yields even without a preceding
/// `has_next`, `rewind` restarts from the first page, and after `close`
/// `has_next` answers false and `next` fails.
pub trait DbFileIterator {
    fn open(&mut self) -> Result<(), DbError>;
    fn has_next(&mut self) -> Result<bool, DbError>;
    fn next(&mut self) -> Result<Tuple, DbError>;
    fn rewind(&mut self) -> Result<(), DbError>;
    fn close(&mut self);
}

/// A table stored as N contiguous pages in one file. Page `n` lives at
/// byte offset `n * page_size`; the file grows by appending zeroed pages.
pub struct HeapFile {
    path: PathBuf,
    file: Mutex<File>,
    desc: TupleDesc,
    id: TableId,
    page_size: usize,
}

impl HeapFile {
    /// Opens (creating if absent) a heap file whose table id is the stable
    /// hash of its absolute path.
    pub fn open<P: AsRef<Path>>(path: P, desc: TupleDesc) -> io::Result<Self> {
        Self::build(path, desc, None)
    }

    /// Opens a heap file under a caller-chosen table id, for tables whose
    /// id the catalog assigns.
    pub fn with_id<P: AsRef<Path>>(path: P, desc: TupleDesc, id: TableId) -> io::Result<Self> {
        Self::build(path, desc, Some(id))
    }

    fn build<P: AsRef<Path>>(path: P, desc: TupleDesc, id: Option<TableId>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;
        let path = path.as_ref().canonicalize()?;
        let id = id.unwrap_or_else(|| xxh3_64(path.to_string_lossy().as_bytes()));
        let page_size = crate::page_size();
        crate::basalt_debug_log!("[HeapFile::build] opened {path:?} as table {id}");
        Ok(Self {
            path,
            file: Mutex::new(file),
            desc,
            id,
            page_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one zeroed page past the current end of the file and returns
    /// its page number. Holding the file mutex across the length check and
    /// the write makes concurrent growth hand out distinct pages.
    fn append_blank_page(&self) -> io::Result<usize> {
        let mut file = self.file.lock();
        let len = file.metadata()?.len();
        let page_no = (len as usize).div_ceil(self.page_size);
        file.seek(SeekFrom::Start((page_no * self.page_size) as u64))?;
        file.write_all(&HeapPage::empty_data(self.page_size))?;
        file.sync_all()?;
        crate::basalt_debug_log!(
            "[HeapFile::append_blank_page] table {} grew to page {}",
            self.id,
            page_no
        );
        Ok(page_no)
    }
}

impl DbFile for HeapFile {
    fn id(&self) -> TableId {
        self.id
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }

    fn read_page(&self, pid: PageId) -> Result<HeapPage, DbError> {
        let mut buf = vec![0u8; self.page_size];
        let offset = (pid.page_no * self.page_size) as u64;
        {
            let mut file = self.file.lock();
            let len = file.metadata()?.len();
            if offset < len {
                // A short tail (a partially written final page) is padded
                // with zeros.
                let want = ((len - offset) as usize).min(self.page_size);
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut buf[..want])?;
            } else {
                crate::basalt_debug_log!(
                    "[HeapFile::read_page] page {} of table {} is past the end, zero image",
                    pid.page_no,
                    self.id
                );
            }
        }
        HeapPage::parse(pid, &buf, self.desc.clone())
    }

    fn write_page(&self, page: &HeapPage) -> Result<(), DbError> {
        let offset = (page.id().page_no * self.page_size) as u64;
        let data = page.page_data();
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&data)?;
        file.sync_all()?;
        Ok(())
    }

    fn num_pages(&self) -> usize {
        let file = self.file.lock();
        let len = file.metadata().map(|meta| meta.len()).unwrap_or(0);
        (len as usize).div_ceil(self.page_size)
    }

    fn insert_tuple(
        &self,
        tid: TransactionId,
        tuple: Tuple,
        pool: &BufferPool,
    ) -> Result<Vec<PageRef>, DbError> {
        if tuple.tuple_desc() != &self.desc {
            return Err(DbError::SchemaMismatch);
        }

        let mut target = None;
        for page_no in 0..self.num_pages() {
            let pid = PageId::new(self.id, page_no);
            let page_ref = pool.get_page(tid, pid, Permissions::ReadWrite)?;
            if page_ref.read().empty_slot_count() > 0 {
                target = Some(page_ref);
                break;
            }
        }

        let page_ref = match target {
            Some(page_ref) => page_ref,
            None => {
                let page_no = self.append_blank_page()?;
                pool.get_page(tid, PageId::new(self.id, page_no), Permissions::ReadWrite)?
            }
        };
        page_ref.write().insert_tuple(tuple)?;
        Ok(vec![page_ref])
    }

    fn delete_tuple(
        &self,
        tid: TransactionId,
        tuple: &Tuple,
        pool: &BufferPool,
    ) -> Result<Vec<PageRef>, DbError> {
        let rid = tuple.record_id().ok_or(DbError::TupleNotOnPage)?;
        if rid.page_id.table_id != self.id {
            return Err(DbError::TupleNotOnPage);
        }
        let page_ref = pool.get_page(tid, rid.page_id, Permissions::ReadWrite)?;
        page_ref.write().delete_tuple(tuple)?;
        Ok(vec![page_ref])
    }

    fn iterator<'p>(
        self: Arc<Self>,
        tid: TransactionId,
        pool: &'p BufferPool,
    ) -> Box<dyn DbFileIterator + 'p> {
        Box::new(HeapFileIterator {
            file: self,
            pool,
            tid,
            page_cursor: 0,
            current: None,
        })
    }
}

/// Walks pages 0..numPages in order, buffering one page's tuples at a
/// time. Empty pages are skipped transparently.
pub struct HeapFileIterator<'p> {
    file: Arc<HeapFile>,
    pool: &'p BufferPool,
    tid: TransactionId,
    page_cursor: usize,
    current: Option<VecDeque<Tuple>>,
}

impl HeapFileIterator<'_> {
    fn load_page(&mut self) -> Result<(), DbError> {
        let pid = PageId::new(self.file.id, self.page_cursor);
        let page_ref = self.pool.get_page(self.tid, pid, Permissions::ReadOnly)?;
        let page = page_ref.read();
        self.current = Some(page.iter().cloned().collect());
        Ok(())
    }
}

impl DbFileIterator for HeapFileIterator<'_> {
    fn open(&mut self) -> Result<(), DbError> {
        self.page_cursor = 0;
        if self.file.num_pages() == 0 {
            self.current = None;
            return Ok(());
        }
        self.load_page()
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        loop {
            match &self.current {
                None => return Ok(false),
                Some(buffered) if !buffered.is_empty() => return Ok(true),
                Some(_) => {}
            }
            self.page_cursor += 1;
            if self.page_cursor >= self.file.num_pages() {
                self.current = None;
                return Ok(false);
            }
            self.load_page()?;
        }
    }

    fn next(&mut self) -> Result<Tuple, DbError> {
        loop {
            if self.current.is_none() {
                return Err(DbError::NoSuchElement);
            }
            if let Some(tuple) = self.current.as_mut().and_then(|q| q.pop_front()) {
                return Ok(tuple);
            }
            self.page_cursor += 1;
            if self.page_cursor >= self.file.num_pages() {
                self.current = None;
                return Err(DbError::NoSuchElement);
            }
            self.load_page()?;
        }
    }

    fn rewind(&mut self) -> Result<(), DbError> {
        self.page_cursor = 0;
        if self.file.num_pages() == 0 {
            self.current = None;
            return Ok(());
        }
        self.load_page()
    }

    fn close(&mut self) {
        self.current = None;
    }
}
