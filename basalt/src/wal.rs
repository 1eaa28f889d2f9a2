//! The undo/redo page log.
//!
//! The buffer pool appends a record carrying both full page images before
//! any dirty page reaches disk, and the transaction controller seals each
//! outcome with a commit or abort marker.

use crate::catalog::Catalog;
use crate::errors::DbError;
use crate::page::HeapPage;
use crate::transaction::TransactionId;
use crate::PageId;
use crc32fast::Hasher;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A Log Sequence Number: the byte offset of a record in the log file.
pub type Lsn = u64;

/// The contract the kernel logs through. The envelope on disk is the
/// implementation's business; the kernel only promises to call `force`
/// before writing the corresponding page.
pub trait LogFile: Send + Sync {
    /// Appends an undo/redo record carrying both page images.
    fn log_write(
        &self,
        tid: TransactionId,
        pid: PageId,
        before: &[u8],
        after: &[u8],
    ) -> io::Result<Lsn>;

    fn log_commit(&self, tid: TransactionId) -> io::Result<Lsn>;

    fn log_abort(&self, tid: TransactionId) -> io::Result<Lsn>;

    /// Makes everything appended so far durable.
    fn force(&self) -> io::Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogRecord {
    /// A page changed: both images, for undo and redo.
    Update {
        tid: TransactionId,
        page_id: PageId,
        before: Vec<u8>,
        after: Vec<u8>,
    },
    Commit { tid: TransactionId },
    Abort { tid: TransactionId },
}

// u32 body length + u32 crc.
const FRAME_HEADER_LEN: usize = 8;

/// Points in the log's write path where tests can arm a failure, standing
/// in for a full disk or a crashed device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogFailure {
    Append,
    Force,
}

struct LogInner {
    file: File,
    next_lsn: Lsn,
}

/// Append-only log of length-and-checksum framed, bincode-encoded records.
pub struct UndoRedoLog {
    inner: Mutex<LogInner>,
    armed_failures: Mutex<HashSet<LogFailure>>,
}

impl UndoRedoLog {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;
        let next_lsn = file.metadata()?.len();
        crate::basalt_debug_log!(
            "[UndoRedoLog::open] {:?}, next lsn {}",
            path.as_ref(),
            next_lsn
        );
        Ok(Self {
            inner: Mutex::new(LogInner { file, next_lsn }),
            armed_failures: Mutex::new(HashSet::new()),
        })
    }

    /// Makes every operation at `point` fail until [`disarm_failures`]
    /// is called.
    ///
    /// [`disarm_failures`]: UndoRedoLog::disarm_failures
    pub fn arm_failure(&self, point: LogFailure) {
        self.armed_failures.lock().insert(point);
    }

    pub fn disarm_failures(&self) {
        self.armed_failures.lock().clear();
    }

    fn check_armed(&self, point: LogFailure) -> io::Result<()> {
        if self.armed_failures.lock().contains(&point) {
            return Err(io::Error::other(format!("injected {point:?} failure")));
        }
        Ok(())
    }

    fn append(&self, record: &LogRecord) -> io::Result<Lsn> {
        self.check_armed(LogFailure::Append)?;
        let body = bincode::serialize(record).map_err(io::Error::other)?;
        let mut hasher = Hasher::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        let mut inner = self.inner.lock();
        let lsn = inner.next_lsn;
        inner.file.seek(SeekFrom::Start(lsn))?;
        inner.file.write_all(&(body.len() as u32).to_le_bytes())?;
        inner.file.write_all(&crc.to_le_bytes())?;
        inner.file.write_all(&body)?;
        inner.next_lsn = lsn + (FRAME_HEADER_LEN + body.len()) as u64;
        Ok(lsn)
    }

    /// Every record currently in the log, oldest first.
    pub fn records(&self) -> io::Result<Vec<LogRecord>> {
        let mut buf = Vec::new();
        {
            let mut inner = self.inner.lock();
            inner.file.seek(SeekFrom::Start(0))?;
            inner.file.read_to_end(&mut buf)?;
        }

        let mut records = Vec::new();
        let mut pos = 0;
        while pos + FRAME_HEADER_LEN <= buf.len() {
            let len = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
            let crc = u32::from_le_bytes(buf[pos + 4..pos + 8].try_into().unwrap());
            let start = pos + FRAME_HEADER_LEN;
            let end = start + len;
            if end > buf.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "truncated log record",
                ));
            }
            let body = &buf[start..end];
            let mut hasher = Hasher::new();
            hasher.update(body);
            if hasher.finalize() != crc {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "log record checksum mismatch",
                ));
            }
            let record = bincode::deserialize(body)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
            records.push(record);
            pos = end;
        }
        Ok(records)
    }

    /// Reapplies committed after-images in log order, then walks the log
    /// backwards restoring before-images of transactions that never
    /// committed. Every touched table must already be registered with the
    /// catalog.
    pub fn replay(&self, catalog: &Catalog) -> Result<(), DbError> {
        let records = self.records()?;

        let mut committed = HashSet::new();
        for record in &records {
            if let LogRecord::Commit { tid } = record {
                committed.insert(*tid);
            }
        }

        for record in &records {
            if let LogRecord::Update {
                tid,
                page_id,
                after,
                ..
            } = record
            {
                if committed.contains(tid) {
                    Self::restore(catalog, *page_id, after)?;
                }
            }
        }

        for record in records.iter().rev() {
            if let LogRecord::Update {
                tid,
                page_id,
                before,
                ..
            } = record
            {
                if !committed.contains(tid) {
                    crate::basalt_debug_log!(
                        "[UndoRedoLog::replay] undoing page {:?} for tx {:?}",
                        page_id,
                        tid
                    );
                    Self::restore(catalog, *page_id, before)?;
                }
            }
        }
        Ok(())
    }

    fn restore(catalog: &Catalog, pid: PageId, image: &[u8]) -> Result<(), DbError> {
        let file = catalog.file(pid.table_id)?;
        let page = HeapPage::parse(pid, image, file.tuple_desc().clone())?;
        file.write_page(&page)
    }
}

impl LogFile for UndoRedoLog {
    fn log_write(
        &self,
        tid: TransactionId,
        pid: PageId,
        before: &[u8],
        after: &[u8],
    ) -> io::Result<Lsn> {
        crate::basalt_debug_log!(
            "[UndoRedoLog::log_write] tx {:?} page {:?}",
            tid,
            pid
        );
        self.append(&LogRecord::Update {
            tid,
            page_id: pid,
            before: before.to_vec(),
            after: after.to_vec(),
        })
    }

    fn log_commit(&self, tid: TransactionId) -> io::Result<Lsn> {
        self.append(&LogRecord::Commit { tid })
    }

    fn log_abort(&self, tid: TransactionId) -> io::Result<Lsn> {
        self.append(&LogRecord::Abort { tid })
    }

    fn force(&self) -> io::Result<()> {
        self.check_armed(LogFailure::Force)?;
        self.inner.lock().file.sync_all()
    }
}
