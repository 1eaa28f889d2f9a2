use super::OpIterator;
use crate::errors::ExecutionError;
use basalt::buffer_pool::BufferPool;
use basalt::heap_file::{DbFile, DbFileIterator};
use basalt::transaction::TransactionId;
use basalt::tuple::{Tuple, TupleDesc};
use std::sync::Arc;

/// Sequential scan: walks every tuple of a table in slot order, fetching
/// pages with shared locks on behalf of the scanning transaction.
pub struct SeqScan<'p> {
    pool: &'p BufferPool,
    file: Arc<dyn DbFile>,
    tid: TransactionId,
    iter: Option<Box<dyn DbFileIterator + 'p>>,
}

impl<'p> SeqScan<'p> {
    pub fn new(pool: &'p BufferPool, file: Arc<dyn DbFile>, tid: TransactionId) -> Self {
        Self {
            pool,
            file,
            tid,
            iter: None,
        }
    }
}

impl OpIterator for SeqScan<'_> {
    fn open(&mut self) -> Result<(), ExecutionError> {
        let mut iter = self.file.clone().iterator(self.tid, self.pool);
        iter.open()?;
        self.iter = Some(iter);
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, ExecutionError> {
        match self.iter.as_mut() {
            Some(iter) => Ok(iter.has_next()?),
            None => Ok(false),
        }
    }

    fn next(&mut self) -> Result<Tuple, ExecutionError> {
        let iter = self.iter.as_mut().ok_or(ExecutionError::NoSuchElement)?;
        Ok(iter.next()?)
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        let iter = self.iter.as_mut().ok_or(ExecutionError::NoSuchElement)?;
        Ok(iter.rewind()?)
    }

    fn close(&mut self) {
        if let Some(mut iter) = self.iter.take() {
            iter.close();
        }
    }

    fn tuple_desc(&self) -> &TupleDesc {
        self.file.tuple_desc()
    }
}
