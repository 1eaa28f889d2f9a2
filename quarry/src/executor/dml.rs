use super::OpIterator;
use crate::errors::ExecutionError;
use basalt::buffer_pool::BufferPool;
use basalt::transaction::TransactionId;
use basalt::tuple::{Field, FieldType, Tuple, TupleDesc};
use basalt::TableId;

fn count_desc() -> TupleDesc {
    TupleDesc::new(vec![FieldType::Int])
}

/// Drains its child into the target table through the buffer pool, then
/// yields a single one-field tuple holding the inserted-row count.
pub struct Insert<'p> {
    pool: &'p BufferPool,
    tid: TransactionId,
    table_id: TableId,
    child: Box<dyn OpIterator + 'p>,
    desc: TupleDesc,
    opened: bool,
    done: bool,
}

impl<'p> Insert<'p> {
    pub fn new(
        pool: &'p BufferPool,
        tid: TransactionId,
        child: Box<dyn OpIterator + 'p>,
        table_id: TableId,
    ) -> Self {
        Self {
            pool,
            tid,
            table_id,
            child,
            desc: count_desc(),
            opened: false,
            done: false,
        }
    }
}

impl OpIterator for Insert<'_> {
    fn open(&mut self) -> Result<(), ExecutionError> {
        self.child.open()?;
        self.opened = true;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, ExecutionError> {
        Ok(self.opened && !self.done)
    }

    fn next(&mut self) -> Result<Tuple, ExecutionError> {
        if !self.opened || self.done {
            return Err(ExecutionError::NoSuchElement);
        }
        let mut count = 0;
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            self.pool.insert_tuple(self.tid, self.table_id, tuple)?;
            count += 1;
        }
        self.done = true;
        crate::quarry_debug_log!("[Insert] tx {:?} stored {} rows", self.tid, count);
        Ok(Tuple::new(self.desc.clone(), vec![Field::Int(count)]))
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        self.child.rewind()
    }

    fn close(&mut self) {
        self.opened = false;
        self.child.close();
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}

/// Drains its child, deleting each tuple from the table its record id
/// names, then yields a single one-field count tuple.
pub struct Delete<'p> {
    pool: &'p BufferPool,
    tid: TransactionId,
    child: Box<dyn OpIterator + 'p>,
    desc: TupleDesc,
    opened: bool,
    done: bool,
}

impl<'p> Delete<'p> {
    pub fn new(pool: &'p BufferPool, tid: TransactionId, child: Box<dyn OpIterator + 'p>) -> Self {
        Self {
            pool,
            tid,
            child,
            desc: count_desc(),
            opened: false,
            done: false,
        }
    }
}

impl OpIterator for Delete<'_> {
    fn open(&mut self) -> Result<(), ExecutionError> {
        self.child.open()?;
        self.opened = true;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, ExecutionError> {
        Ok(self.opened && !self.done)
    }

    fn next(&mut self) -> Result<Tuple, ExecutionError> {
        if !self.opened || self.done {
            return Err(ExecutionError::NoSuchElement);
        }
        let mut count = 0;
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            self.pool.delete_tuple(self.tid, &tuple)?;
            count += 1;
        }
        self.done = true;
        crate::quarry_debug_log!("[Delete] tx {:?} removed {} rows", self.tid, count);
        Ok(Tuple::new(self.desc.clone(), vec![Field::Int(count)]))
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        self.child.rewind()
    }

    fn close(&mut self) {
        self.opened = false;
        self.child.close();
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
