//! The operator iterator contract and shared building blocks.

use crate::errors::ExecutionError;
use basalt::tuple::{Tuple, TupleDesc};

pub mod dml;
pub mod scan;

pub use dml::{Delete, Insert};
pub use scan::SeqScan;

/// The volcano-style iterator every operator implements.
///
/// `has_next` is idempotent: repeated calls give the same answer until
/// `next` advances. `next` without a preceding `has_next` still yields a
/// tuple when one exists, and fails with `NoSuchElement` after `close`.
pub trait OpIterator {
    fn open(&mut self) -> Result<(), ExecutionError>;
    fn has_next(&mut self) -> Result<bool, ExecutionError>;
    fn next(&mut self) -> Result<Tuple, ExecutionError>;
    fn rewind(&mut self) -> Result<(), ExecutionError>;
    fn close(&mut self);
    fn tuple_desc(&self) -> &TupleDesc;
}

/// An operator over an in-memory tuple list; aggregation results and test
/// inputs are served through this.
pub struct TupleIterator {
    desc: TupleDesc,
    tuples: Vec<Tuple>,
    cursor: usize,
    opened: bool,
}

impl TupleIterator {
    pub fn new(desc: TupleDesc, tuples: Vec<Tuple>) -> Self {
        Self {
            desc,
            tuples,
            cursor: 0,
            opened: false,
        }
    }
}

impl OpIterator for TupleIterator {
    fn open(&mut self) -> Result<(), ExecutionError> {
        self.cursor = 0;
        self.opened = true;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, ExecutionError> {
        Ok(self.opened && self.cursor < self.tuples.len())
    }

    fn next(&mut self) -> Result<Tuple, ExecutionError> {
        if !self.opened || self.cursor >= self.tuples.len() {
            return Err(ExecutionError::NoSuchElement);
        }
        let tuple = self.tuples[self.cursor].clone();
        self.cursor += 1;
        Ok(tuple)
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        self.cursor = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.opened = false;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
