#![allow(dead_code)]

use basalt::heap_file::DbFile;
use basalt::transaction::TransactionId;
use basalt::tuple::{Field, FieldType, Tuple, TupleDesc};
use basalt::TableId;
use quarry::executor::{OpIterator, SeqScan};
use quarry::Database;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

/// A database over a scratch directory. Dropping it removes the directory.
pub struct TestDb {
    pub db: Database,
    pub dir: TempDir,
}

pub fn open_db(pool_pages: usize) -> TestDb {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path(), pool_pages).unwrap();
    TestDb { db, dir }
}

pub fn int_desc() -> TupleDesc {
    TupleDesc::new(vec![FieldType::Int])
}

pub fn int_row(value: i32) -> Tuple {
    Tuple::new(int_desc(), vec![Field::Int(value)])
}

/// Creates a single-INT-column table named `name` in the test directory.
pub fn int_table(test_db: &TestDb, name: &str) -> TableId {
    test_db
        .db
        .catalog
        .create_table(test_db.dir.path().join(name), int_desc())
        .unwrap()
        .id()
}

/// Scans the whole table under `tid` and returns its INT column values in
/// storage order.
pub fn scan_ints(test_db: &TestDb, table_id: TableId, tid: TransactionId) -> Vec<i32> {
    let file = test_db.db.catalog.file(table_id).unwrap();
    let mut scan = SeqScan::new(&test_db.db.pool, Arc::clone(&file), tid);
    scan.open().unwrap();
    let mut values = Vec::new();
    while scan.has_next().unwrap() {
        let tuple = scan.next().unwrap();
        match tuple.fields()[0] {
            Field::Int(value) => values.push(value),
            ref other => panic!("unexpected field {other:?}"),
        }
    }
    scan.close();
    values
}

/// Scans the table and returns the stored tuples themselves, record ids
/// included.
pub fn scan_tuples(test_db: &TestDb, table_id: TableId, tid: TransactionId) -> Vec<Tuple> {
    let file = test_db.db.catalog.file(table_id).unwrap();
    let mut scan = SeqScan::new(&test_db.db.pool, Arc::clone(&file), tid);
    scan.open().unwrap();
    let mut tuples = Vec::new();
    while scan.has_next().unwrap() {
        tuples.push(scan.next().unwrap());
    }
    scan.close();
    tuples
}
