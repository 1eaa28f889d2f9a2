use basalt::errors::DbError;
use basalt::heap_file::DbFile;
use basalt::tuple::Field;
use basalt::{PageId, Permissions};
use quarry::aggregate_executor::{AggregateOp, Aggregator, IntegerAggregator};
use quarry::errors::ExecutionError;
use quarry::executor::{Delete, Insert, OpIterator, SeqScan, TupleIterator};
use std::sync::Arc;

mod common;
use common::{int_desc, int_row, int_table, open_db, scan_ints, scan_tuples};

#[test]
fn committed_inserts_are_visible_to_a_later_scan() {
    let t = open_db(16);
    let table = int_table(&t, "s1.tbl");

    let t1 = t.db.tm.begin();
    t.db.pool.insert_tuple(t1, table, int_row(7)).unwrap();
    t.db.pool.insert_tuple(t1, table, int_row(11)).unwrap();
    t.db.tm.commit(t1).unwrap();

    let t2 = t.db.tm.begin();
    assert_eq!(scan_ints(&t, table, t2), vec![7, 11]);
    t.db.tm.commit(t2).unwrap();
}

#[test]
fn insert_operator_reports_the_row_count_once() {
    let t = open_db(16);
    let table = int_table(&t, "ins.tbl");

    let tid = t.db.tm.begin();
    let child = TupleIterator::new(int_desc(), vec![int_row(1), int_row(2), int_row(3)]);
    let mut insert = Insert::new(&t.db.pool, tid, Box::new(child), table);
    insert.open().unwrap();

    assert!(insert.has_next().unwrap());
    let result = insert.next().unwrap();
    assert_eq!(result.fields(), &[Field::Int(3)]);

    assert!(!insert.has_next().unwrap());
    assert!(matches!(insert.next(), Err(ExecutionError::NoSuchElement)));
    insert.close();
    t.db.tm.commit(tid).unwrap();

    let t2 = t.db.tm.begin();
    assert_eq!(scan_ints(&t, table, t2), vec![1, 2, 3]);
    t.db.tm.commit(t2).unwrap();
}

#[test]
fn delete_operator_clears_what_its_child_yields() {
    let t = open_db(16);
    let table = int_table(&t, "del.tbl");

    let t1 = t.db.tm.begin();
    for value in [10, 20, 30, 40] {
        t.db.pool.insert_tuple(t1, table, int_row(value)).unwrap();
    }
    t.db.tm.commit(t1).unwrap();

    let t2 = t.db.tm.begin();
    let doomed: Vec<_> = scan_tuples(&t, table, t2)
        .into_iter()
        .filter(|tuple| matches!(tuple.fields()[0], Field::Int(v) if v >= 30))
        .collect();
    let child = TupleIterator::new(int_desc(), doomed);
    let mut delete = Delete::new(&t.db.pool, t2, Box::new(child));
    delete.open().unwrap();
    assert_eq!(delete.next().unwrap().fields(), &[Field::Int(2)]);
    delete.close();
    t.db.tm.commit(t2).unwrap();

    let t3 = t.db.tm.begin();
    assert_eq!(scan_ints(&t, table, t3), vec![10, 20]);
    t.db.tm.commit(t3).unwrap();
}

#[test]
fn aborted_work_leaves_no_trace() {
    let t = open_db(16);
    let table = int_table(&t, "abort.tbl");

    let t1 = t.db.tm.begin();
    t.db.pool.insert_tuple(t1, table, int_row(99)).unwrap();
    t.db.tm.abort(t1).unwrap();

    let file = t.db.catalog.file(table).unwrap();
    let on_disk = file.read_page(PageId::new(table, 0)).unwrap();
    assert_eq!(on_disk.iter().count(), 0);

    let t2 = t.db.tm.begin();
    assert_eq!(scan_ints(&t, table, t2), Vec::<i32>::new());
    t.db.tm.commit(t2).unwrap();
}

#[test]
fn delete_then_insert_recycles_the_freed_slot() {
    let t = open_db(16);
    let table = int_table(&t, "recycle.tbl");

    let t1 = t.db.tm.begin();
    for value in [1, 2, 3] {
        t.db.pool.insert_tuple(t1, table, int_row(value)).unwrap();
    }
    t.db.tm.commit(t1).unwrap();

    let t2 = t.db.tm.begin();
    let middle = scan_tuples(&t, table, t2)
        .into_iter()
        .find(|tuple| matches!(tuple.fields()[0], Field::Int(2)))
        .unwrap();
    let old_slot = middle.record_id().unwrap().slot;
    t.db.pool.delete_tuple(t2, &middle).unwrap();
    t.db.pool.insert_tuple(t2, table, int_row(22)).unwrap();
    t.db.tm.commit(t2).unwrap();

    let t3 = t.db.tm.begin();
    let replacement = scan_tuples(&t, table, t3)
        .into_iter()
        .find(|tuple| matches!(tuple.fields()[0], Field::Int(22)))
        .unwrap();
    assert_eq!(replacement.record_id().unwrap().slot, old_slot);
    t.db.tm.commit(t3).unwrap();
}

#[test]
fn scan_rewind_restarts_from_the_first_slot() {
    let t = open_db(16);
    let table = int_table(&t, "rewind.tbl");

    let t1 = t.db.tm.begin();
    for value in [5, 6, 7] {
        t.db.pool.insert_tuple(t1, table, int_row(value)).unwrap();
    }
    t.db.tm.commit(t1).unwrap();

    let t2 = t.db.tm.begin();
    let file = t.db.catalog.file(table).unwrap();
    let mut scan = SeqScan::new(&t.db.pool, Arc::clone(&file), t2);
    scan.open().unwrap();
    scan.next().unwrap();
    scan.next().unwrap();

    scan.rewind().unwrap();
    assert_eq!(scan.next().unwrap().fields(), &[Field::Int(5)]);
    scan.close();

    assert!(!scan.has_next().unwrap());
    assert!(matches!(scan.next(), Err(ExecutionError::NoSuchElement)));
    t.db.tm.commit(t2).unwrap();
}

#[test]
fn grouped_aggregation_over_a_table() {
    let t = open_db(16);
    let desc = basalt::tuple::TupleDesc::new(vec![
        basalt::tuple::FieldType::Int,
        basalt::tuple::FieldType::Int,
    ]);
    let file = t
        .db
        .catalog
        .create_table(t.dir.path().join("agg.tbl"), desc.clone())
        .unwrap();
    let table = file.id();

    let t1 = t.db.tm.begin();
    for (group, value) in [(1, 10), (2, 5), (1, 30), (2, 15), (1, 2)] {
        t.db.pool
            .insert_tuple(
                t1,
                table,
                basalt::tuple::Tuple::new(
                    desc.clone(),
                    vec![Field::Int(group), Field::Int(value)],
                ),
            )
            .unwrap();
    }
    t.db.tm.commit(t1).unwrap();

    let t2 = t.db.tm.begin();
    let file = t.db.catalog.file(table).unwrap();
    let mut scan = SeqScan::new(&t.db.pool, Arc::clone(&file), t2);
    scan.open().unwrap();
    let mut agg = IntegerAggregator::new(Some(0), &desc, 1, AggregateOp::Sum);
    while scan.has_next().unwrap() {
        agg.merge(&scan.next().unwrap()).unwrap();
    }
    scan.close();
    t.db.tm.commit(t2).unwrap();

    let mut results = agg.iterator();
    results.open().unwrap();
    let mut rows = Vec::new();
    while results.has_next().unwrap() {
        rows.push(results.next().unwrap().fields().to_vec());
    }
    assert_eq!(
        rows,
        vec![
            vec![Field::Int(1), Field::Int(42)],
            vec![Field::Int(2), Field::Int(20)],
        ]
    );
}

#[test]
fn schema_mismatch_is_rejected_at_insert() {
    let t = open_db(16);
    let table = int_table(&t, "schema.tbl");

    let tid = t.db.tm.begin();
    let wrong = basalt::tuple::Tuple::new(
        basalt::tuple::TupleDesc::new(vec![basalt::tuple::FieldType::Str(8)]),
        vec![Field::Str("nope".to_string())],
    );
    let result = t.db.pool.insert_tuple(tid, table, wrong);
    assert!(matches!(result, Err(DbError::SchemaMismatch)));
    t.db.tm.abort(tid).unwrap();
}

#[test]
fn replay_restores_committed_state_after_a_stray_write() {
    let t = open_db(16);
    let table = int_table(&t, "replay.tbl");

    let t1 = t.db.tm.begin();
    t.db.pool.insert_tuple(t1, table, int_row(1)).unwrap();
    t.db.tm.commit(t1).unwrap();

    // A transaction whose dirty page reaches disk without a commit marker:
    // flush_pages breaks NO STEAL on purpose, standing in for a crash
    // between flush and commit.
    let t2 = t.db.tm.begin();
    let stored = scan_tuples(&t, table, t2);
    t.db.pool.delete_tuple(t2, &stored[0]).unwrap();
    t.db.pool.flush_pages(t2).unwrap();

    let file = t.db.catalog.file(table).unwrap();
    assert_eq!(file.read_page(PageId::new(table, 0)).unwrap().iter().count(), 0);

    t.db.log.replay(&t.db.catalog).unwrap();

    let recovered = file.read_page(PageId::new(table, 0)).unwrap();
    let values: Vec<&Field> = recovered.iter().flat_map(|tu| tu.fields()).collect();
    assert_eq!(values, vec![&Field::Int(1)]);

    // Release t2's locks so the directory can wind down cleanly.
    t.db.pool.transaction_complete(t2, false).unwrap();
}

#[test]
fn locks_are_visible_while_held_and_gone_after_commit() {
    let t = open_db(16);
    let table = int_table(&t, "locks.tbl");

    let tid = t.db.tm.begin();
    t.db.pool.insert_tuple(tid, table, int_row(1)).unwrap();
    let pid = PageId::new(table, 0);
    assert!(t.db.pool.holds_lock(tid, pid));

    t.db.tm.commit(tid).unwrap();
    assert!(!t.db.pool.holds_lock(tid, pid));

    let t2 = t.db.tm.begin();
    t.db.pool.get_page(t2, pid, Permissions::ReadOnly).unwrap();
    assert!(t.db.pool.holds_lock(t2, pid));
    t.db.tm.commit(t2).unwrap();
}
