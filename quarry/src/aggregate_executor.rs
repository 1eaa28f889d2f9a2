//! Integer aggregation over tuple streams.

use crate::errors::ExecutionError;
use crate::executor::TupleIterator;
use basalt::errors::DbError;
use basalt::tuple::{Field, FieldType, Tuple, TupleDesc};
use linked_hash_map::LinkedHashMap;

/// The supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl AggregateOp {
    /// Column label for the result field.
    pub fn result_name(&self) -> &'static str {
        match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
        }
    }
}

/// Merges tuples one at a time and serves the grouped results.
pub trait Aggregator {
    fn merge(&mut self, tuple: &Tuple) -> Result<(), ExecutionError>;
    fn iterator(&self) -> TupleIterator;
}

// Stand-in group key when no grouping was requested.
const NO_GROUP_KEY: Field = Field::Int(-1);

/// Computes one aggregate over an integer column, optionally grouped by
/// another column. Groups report in first-seen order.
pub struct IntegerAggregator {
    group_field: Option<usize>,
    agg_field: usize,
    op: AggregateOp,
    desc: TupleDesc,
    groups: LinkedHashMap<Field, RunningAggregate>,
}

impl IntegerAggregator {
    /// `group_field` names the input column whose values partition the
    /// stream, or `None` to fold everything into one result. The output
    /// schema is derived from `input_desc`: the group column keeps its
    /// type and name, and the result column is named after the function.
    pub fn new(
        group_field: Option<usize>,
        input_desc: &TupleDesc,
        agg_field: usize,
        op: AggregateOp,
    ) -> Self {
        let result_column = (
            FieldType::Int,
            Some(op.result_name().to_string()),
        );
        let desc = match group_field {
            Some(index) => {
                let group_type = input_desc.field_type(index).unwrap_or(FieldType::Int);
                let group_name = input_desc.field_name(index).map(str::to_string);
                TupleDesc::with_names(vec![(group_type, group_name), result_column])
            }
            None => TupleDesc::with_names(vec![result_column]),
        };
        Self {
            group_field,
            agg_field,
            op,
            desc,
            groups: LinkedHashMap::new(),
        }
    }
}

impl Aggregator for IntegerAggregator {
    fn merge(&mut self, tuple: &Tuple) -> Result<(), ExecutionError> {
        let key = match self.group_field {
            Some(index) => tuple
                .field(index)
                .cloned()
                .ok_or(DbError::SchemaMismatch)?,
            None => NO_GROUP_KEY,
        };
        let value = match tuple.field(self.agg_field) {
            Some(Field::Int(value)) => *value,
            _ => return Err(ExecutionError::Storage(DbError::SchemaMismatch)),
        };

        let op = self.op;
        self.groups
            .entry(key)
            .or_insert_with(|| RunningAggregate::new(op))
            .merge(value);
        Ok(())
    }

    fn iterator(&self) -> TupleIterator {
        let tuples = self
            .groups
            .iter()
            .map(|(key, state)| {
                let fields = match self.group_field {
                    Some(_) => vec![key.clone(), Field::Int(state.result())],
                    None => vec![Field::Int(state.result())],
                };
                Tuple::new(self.desc.clone(), fields)
            })
            .collect();
        TupleIterator::new(self.desc.clone(), tuples)
    }
}

#[derive(Debug, Clone)]
struct RunningAggregate {
    op: AggregateOp,
    count: i32,
    value: f32,
}

impl RunningAggregate {
    fn new(op: AggregateOp) -> Self {
        Self {
            op,
            count: 0,
            value: 0.0,
        }
    }

    fn merge(&mut self, incoming: i32) {
        let incoming = incoming as f32;
        if self.count == 0 {
            self.value = incoming;
            self.count = 1;
            return;
        }
        match self.op {
            AggregateOp::Min => self.value = self.value.min(incoming),
            AggregateOp::Max => self.value = self.value.max(incoming),
            AggregateOp::Sum => self.value += incoming,
            // Running mean; COUNT only needs the counter.
            AggregateOp::Avg => {
                self.value = (self.value * self.count as f32 + incoming) / (self.count + 1) as f32
            }
            AggregateOp::Count => {}
        }
        self.count += 1;
    }

    fn result(&self) -> i32 {
        if self.op == AggregateOp::Count {
            return self.count;
        }
        self.value as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::OpIterator;

    fn pair_desc() -> TupleDesc {
        TupleDesc::new(vec![FieldType::Int, FieldType::Int])
    }

    fn pair(group: i32, value: i32) -> Tuple {
        Tuple::new(pair_desc(), vec![Field::Int(group), Field::Int(value)])
    }

    fn drain(aggregator: &IntegerAggregator) -> Vec<Vec<Field>> {
        let mut it = aggregator.iterator();
        it.open().unwrap();
        let mut rows = Vec::new();
        while it.has_next().unwrap() {
            rows.push(it.next().unwrap().fields().to_vec());
        }
        rows
    }

    #[test]
    fn ungrouped_sum_folds_everything() {
        let mut agg = IntegerAggregator::new(None, &pair_desc(), 1, AggregateOp::Sum);
        for value in [1, 2, 3, 4] {
            agg.merge(&pair(0, value)).unwrap();
        }
        assert_eq!(drain(&agg), vec![vec![Field::Int(10)]]);
    }

    #[test]
    fn grouped_counts_keep_first_seen_order() {
        let mut agg =
            IntegerAggregator::new(Some(0), &pair_desc(), 1, AggregateOp::Count);
        for (group, value) in [(2, 10), (1, 20), (2, 30), (2, 40)] {
            agg.merge(&pair(group, value)).unwrap();
        }
        assert_eq!(
            drain(&agg),
            vec![
                vec![Field::Int(2), Field::Int(3)],
                vec![Field::Int(1), Field::Int(1)],
            ]
        );
    }

    #[test]
    fn min_and_max_track_extremes() {
        let mut min = IntegerAggregator::new(None, &pair_desc(), 1, AggregateOp::Min);
        let mut max = IntegerAggregator::new(None, &pair_desc(), 1, AggregateOp::Max);
        for value in [7, -3, 12, 0] {
            min.merge(&pair(0, value)).unwrap();
            max.merge(&pair(0, value)).unwrap();
        }
        assert_eq!(drain(&min), vec![vec![Field::Int(-3)]]);
        assert_eq!(drain(&max), vec![vec![Field::Int(12)]]);
    }

    #[test]
    fn average_truncates_toward_zero() {
        let mut agg = IntegerAggregator::new(None, &pair_desc(), 1, AggregateOp::Avg);
        for value in [1, 2, 4] {
            agg.merge(&pair(0, value)).unwrap();
        }
        // (1 + 2 + 4) / 3 = 2.33...
        assert_eq!(drain(&agg), vec![vec![Field::Int(2)]]);
    }

    #[test]
    fn grouped_results_carry_the_group_key() {
        let mut agg = IntegerAggregator::new(Some(0), &pair_desc(), 1, AggregateOp::Sum);
        for (group, value) in [(1, 5), (2, 7), (1, 6)] {
            agg.merge(&pair(group, value)).unwrap();
        }
        assert_eq!(
            drain(&agg),
            vec![
                vec![Field::Int(1), Field::Int(11)],
                vec![Field::Int(2), Field::Int(7)],
            ]
        );
    }

    #[test]
    fn non_integer_aggregate_column_is_rejected() {
        let desc = TupleDesc::new(vec![FieldType::Str(4)]);
        let tuple = Tuple::new(desc.clone(), vec![Field::Str("x".to_string())]);
        let mut agg = IntegerAggregator::new(None, &desc, 0, AggregateOp::Sum);
        assert!(matches!(
            agg.merge(&tuple),
            Err(ExecutionError::Storage(DbError::SchemaMismatch))
        ));
    }

    #[test]
    fn output_schema_keeps_the_group_column_and_names_the_result() {
        let input = TupleDesc::with_names(vec![
            (FieldType::Str(8), Some("city".to_string())),
            (FieldType::Int, Some("population".to_string())),
        ]);
        let agg = IntegerAggregator::new(Some(0), &input, 1, AggregateOp::Sum);

        let it = agg.iterator();
        let desc = it.tuple_desc();
        assert_eq!(desc.field_type(0), Some(FieldType::Str(8)));
        assert_eq!(desc.field_name(0), Some("city"));
        assert_eq!(desc.field_type(1), Some(FieldType::Int));
        assert_eq!(desc.field_name(1), Some("sum"));
    }
}
