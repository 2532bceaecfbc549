// Aggregation Merging
//
// Folds per-shard partial aggregates into the logical aggregate. COUNT and
// SUM add up, MIN and MAX compare, and AVG is rebuilt from the derived
// COUNT and SUM columns so uneven shards weigh correctly.

use std::cmp::Ordering;

use crate::common::error::ShardingResult;
use crate::common::value::DataValue;
use crate::query::parser::ast::AggregateFunction;

/// An aggregate projection located in the physical row
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationColumn {
    pub function: AggregateFunction,
    pub index: usize,
    /// Physical (count, sum) column indexes for AVG
    pub avg: Option<(usize, usize)>,
}

/// Running state of one aggregate within one group
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationUnit {
    Count(DataValue),
    Sum(DataValue),
    Min(Option<DataValue>),
    Max(Option<DataValue>),
    Avg { count: DataValue, sum: DataValue },
}

impl AggregationUnit {
    pub fn new(function: AggregateFunction) -> Self {
        match function {
            AggregateFunction::Count => AggregationUnit::Count(DataValue::Integer(0)),
            AggregateFunction::Sum => AggregationUnit::Sum(DataValue::Null),
            AggregateFunction::Min => AggregationUnit::Min(None),
            AggregateFunction::Max => AggregationUnit::Max(None),
            AggregateFunction::Avg => AggregationUnit::Avg { count: DataValue::Null, sum: DataValue::Null },
        }
    }

    /// Fold one shard row into the aggregate
    pub fn merge(&mut self, column: &AggregationColumn, row: &[DataValue]) -> ShardingResult<()> {
        let value = |index: usize| row.get(index).cloned().unwrap_or(DataValue::Null);
        match self {
            AggregationUnit::Count(total) | AggregationUnit::Sum(total) => {
                *total = total.add(&value(column.index))?;
            }
            AggregationUnit::Min(current) => fold_extreme(current, value(column.index), Ordering::Less)?,
            AggregationUnit::Max(current) => fold_extreme(current, value(column.index), Ordering::Greater)?,
            AggregationUnit::Avg { count, sum } => {
                if let Some((count_index, sum_index)) = column.avg {
                    *count = count.add(&value(count_index))?;
                    *sum = sum.add(&value(sum_index))?;
                }
            }
        }
        Ok(())
    }

    pub fn result(&self) -> DataValue {
        match self {
            AggregationUnit::Count(total) | AggregationUnit::Sum(total) => total.clone(),
            AggregationUnit::Min(value) | AggregationUnit::Max(value) => value.clone().unwrap_or(DataValue::Null),
            AggregationUnit::Avg { count, sum } => match (count.as_f64(), sum.as_f64()) {
                (Some(count), Some(sum)) if count != 0.0 => DataValue::Float(sum / count),
                _ => DataValue::Null,
            },
        }
    }
}

fn fold_extreme(current: &mut Option<DataValue>, candidate: DataValue, keep: Ordering) -> ShardingResult<()> {
    if candidate.is_null() {
        return Ok(());
    }
    match current {
        Some(existing) if existing.compare(&candidate)? != keep.reverse() => {}
        _ => *current = Some(candidate),
    }
    Ok(())
}

/// Write the final aggregate values into a group's output row
pub fn apply_results(row: &mut [DataValue], columns: &[AggregationColumn], units: &[AggregationUnit]) {
    for (column, unit) in columns.iter().zip(units) {
        if let Some(slot) = row.get_mut(column.index) {
            *slot = unit.result();
        }
    }
}
