// Group By Stream Merge
//
// When ORDER BY names the GROUP BY columns, every shard streams its groups
// in the same order. An order-by stream merge then yields rows of one group
// contiguously, and they fold into a single row without buffering the
// result.

use std::cmp::Ordering;

use super::aggregation::{apply_results, AggregationUnit};
use super::group_by::GroupingPlan;
use super::order_by::{compare_rows, OrderByStreamMerge, OrderKey};
use super::MergedResult;
use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;
use crate::execute::ResultCursor;

pub struct GroupByStreamMerge {
    input: OrderByStreamMerge,
    plan: GroupingPlan,
    group_keys: Vec<OrderKey>,
    /// First row of the next group
    pending: Option<Vec<DataValue>>,
    current: Option<Vec<DataValue>>,
    started: bool,
}

impl GroupByStreamMerge {
    pub fn new(cursors: Vec<Box<dyn ResultCursor>>, plan: GroupingPlan) -> Self {
        let input = OrderByStreamMerge::new(cursors, plan.order_keys.clone());
        let group_keys = plan.group_keys.iter().map(|&index| OrderKey::ascending(index)).collect();
        GroupByStreamMerge { input, plan, group_keys, pending: None, current: None, started: false }
    }

    fn read_input(&mut self) -> ShardingResult<Option<Vec<DataValue>>> {
        if self.input.next()? {
            Ok(self.input.current().map(|row| row.to_vec()))
        } else {
            Ok(None)
        }
    }
}

impl MergedResult for GroupByStreamMerge {
    fn column_labels(&self) -> &[String] {
        self.input.column_labels()
    }

    fn next(&mut self) -> ShardingResult<bool> {
        if !self.started {
            self.started = true;
            self.pending = self.read_input()?;
        }
        let Some(mut first) = self.pending.take() else {
            self.current = None;
            return Ok(false);
        };

        let mut units: Vec<AggregationUnit> =
            self.plan.aggregations.iter().map(|a| AggregationUnit::new(a.function)).collect();
        for (unit, column) in units.iter_mut().zip(&self.plan.aggregations) {
            unit.merge(column, &first)?;
        }
        while let Some(row) = self.read_input()? {
            if compare_rows(&first, &row, &self.group_keys)? != Ordering::Equal {
                self.pending = Some(row);
                break;
            }
            for (unit, column) in units.iter_mut().zip(&self.plan.aggregations) {
                unit.merge(column, &row)?;
            }
        }

        apply_results(&mut first, &self.plan.aggregations, &units);
        self.current = Some(first);
        Ok(true)
    }

    fn value(&self, index: usize) -> ShardingResult<DataValue> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| ShardingError::InvalidCursorState("no current row".to_string()))?;
        row.get(index)
            .cloned()
            .ok_or_else(|| ShardingError::InvalidCursorState(format!("column index {} out of range", index)))
    }

    fn close(&mut self) -> ShardingResult<()> {
        self.current = None;
        self.pending = None;
        self.input.close()
    }
}
