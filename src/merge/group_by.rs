// Group By Memory Merge
//
// Drains every shard cursor and regroups rows in memory. Used when GROUP BY
// and ORDER BY disagree, for aggregation without GROUP BY, and for
// DISTINCT. Groups keep first-seen order until the final sort.

use linked_hash_map::LinkedHashMap;
use log::debug;

use super::aggregation::{apply_results, AggregationColumn, AggregationUnit};
use super::order_by::{close_cursors, sort_rows, OrderKey};
use super::MergedResult;
use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;
use crate::execute::ResultCursor;

/// How rows are grouped, folded and ordered
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupingPlan {
    /// Physical indexes of the grouping key; empty means a single group
    pub group_keys: Vec<usize>,
    pub aggregations: Vec<AggregationColumn>,
    /// Output ordering
    pub order_keys: Vec<OrderKey>,
}

/// Key of one group, the values of its GROUP BY columns
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey(Vec<DataValue>);

impl GroupKey {
    fn from_row(row: &[DataValue], indexes: &[usize]) -> Self {
        GroupKey(indexes.iter().map(|&i| row.get(i).cloned().unwrap_or(DataValue::Null)).collect())
    }
}

struct GroupState {
    /// First row seen for the group; non-aggregate columns come from it
    template: Vec<DataValue>,
    units: Vec<AggregationUnit>,
}

pub struct GroupByMemoryMerge {
    labels: Vec<String>,
    rows: std::vec::IntoIter<Vec<DataValue>>,
    current: Option<Vec<DataValue>>,
}

impl GroupByMemoryMerge {
    pub fn new(mut cursors: Vec<Box<dyn ResultCursor>>, plan: &GroupingPlan, limit: usize) -> ShardingResult<Self> {
        let labels = cursors.first().map(|c| c.column_labels().to_vec()).unwrap_or_default();
        let mut groups: LinkedHashMap<GroupKey, GroupState> = LinkedHashMap::new();

        for cursor in cursors.iter_mut() {
            while cursor.next()? {
                let row = cursor.current_row()?;
                let key = GroupKey::from_row(&row, &plan.group_keys);
                if !groups.contains_key(&key) {
                    if groups.len() >= limit {
                        return Err(ShardingError::MemoryLimitExceeded { limit });
                    }
                    let units = plan.aggregations.iter().map(|a| AggregationUnit::new(a.function)).collect();
                    groups.insert(key.clone(), GroupState { template: row.clone(), units });
                }
                if let Some(state) = groups.get_mut(&key) {
                    for (unit, column) in state.units.iter_mut().zip(&plan.aggregations) {
                        unit.merge(column, &row)?;
                    }
                }
            }
        }
        close_cursors(&mut cursors)?;

        // Aggregation without GROUP BY answers one row even for no input
        if groups.is_empty() && plan.group_keys.is_empty() && !plan.aggregations.is_empty() {
            let units = plan.aggregations.iter().map(|a| AggregationUnit::new(a.function)).collect();
            groups.insert(GroupKey(Vec::new()), GroupState { template: vec![DataValue::Null; labels.len()], units });
        }

        debug!("Memory merge built {} groups", groups.len());
        let mut rows: Vec<Vec<DataValue>> = groups
            .into_iter()
            .map(|(_, mut state)| {
                apply_results(&mut state.template, &plan.aggregations, &state.units);
                state.template
            })
            .collect();
        sort_rows(&mut rows, &plan.order_keys)?;

        Ok(GroupByMemoryMerge { labels, rows: rows.into_iter(), current: None })
    }
}

impl MergedResult for GroupByMemoryMerge {
    fn column_labels(&self) -> &[String] {
        &self.labels
    }

    fn next(&mut self) -> ShardingResult<bool> {
        self.current = self.rows.next();
        Ok(self.current.is_some())
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
        self.rows = Vec::new().into_iter();
        Ok(())
    }
}
