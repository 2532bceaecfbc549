// Merge Engine
//
// Chooses the merge strategy for a query's shape and stacks the decorators
// on top: strategy, then pagination, then column values.

use std::collections::HashMap;

use log::debug;

use super::aggregation::AggregationColumn;
use super::decorator::{ColumnValueDecoder, ColumnValueDecorator};
use super::group_by::{GroupByMemoryMerge, GroupingPlan};
use super::group_by_stream::GroupByStreamMerge;
use super::iterator::IteratorMerge;
use super::order_by::{OrderByStreamMerge, OrderKey};
use super::pagination::PaginationDecorator;
use super::{MergedResult, MergedResultSet};
use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;
use crate::config::ShardingProps;
use crate::execute::{MemoryCursor, ResultCursor};
use crate::query::context::{ColumnLocator, OrderByContext, SelectContext, StatementContext};

/// Hidden columns that follow the logical ones in every shard row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColumnLayout {
    pub derived_columns: usize,
    pub trailing_columns: usize,
}

pub struct MergeEngine<'a> {
    props: &'a ShardingProps,
}

impl<'a> MergeEngine<'a> {
    pub fn new(props: &'a ShardingProps) -> Self {
        MergeEngine { props }
    }

    /// Merge the shard cursors of a query, in execution unit order
    pub fn merge(
        &self,
        statement: &StatementContext,
        cursors: Vec<Box<dyn ResultCursor>>,
        layout: ColumnLayout,
        params: &[DataValue],
        decoders: Vec<(String, Box<dyn ColumnValueDecoder>)>,
    ) -> ShardingResult<MergedResultSet> {
        if cursors.is_empty() {
            return Ok(empty_result(statement));
        }
        let labels = check_shapes(&cursors)?;
        let hidden = layout.derived_columns + layout.trailing_columns;
        if labels.len() < hidden {
            return Err(ShardingError::MergeInconsistency(format!(
                "results have {} columns but {} hidden columns were added",
                labels.len(),
                hidden
            )));
        }
        let logical_columns = labels.len() - hidden;
        let select = statement.select_context();
        if let Some(select) = select {
            let expected = select.projections.items.len();
            if !select.projections.has_wildcard && expected != logical_columns {
                return Err(ShardingError::MergeInconsistency(format!(
                    "expected {} logical columns, results carry {}",
                    expected, logical_columns
                )));
            }
        }
        let resolver = Resolver { labels: &labels, logical_columns };

        let mut merged: Box<dyn MergedResult> = match select {
            Some(select) if cursors.len() > 1 => self.build_strategy(select, cursors, &resolver, params)?,
            _ => Box::new(IteratorMerge::new(cursors)),
        };

        let decoders: HashMap<usize, Box<dyn ColumnValueDecoder>> = decoders
            .into_iter()
            .filter_map(|(label, decoder)| match resolver.label(&label) {
                Some(index) if index < logical_columns => Some((index, decoder)),
                _ => {
                    debug!("Decoded column '{}' is not in the result", label);
                    None
                }
            })
            .collect();
        if !decoders.is_empty() {
            merged = Box::new(ColumnValueDecorator::new(merged, decoders));
        }
        Ok(MergedResultSet::new(merged, logical_columns))
    }

    fn build_strategy(
        &self,
        select: &SelectContext,
        cursors: Vec<Box<dyn ResultCursor>>,
        resolver: &Resolver<'_>,
        params: &[DataValue],
    ) -> ShardingResult<Box<dyn MergedResult>> {
        let order_keys = resolver.order_keys(&select.order_by)?;
        let base: Box<dyn MergedResult> = if select.needs_memory_grouping() {
            let mut group_keys = resolver.indexes(&select.group_by)?;
            if group_keys.is_empty() && select.distinct && !select.has_aggregation() {
                group_keys = (0..resolver.logical_columns).collect();
            }
            let order_keys = if order_keys.is_empty() {
                group_keys.iter().map(|&index| OrderKey::ascending(index)).collect()
            } else {
                order_keys
            };
            let plan = GroupingPlan { group_keys, aggregations: resolver.aggregations(select)?, order_keys };
            debug!("Merging with group by memory merge");
            Box::new(GroupByMemoryMerge::new(cursors, &plan, self.props.max_memory_merge_rows)?)
        } else if !select.group_by.is_empty() {
            let plan = GroupingPlan {
                group_keys: resolver.indexes(&select.group_by)?,
                aggregations: resolver.aggregations(select)?,
                order_keys,
            };
            debug!("Merging with group by stream merge");
            Box::new(GroupByStreamMerge::new(cursors, plan))
        } else if !order_keys.is_empty() {
            debug!("Merging with order by stream merge");
            Box::new(OrderByStreamMerge::new(cursors, order_keys))
        } else {
            Box::new(IteratorMerge::new(cursors))
        };

        let pagination = &select.pagination;
        if !pagination.has_pagination() {
            return Ok(base);
        }
        let offset = pagination.actual_offset(params)?;
        let row_count = pagination.actual_row_count(params)?;
        Ok(Box::new(PaginationDecorator::new(base, offset, row_count)))
    }
}

/// Sum the affected-row counts of every unit
pub fn merge_update_counts(counts: impl IntoIterator<Item = u64>) -> u64 {
    counts.into_iter().fold(0u64, |total, count| total.saturating_add(count))
}

/// Exhausted result for a query routed to no unit, labelled by its projections
fn empty_result(statement: &StatementContext) -> MergedResultSet {
    let labels = statement.select_context().map(|s| s.projections.logical_labels()).unwrap_or_default();
    let visible = labels.len();
    let cursor: Box<dyn ResultCursor> = Box::new(MemoryCursor::new(labels, Vec::new()));
    MergedResultSet::new(Box::new(IteratorMerge::new(vec![cursor])), visible)
}

/// Every shard must return the same number of columns; no shards means no labels
fn check_shapes(cursors: &[Box<dyn ResultCursor>]) -> ShardingResult<Vec<String>> {
    let Some(first) = cursors.first() else { return Ok(Vec::new()) };
    let labels = first.column_labels().to_vec();
    for (index, cursor) in cursors.iter().enumerate().skip(1) {
        if cursor.column_labels().len() != labels.len() {
            return Err(ShardingError::MergeInconsistency(format!(
                "unit {} returned {} columns, unit 0 returned {}",
                index,
                cursor.column_labels().len(),
                labels.len()
            )));
        }
    }
    Ok(labels)
}

/// Maps column locators onto physical row positions
struct Resolver<'a> {
    labels: &'a [String],
    logical_columns: usize,
}

impl Resolver<'_> {
    fn label(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l.eq_ignore_ascii_case(label))
    }

    fn locate(&self, locator: &ColumnLocator) -> ShardingResult<usize> {
        let index = match locator {
            ColumnLocator::Projection(index) => Some(*index),
            ColumnLocator::Derived(index) => Some(self.logical_columns + index),
            ColumnLocator::Label(label) => self.label(label),
        };
        index.filter(|&i| i < self.labels.len()).ok_or_else(|| {
            ShardingError::MergeInconsistency(format!("column {:?} is not in the result set", locator))
        })
    }

    fn indexes(&self, items: &[OrderByContext]) -> ShardingResult<Vec<usize>> {
        items.iter().map(|item| self.locate(&item.locator)).collect()
    }

    fn order_keys(&self, items: &[OrderByContext]) -> ShardingResult<Vec<OrderKey>> {
        items
            .iter()
            .map(|item| {
                Ok(OrderKey {
                    index: self.locate(&item.locator)?,
                    descending: item.descending(),
                    nulls_first: item.nulls_first,
                })
            })
            .collect()
    }

    fn aggregations(&self, select: &SelectContext) -> ShardingResult<Vec<AggregationColumn>> {
        select
            .projections
            .aggregations()
            .map(|agg| {
                let avg = agg
                    .avg_derived
                    .map(|(count, sum)| (self.logical_columns + count, self.logical_columns + sum));
                Ok(AggregationColumn { function: agg.function, index: self.locate(&agg.locator)?, avg })
            })
            .collect()
    }
}
