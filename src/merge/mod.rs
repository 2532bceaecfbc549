// Merge Module
//
// Composes the shard cursors of one query into a single logical cursor.
// Strategies (iterator, order-by stream, group-by stream, group-by memory)
// are wrapped by decorators (pagination, column values), and the outermost
// `MergedResultSet` tracks the cursor state and hides derived columns.

pub mod aggregation;
pub mod decorator;
pub mod engine;
pub mod group_by;
pub mod group_by_stream;
pub mod iterator;
pub mod order_by;
pub mod pagination;

use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;

pub use decorator::{ColumnValueDecoder, ColumnValueDecorator};
pub use engine::{merge_update_counts, ColumnLayout, MergeEngine};
pub use group_by::{GroupByMemoryMerge, GroupingPlan};
pub use group_by_stream::GroupByStreamMerge;
pub use iterator::IteratorMerge;
pub use order_by::{OrderByStreamMerge, OrderKey};
pub use pagination::PaginationDecorator;

/// A merged, forward-only cursor
pub trait MergedResult: Send {
    /// Labels of the physical columns this layer produces
    fn column_labels(&self) -> &[String];

    fn next(&mut self) -> ShardingResult<bool>;

    fn value(&self, index: usize) -> ShardingResult<DataValue>;

    fn close(&mut self) -> ShardingResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Unstarted,
    Active,
    Exhausted,
}

/// The logical result handed to callers
pub struct MergedResultSet {
    inner: Box<dyn MergedResult>,
    labels: Vec<String>,
    state: CursorState,
}

impl MergedResultSet {
    /// Expose only the first `visible_columns` of `inner`
    pub fn new(inner: Box<dyn MergedResult>, visible_columns: usize) -> Self {
        let labels = inner.column_labels().iter().take(visible_columns).cloned().collect();
        MergedResultSet { inner, labels, state: CursorState::Unstarted }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Read the remaining rows; mostly useful to tests and the CLI
    pub fn collect_rows(&mut self) -> ShardingResult<Vec<Vec<DataValue>>> {
        let mut rows = Vec::new();
        while self.next()? {
            rows.push((0..self.labels.len()).map(|i| self.value(i)).collect::<ShardingResult<Vec<_>>>()?);
        }
        Ok(rows)
    }
}

impl MergedResult for MergedResultSet {
    fn column_labels(&self) -> &[String] {
        &self.labels
    }

    fn next(&mut self) -> ShardingResult<bool> {
        if self.state == CursorState::Exhausted {
            return Ok(false);
        }
        if self.inner.next()? {
            self.state = CursorState::Active;
            Ok(true)
        } else {
            self.state = CursorState::Exhausted;
            self.inner.close()?;
            Ok(false)
        }
    }

    fn value(&self, index: usize) -> ShardingResult<DataValue> {
        match self.state {
            CursorState::Active if index < self.labels.len() => self.inner.value(index),
            CursorState::Active => Err(ShardingError::InvalidCursorState(format!(
                "column index {} out of range ({} columns)",
                index,
                self.labels.len()
            ))),
            CursorState::Unstarted => Err(ShardingError::InvalidCursorState("next() has not been called".to_string())),
            CursorState::Exhausted => Err(ShardingError::InvalidCursorState("result set is exhausted".to_string())),
        }
    }

    fn close(&mut self) -> ShardingResult<()> {
        if self.state == CursorState::Exhausted {
            return Ok(());
        }
        self.state = CursorState::Exhausted;
        self.inner.close()
    }
}
