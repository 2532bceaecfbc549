// Iterator Merge
//
// Concatenates shard cursors in execution unit order. Also serves as the
// pass-through for single-unit queries.

use super::order_by::close_cursors;
use super::MergedResult;
use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;
use crate::execute::ResultCursor;

pub struct IteratorMerge {
    cursors: Vec<Box<dyn ResultCursor>>,
    labels: Vec<String>,
    index: usize,
    on_row: bool,
}

impl IteratorMerge {
    pub fn new(cursors: Vec<Box<dyn ResultCursor>>) -> Self {
        let labels = cursors.first().map(|c| c.column_labels().to_vec()).unwrap_or_default();
        IteratorMerge { cursors, labels, index: 0, on_row: false }
    }
}

impl MergedResult for IteratorMerge {
    fn column_labels(&self) -> &[String] {
        &self.labels
    }

    fn next(&mut self) -> ShardingResult<bool> {
        while let Some(cursor) = self.cursors.get_mut(self.index) {
            if cursor.next()? {
                self.on_row = true;
                return Ok(true);
            }
            self.index += 1;
        }
        self.on_row = false;
        Ok(false)
    }

    fn value(&self, index: usize) -> ShardingResult<DataValue> {
        match self.cursors.get(self.index) {
            Some(cursor) if self.on_row => cursor.value(index),
            _ => Err(ShardingError::InvalidCursorState("no current row".to_string())),
        }
    }

    fn close(&mut self) -> ShardingResult<()> {
        self.on_row = false;
        close_cursors(&mut self.cursors)
    }
}
