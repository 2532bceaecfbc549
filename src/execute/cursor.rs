// In-Memory Cursor
//
// A `ResultCursor` over buffered rows. Used by connection implementations
// that materialize results, by memory merging, and throughout the tests.

use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;

use super::ResultCursor;

#[derive(Debug, Clone, Default)]
pub struct MemoryCursor {
    labels: Vec<String>,
    rows: Vec<Vec<DataValue>>,
    /// Index of the current row plus one; 0 before the first `next`
    position: usize,
    closed: bool,
}

impl MemoryCursor {
    pub fn new(labels: Vec<String>, rows: Vec<Vec<DataValue>>) -> Self {
        MemoryCursor { labels, rows, position: 0, closed: false }
    }

    /// Build from string labels, convenient for fixtures
    pub fn from_rows(labels: &[&str], rows: Vec<Vec<DataValue>>) -> Self {
        Self::new(labels.iter().map(|l| l.to_string()).collect(), rows)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

impl ResultCursor for MemoryCursor {
    fn column_labels(&self) -> &[String] {
        &self.labels
    }

    fn next(&mut self) -> ShardingResult<bool> {
        if self.closed {
            return Err(ShardingError::InvalidCursorState("cursor is closed".to_string()));
        }
        if self.position < self.rows.len() {
            self.position += 1;
            Ok(true)
        } else {
            self.position = self.rows.len() + 1;
            Ok(false)
        }
    }

    fn value(&self, index: usize) -> ShardingResult<DataValue> {
        if self.closed {
            return Err(ShardingError::InvalidCursorState("cursor is closed".to_string()));
        }
        let row = self
            .position
            .checked_sub(1)
            .and_then(|p| self.rows.get(p))
            .ok_or_else(|| ShardingError::InvalidCursorState("cursor is not positioned on a row".to_string()))?;
        row.get(index).cloned().ok_or_else(|| {
            ShardingError::InvalidCursorState(format!("column index {} out of range ({} columns)", index, row.len()))
        })
    }

    fn close(&mut self) -> ShardingResult<()> {
        self.closed = true;
        self.rows.clear();
        Ok(())
    }
}
