// Pagination Decorator
//
// Applies OFFSET and LIMIT to the merged, logically ordered stream. Shards
// were asked for `offset + count` rows starting at zero, so skipping
// happens here and only here.

use super::MergedResult;
use crate::common::error::ShardingResult;
use crate::common::value::DataValue;

/// Offsets at or beyond this can never produce a row
pub const MAX_OFFSET: u64 = i32::MAX as u64;

pub struct PaginationDecorator {
    inner: Box<dyn MergedResult>,
    offset: u64,
    row_count: Option<u64>,
    emitted: u64,
    started: bool,
}

impl PaginationDecorator {
    pub fn new(inner: Box<dyn MergedResult>, offset: u64, row_count: Option<u64>) -> Self {
        PaginationDecorator { inner, offset, row_count, emitted: 0, started: false }
    }
}

impl MergedResult for PaginationDecorator {
    fn column_labels(&self) -> &[String] {
        self.inner.column_labels()
    }

    fn next(&mut self) -> ShardingResult<bool> {
        if !self.started {
            self.started = true;
            if self.offset >= MAX_OFFSET {
                self.row_count = Some(0);
            } else {
                for _ in 0..self.offset {
                    if !self.inner.next()? {
                        return Ok(false);
                    }
                }
            }
        }
        if self.row_count.is_some_and(|limit| self.emitted >= limit) {
            return Ok(false);
        }
        let has_row = self.inner.next()?;
        if has_row {
            self.emitted += 1;
        }
        Ok(has_row)
    }

    fn value(&self, index: usize) -> ShardingResult<DataValue> {
        self.inner.value(index)
    }

    fn close(&mut self) -> ShardingResult<()> {
        self.inner.close()
    }
}
