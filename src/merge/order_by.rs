// Order By Stream Merge
//
// k-way merge of shard cursors that are each already sorted by the ORDER BY
// keys. One row per shard is buffered; each step emits the least buffered
// row and refills only the shard it came from. Ties go to the earlier
// execution unit.

use std::cmp::Ordering;

use super::MergedResult;
use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;
use crate::execute::ResultCursor;

/// An ORDER BY key located in the physical row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey {
    pub index: usize,
    pub descending: bool,
    pub nulls_first: bool,
}

impl OrderKey {
    pub fn ascending(index: usize) -> Self {
        OrderKey { index, descending: false, nulls_first: true }
    }

    fn compare(&self, a: &DataValue, b: &DataValue) -> ShardingResult<Ordering> {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ok(Ordering::Equal),
            (true, false) => Ok(if self.nulls_first { Ordering::Less } else { Ordering::Greater }),
            (false, true) => Ok(if self.nulls_first { Ordering::Greater } else { Ordering::Less }),
            (false, false) => {
                let ordering = a.compare(b)?;
                Ok(if self.descending { ordering.reverse() } else { ordering })
            }
        }
    }
}

/// Compare two physical rows by `keys`, first difference wins
pub fn compare_rows(a: &[DataValue], b: &[DataValue], keys: &[OrderKey]) -> ShardingResult<Ordering> {
    for key in keys {
        let left = a.get(key.index).unwrap_or(&DataValue::Null);
        let right = b.get(key.index).unwrap_or(&DataValue::Null);
        match key.compare(left, right)? {
            Ordering::Equal => continue,
            ordering => return Ok(ordering),
        }
    }
    Ok(Ordering::Equal)
}

/// Sort rows in place, surfacing the first comparison error
pub fn sort_rows(rows: &mut [Vec<DataValue>], keys: &[OrderKey]) -> ShardingResult<()> {
    let mut error = None;
    rows.sort_by(|a, b| match compare_rows(a, b, keys) {
        Ok(ordering) => ordering,
        Err(e) => {
            error.get_or_insert(e);
            Ordering::Equal
        }
    });
    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

pub struct OrderByStreamMerge {
    cursors: Vec<Box<dyn ResultCursor>>,
    labels: Vec<String>,
    keys: Vec<OrderKey>,
    /// Head row of each shard; `None` once that shard is exhausted
    heads: Vec<Option<Vec<DataValue>>>,
    /// Shard the current row came from, refilled on the next call
    last: Option<usize>,
    current: Option<Vec<DataValue>>,
    primed: bool,
}

impl OrderByStreamMerge {
    pub fn new(cursors: Vec<Box<dyn ResultCursor>>, keys: Vec<OrderKey>) -> Self {
        let labels = cursors.first().map(|c| c.column_labels().to_vec()).unwrap_or_default();
        let heads = cursors.iter().map(|_| None).collect();
        OrderByStreamMerge { cursors, labels, keys, heads, last: None, current: None, primed: false }
    }

    fn refill(&mut self, shard: usize) -> ShardingResult<()> {
        let cursor = &mut self.cursors[shard];
        self.heads[shard] = if cursor.next()? { Some(cursor.current_row()?) } else { None };
        Ok(())
    }

    /// The current merged row
    pub fn current(&self) -> Option<&[DataValue]> {
        self.current.as_deref()
    }
}

impl MergedResult for OrderByStreamMerge {
    fn column_labels(&self) -> &[String] {
        &self.labels
    }

    fn next(&mut self) -> ShardingResult<bool> {
        if !self.primed {
            self.primed = true;
            for shard in 0..self.cursors.len() {
                self.refill(shard)?;
            }
        } else if let Some(shard) = self.last.take() {
            self.refill(shard)?;
        }

        let mut best: Option<usize> = None;
        for (shard, head) in self.heads.iter().enumerate() {
            let Some(row) = head else { continue };
            best = match best {
                Some(b) => {
                    let current_best = self.heads[b].as_deref().unwrap_or_default();
                    // Strictly less, so equal rows keep the earlier shard
                    if compare_rows(row, current_best, &self.keys)? == Ordering::Less { Some(shard) } else { Some(b) }
                }
                None => Some(shard),
            };
        }

        match best {
            Some(shard) => {
                self.current = self.heads[shard].take();
                self.last = Some(shard);
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
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
        self.heads.iter_mut().for_each(|h| *h = None);
        close_cursors(&mut self.cursors)
    }
}

/// Close every cursor, reporting the first failure
pub fn close_cursors(cursors: &mut [Box<dyn ResultCursor>]) -> ShardingResult<()> {
    let mut first_error = None;
    for cursor in cursors.iter_mut() {
        if let Err(e) = cursor.close() {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
