// Column Value Decorator
//
// Rewrites the values of selected columns as they are read, for example to
// decrypt cipher columns. Row order and row count are untouched.

use std::collections::HashMap;

use super::MergedResult;
use crate::common::error::ShardingResult;
use crate::common::value::DataValue;

/// Transformation applied to one column's values
pub trait ColumnValueDecoder: Send + Sync {
    fn decode(&self, value: DataValue) -> ShardingResult<DataValue>;
}

pub struct ColumnValueDecorator {
    inner: Box<dyn MergedResult>,
    decoders: HashMap<usize, Box<dyn ColumnValueDecoder>>,
}

impl ColumnValueDecorator {
    pub fn new(inner: Box<dyn MergedResult>, decoders: HashMap<usize, Box<dyn ColumnValueDecoder>>) -> Self {
        ColumnValueDecorator { inner, decoders }
    }
}

impl MergedResult for ColumnValueDecorator {
    fn column_labels(&self) -> &[String] {
        self.inner.column_labels()
    }

    fn next(&mut self) -> ShardingResult<bool> {
        self.inner.next()
    }

    fn value(&self, index: usize) -> ShardingResult<DataValue> {
        let value = self.inner.value(index)?;
        match self.decoders.get(&index) {
            Some(decoder) => decoder.decode(value),
            None => Ok(value),
        }
    }

    fn close(&mut self) -> ShardingResult<()> {
        self.inner.close()
    }
}
