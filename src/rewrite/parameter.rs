// Parameter Rewriting
//
// Rebuilds the bound parameter list for each rewritten statement so it
// matches the `?` markers that survive in that statement.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;
use crate::encrypt::EncryptAlgorithm;
use crate::query::parser::ast::{Expression, InsertStatement};

#[derive(Debug, Clone, Default)]
pub struct ParameterRewriter {
    /// Replacement values, e.g. revised LIMIT values
    replacements: HashMap<usize, DataValue>,
    /// Markers removed from the SQL text
    removed: BTreeSet<usize>,
    encryptors: BTreeMap<usize, EncryptAlgorithm>,
}

impl ParameterRewriter {
    pub fn new(encryptors: BTreeMap<usize, EncryptAlgorithm>) -> Self {
        ParameterRewriter { encryptors, ..Default::default() }
    }

    pub fn replace(&mut self, index: usize, value: DataValue) {
        self.replacements.insert(index, value);
    }

    pub fn remove(&mut self, index: usize) {
        self.removed.insert(index);
    }

    fn value(&self, index: usize, params: &[DataValue]) -> ShardingResult<DataValue> {
        let value = match self.replacements.get(&index) {
            Some(value) => value.clone(),
            None => params.get(index).cloned().ok_or_else(|| {
                ShardingError::InvalidParameter(format!("no value bound for parameter {}", index))
            })?,
        };
        Ok(match self.encryptors.get(&index) {
            Some(algorithm) => algorithm.encrypt(&value),
            None => value,
        })
    }

    /// Parameters for a statement that keeps every marker except removed ones
    pub fn rewrite(&self, params: &[DataValue], parameter_count: usize) -> ShardingResult<Vec<DataValue>> {
        (0..parameter_count)
            .filter(|i| !self.removed.contains(i))
            .map(|i| self.value(i, params))
            .collect()
    }

    /// Parameters for an INSERT that keeps only `rows`
    pub fn rewrite_insert(
        &self,
        params: &[DataValue],
        insert: &InsertStatement,
        rows: &[usize],
    ) -> ShardingResult<Vec<DataValue>> {
        let mut out = Vec::new();
        for row in rows.iter().filter_map(|r| insert.rows.get(*r)) {
            let mut indexes = Vec::new();
            for value in &row.values {
                value.walk(&mut |expr| {
                    if let Expression::Parameter { index, .. } = expr {
                        indexes.push(*index);
                    }
                });
            }
            for index in indexes {
                out.push(self.value(index, params)?);
            }
        }
        Ok(out)
    }
}
