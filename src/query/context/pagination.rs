// Pagination Context
//
// Resolves LIMIT / OFFSET values, which may be literals or bound parameters.

use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;
use crate::query::parser::ast::{LimitSegment, PaginationValue, Span};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PaginationContext {
    pub offset: Option<PaginationValue>,
    pub row_count: Option<PaginationValue>,
    /// Span of the whole LIMIT clause
    pub span: Option<Span>,
}

impl PaginationContext {
    pub fn from_limit(limit: Option<&LimitSegment>) -> Self {
        match limit {
            Some(limit) => PaginationContext {
                offset: limit.offset.clone(),
                row_count: limit.row_count.clone(),
                span: Some(limit.span),
            },
            None => PaginationContext::default(),
        }
    }

    pub fn has_pagination(&self) -> bool {
        self.offset.is_some() || self.row_count.is_some()
    }

    pub fn actual_offset(&self, params: &[DataValue]) -> ShardingResult<u64> {
        match &self.offset {
            Some(value) => resolve(value, params),
            None => Ok(0),
        }
    }

    pub fn actual_row_count(&self, params: &[DataValue]) -> ShardingResult<Option<u64>> {
        self.row_count.as_ref().map(|value| resolve(value, params)).transpose()
    }

    /// Parameter indexes used by the clause
    pub fn parameter_indexes(&self) -> Vec<usize> {
        [&self.offset, &self.row_count]
            .into_iter()
            .flatten()
            .filter_map(|value| match value {
                PaginationValue::Parameter { index, .. } => Some(*index),
                PaginationValue::Literal { .. } => None,
            })
            .collect()
    }
}

fn resolve(value: &PaginationValue, params: &[DataValue]) -> ShardingResult<u64> {
    match value {
        PaginationValue::Literal { value, .. } => Ok(*value),
        PaginationValue::Parameter { index, .. } => {
            let param = params.get(*index).ok_or_else(|| {
                ShardingError::InvalidParameter(format!("missing pagination parameter at index {}", index))
            })?;
            match param.as_i64() {
                Some(v) if v >= 0 => Ok(v as u64),
                _ => Err(ShardingError::InvalidParameter(format!(
                    "pagination parameter at index {} must be a non-negative integer, got {}",
                    index,
                    param.to_sql_literal()
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(offset: Option<PaginationValue>, row_count: Option<PaginationValue>) -> PaginationContext {
        PaginationContext { offset, row_count, span: None }
    }

    #[test]
    fn test_literal_and_parameter_values() {
        let ctx = context(
            Some(PaginationValue::Parameter { index: 1, span: Span::default() }),
            Some(PaginationValue::Literal { value: 20, span: Span::default() }),
        );
        let params = vec![DataValue::Text("x".into()), DataValue::Integer(10)];
        assert_eq!(ctx.actual_offset(&params).unwrap(), 10);
        assert_eq!(ctx.actual_row_count(&params).unwrap(), Some(20));
        assert_eq!(ctx.parameter_indexes(), vec![1]);
    }

    #[test]
    fn test_invalid_parameters() {
        let ctx = context(Some(PaginationValue::Parameter { index: 0, span: Span::default() }), None);
        assert!(matches!(ctx.actual_offset(&[]), Err(ShardingError::InvalidParameter(_))));
        assert!(matches!(
            ctx.actual_offset(&[DataValue::Integer(-1)]),
            Err(ShardingError::InvalidParameter(_))
        ));
        assert_eq!(ctx.actual_row_count(&[]).unwrap(), None);
    }
}
