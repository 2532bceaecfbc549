// Sharding Condition Extraction
//
// Pulls sharding-column values out of a bound statement. WHERE contributes
// its top-level AND conjuncts only; INSERT contributes one condition set per
// VALUES row. Parameters stay as positional indexes until routing.

use std::ops::Bound;

use log::debug;

use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;
use crate::query::context::StatementContext;
use crate::query::parser::ast::{BinaryOperator, ColumnReference, Expression};
use crate::sharding::{ColumnShardingValue, GeneratedKeyContext, ShardingRange, ShardingRule, ShardingValue};

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    Literal(DataValue),
    Parameter(usize),
}

impl ConditionValue {
    pub fn resolve(&self, params: &[DataValue]) -> ShardingResult<DataValue> {
        match self {
            ConditionValue::Literal(value) => Ok(value.clone()),
            ConditionValue::Parameter(index) => params.get(*index).cloned().ok_or_else(|| {
                ShardingError::InvalidParameter(format!("no value bound for parameter {}", index))
            }),
        }
    }

    fn from_expression(expr: &Expression) -> Option<Self> {
        match expr {
            Expression::Literal { value, .. } => Some(ConditionValue::Literal(value.to_data_value())),
            Expression::Parameter { index, .. } => Some(ConditionValue::Parameter(*index)),
            Expression::Nested { expr, .. } => Self::from_expression(expr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    Equal,
    In,
    Between,
    LessThan,
    LessEquals,
    GreaterThan,
    GreaterEquals,
}

impl ConditionOperator {
    fn from_binary(op: BinaryOperator) -> Option<Self> {
        match op {
            BinaryOperator::Equals => Some(ConditionOperator::Equal),
            BinaryOperator::LessThan => Some(ConditionOperator::LessThan),
            BinaryOperator::LessEquals => Some(ConditionOperator::LessEquals),
            BinaryOperator::GreaterThan => Some(ConditionOperator::GreaterThan),
            BinaryOperator::GreaterEquals => Some(ConditionOperator::GreaterEquals),
            _ => None,
        }
    }

    /// Operator seen from the other side: `5 < col` is `col > 5`
    fn mirrored(self) -> Self {
        match self {
            ConditionOperator::LessThan => ConditionOperator::GreaterThan,
            ConditionOperator::LessEquals => ConditionOperator::GreaterEquals,
            ConditionOperator::GreaterThan => ConditionOperator::LessThan,
            ConditionOperator::GreaterEquals => ConditionOperator::LessEquals,
            other => other,
        }
    }
}

/// One predicate on a sharding column
#[derive(Debug, Clone, PartialEq)]
pub struct ShardingCondition {
    /// Lower-cased logic table
    pub table: String,
    /// Lower-cased column
    pub column: String,
    pub operator: ConditionOperator,
    pub values: Vec<ConditionValue>,
}

impl ShardingCondition {
    /// Bind parameters and convert to an algorithm input
    pub fn to_sharding_value(&self, params: &[DataValue]) -> ShardingResult<ColumnShardingValue> {
        let values = self
            .values
            .iter()
            .map(|v| v.resolve(params))
            .collect::<ShardingResult<Vec<_>>>()?;
        let first = || values.first().cloned().unwrap_or(DataValue::Null);
        let value = match self.operator {
            ConditionOperator::Equal | ConditionOperator::In => ShardingValue::Precise(values.clone()),
            ConditionOperator::Between => {
                ShardingValue::Range(ShardingRange::between(first(), values.get(1).cloned().unwrap_or(DataValue::Null)))
            }
            ConditionOperator::LessThan => {
                ShardingValue::Range(ShardingRange { lower: Bound::Unbounded, upper: Bound::Excluded(first()) })
            }
            ConditionOperator::LessEquals => {
                ShardingValue::Range(ShardingRange { lower: Bound::Unbounded, upper: Bound::Included(first()) })
            }
            ConditionOperator::GreaterThan => {
                ShardingValue::Range(ShardingRange { lower: Bound::Excluded(first()), upper: Bound::Unbounded })
            }
            ConditionOperator::GreaterEquals => {
                ShardingValue::Range(ShardingRange { lower: Bound::Included(first()), upper: Bound::Unbounded })
            }
        };
        Ok(ColumnShardingValue { column: self.column.clone(), value })
    }
}

/// Conditions that hold together
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionSet {
    /// INSERT row the set came from
    pub row_index: Option<usize>,
    pub conditions: Vec<ShardingCondition>,
}

impl ConditionSet {
    pub fn for_table<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ShardingCondition> + 'a {
        self.conditions.iter().filter(move |c| c.table == table)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShardingConditions {
    pub sets: Vec<ConditionSet>,
}

impl ShardingConditions {
    /// No set carries a condition
    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(|s| s.conditions.is_empty())
    }

    /// Extract conditions for every sharding table the statement touches
    pub fn extract(
        rule: &ShardingRule,
        ctx: &StatementContext,
        generated: Option<&GeneratedKeyContext>,
    ) -> ShardingResult<Self> {
        if let Some(insert) = ctx.insert_statement() {
            return extract_insert(rule, ctx, insert, generated);
        }
        let mut set = ConditionSet::default();
        if let Some(where_clause) = ctx.where_clause() {
            let mut conjuncts = Vec::new();
            collect_conjuncts(where_clause, &mut conjuncts);
            for conjunct in conjuncts {
                extract_predicate(rule, ctx, conjunct, &mut set.conditions);
            }
        }
        debug!("Extracted {} sharding conditions", set.conditions.len());
        Ok(ShardingConditions { sets: if set.conditions.is_empty() { Vec::new() } else { vec![set] } })
    }
}

fn extract_insert(
    rule: &ShardingRule,
    ctx: &StatementContext,
    insert: &crate::query::parser::ast::InsertStatement,
    generated: Option<&GeneratedKeyContext>,
) -> ShardingResult<ShardingConditions> {
    let table = insert.table.name.to_lowercase();
    let Some(table_rule) = rule.table_rule(&table) else {
        return Ok(ShardingConditions::default());
    };
    if insert.columns.is_empty() {
        return Err(ShardingError::UnsupportedShardingOperation(format!(
            "INSERT into sharding table '{}' requires an explicit column list",
            table
        )));
    }

    let mut sets = Vec::with_capacity(insert.rows.len());
    for (row_index, row) in insert.rows.iter().enumerate() {
        let mut set = ConditionSet { row_index: Some(row_index), conditions: Vec::new() };
        for (column, value) in insert.columns.iter().zip(row.values.iter()) {
            if !table_rule.is_sharding_column(&column.name) {
                continue;
            }
            let value = ConditionValue::from_expression(value).ok_or_else(|| {
                ShardingError::UnsupportedShardingOperation(format!(
                    "sharding column '{}' must be given a literal or parameter, got '{}'",
                    column.name,
                    value.span().text(ctx.sql())
                ))
            })?;
            set.conditions.push(ShardingCondition {
                table: table.clone(),
                column: column.name.to_lowercase(),
                operator: ConditionOperator::Equal,
                values: vec![value],
            });
        }
        if let Some(generated) = generated {
            if table_rule.is_sharding_column(&generated.column) {
                if let Some(value) = generated.values.get(row_index) {
                    set.conditions.push(ShardingCondition {
                        table: table.clone(),
                        column: generated.column.to_lowercase(),
                        operator: ConditionOperator::Equal,
                        values: vec![ConditionValue::Literal(value.clone())],
                    });
                }
            }
        }
        sets.push(set);
    }
    Ok(ShardingConditions { sets })
}

/// Flatten top-level ANDs; anything under OR stays a single opaque conjunct
fn collect_conjuncts<'a>(expr: &'a Expression, out: &mut Vec<&'a Expression>) {
    match expr {
        Expression::Binary { left, op: BinaryOperator::And, right, .. } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        Expression::Nested { expr, .. } => collect_conjuncts(expr, out),
        other => out.push(other),
    }
}

fn extract_predicate(
    rule: &ShardingRule,
    ctx: &StatementContext,
    predicate: &Expression,
    out: &mut Vec<ShardingCondition>,
) {
    let (column, operator, values) = match predicate {
        Expression::Binary { left, op, right, .. } => {
            let Some(operator) = ConditionOperator::from_binary(*op) else {
                return;
            };
            match (unwrap_column(left), unwrap_column(right)) {
                (Some(column), None) => match ConditionValue::from_expression(right) {
                    Some(value) => (column, operator, vec![value]),
                    None => return,
                },
                (None, Some(column)) => match ConditionValue::from_expression(left) {
                    Some(value) => (column, operator.mirrored(), vec![value]),
                    None => return,
                },
                _ => return,
            }
        }
        Expression::InList { expr, list, negated: false, .. } => {
            let Some(column) = unwrap_column(expr) else {
                return;
            };
            let values: Option<Vec<ConditionValue>> = list.iter().map(ConditionValue::from_expression).collect();
            match values {
                Some(values) => (column, ConditionOperator::In, values),
                None => return,
            }
        }
        Expression::Between { expr, low, high, negated: false, .. } => {
            let Some(column) = unwrap_column(expr) else {
                return;
            };
            match (ConditionValue::from_expression(low), ConditionValue::from_expression(high)) {
                (Some(low), Some(high)) => (column, ConditionOperator::Between, vec![low, high]),
                _ => return,
            }
        }
        _ => return,
    };

    for table in owning_tables(rule, ctx, column) {
        out.push(ShardingCondition {
            table,
            column: column.name.to_lowercase(),
            operator,
            values: values.clone(),
        });
    }
}

fn unwrap_column(expr: &Expression) -> Option<&ColumnReference> {
    match expr {
        Expression::Column(column) => Some(column),
        Expression::Nested { expr, .. } => unwrap_column(expr),
        _ => None,
    }
}

/// Sharding tables a column reference can belong to
fn owning_tables(rule: &ShardingRule, ctx: &StatementContext, column: &ColumnReference) -> Vec<String> {
    let candidates: Vec<&str> = match &column.owner {
        Some(owner) => ctx.tables().resolve_owner(&owner.name).into_iter().collect(),
        None => ctx.tables().table_names().iter().map(|t| t.as_str()).collect(),
    };
    candidates
        .into_iter()
        .filter(|table| rule.table_rule(table).is_some_and(|t| t.is_sharding_column(&column.name)))
        .map(|table| table.to_string())
        .collect()
}
