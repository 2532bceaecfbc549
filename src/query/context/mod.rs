// Statement Context
//
// Binds a parsed statement to the facts the later stages need: touched
// tables, the projection layout, ORDER BY / GROUP BY targets, pagination,
// and the number of positional parameters.

pub mod pagination;
pub mod projection;
pub mod tables;

use crate::common::error::{ShardingError, ShardingResult};
use crate::query::parser::ast::*;
use crate::query::parser::parse;

pub use pagination::PaginationContext;
pub use projection::{
    AggregationProjection, ColumnLocator, DerivedProjection, Projection, ProjectionsContext,
    GROUP_BY_DERIVED_PREFIX, ORDER_BY_DERIVED_PREFIX,
};
pub use tables::TablesContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
}

/// An ORDER BY or GROUP BY item, resolved against the projection layout
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByContext {
    pub locator: ColumnLocator,
    pub direction: OrderDirection,
    pub nulls_first: bool,
    /// Expression text as written
    pub text: String,
}

impl OrderByContext {
    pub fn descending(&self) -> bool {
        self.direction == OrderDirection::Desc
    }
}

/// Merge-relevant facts about a SELECT
#[derive(Debug, Clone, PartialEq)]
pub struct SelectContext {
    pub distinct: bool,
    pub projections: ProjectionsContext,
    pub group_by: Vec<OrderByContext>,
    pub order_by: Vec<OrderByContext>,
    pub pagination: PaginationContext,
    /// Offset just past `SELECT [DISTINCT]`
    pub select_end: usize,
    pub statement_end: usize,
}

impl SelectContext {
    pub fn from_select(sql: &str, select: &SelectStatement) -> Self {
        let mut projections = ProjectionsContext::from_select(sql, select);
        let group_by = resolve_items(sql, &select.group_by, &mut projections, GROUP_BY_DERIVED_PREFIX);
        let order_by = resolve_items(sql, &select.order_by, &mut projections, ORDER_BY_DERIVED_PREFIX);
        SelectContext {
            distinct: select.distinct,
            projections,
            group_by,
            order_by,
            pagination: PaginationContext::from_limit(select.limit.as_ref()),
            select_end: select.select_end,
            statement_end: select.span.end,
        }
    }

    pub fn has_aggregation(&self) -> bool {
        self.projections.has_aggregation()
    }

    /// GROUP BY and ORDER BY name the same columns in the same direction,
    /// so groups arrive contiguously from sorted shard streams
    pub fn is_same_group_by_and_order_by(&self) -> bool {
        !self.group_by.is_empty()
            && self.group_by.len() == self.order_by.len()
            && self
                .group_by
                .iter()
                .zip(self.order_by.iter())
                .all(|(g, o)| g.locator == o.locator && g.direction == o.direction)
    }

    /// Results must be buffered and regrouped in memory
    pub fn needs_memory_grouping(&self) -> bool {
        (self.distinct || self.has_aggregation() || !self.group_by.is_empty())
            && !self.is_same_group_by_and_order_by()
    }
}

fn resolve_items(
    sql: &str,
    items: &[OrderByItem],
    projections: &mut ProjectionsContext,
    prefix: &str,
) -> Vec<OrderByContext> {
    items
        .iter()
        .map(|item| {
            let text = item.expr.span().text(sql).to_string();
            let locator = match projections.find(sql, &item.expr) {
                Some(locator) => locator,
                None if projections.has_wildcard => match &item.expr {
                    Expression::Column(column) => ColumnLocator::Label(column.name.clone()),
                    _ => ColumnLocator::Label(text.clone()),
                },
                None => ColumnLocator::Derived(projections.derive(&text, prefix)),
            };
            let nulls_first = match item.nulls {
                Some(NullsOrder::First) => true,
                Some(NullsOrder::Last) => false,
                None => item.direction == OrderDirection::Asc,
            };
            OrderByContext { locator, direction: item.direction, nulls_first, text }
        })
        .collect()
}

/// A parsed statement bound with everything routing, rewrite and merge need
#[derive(Debug, Clone)]
pub struct StatementContext {
    sql: String,
    statement: Statement,
    parameter_count: usize,
    tables: TablesContext,
    select: Option<SelectContext>,
}

impl StatementContext {
    /// Parse and bind a logical SQL statement
    pub fn bind(sql: &str) -> ShardingResult<Self> {
        let (statement, parameter_count) = parse(sql)?;
        Self::new(sql, statement, parameter_count)
    }

    pub fn new(sql: &str, statement: Statement, parameter_count: usize) -> ShardingResult<Self> {
        if let Statement::Insert(insert) = &statement {
            if !insert.columns.is_empty() {
                for (index, row) in insert.rows.iter().enumerate() {
                    if row.values.len() != insert.columns.len() {
                        return Err(ShardingError::InvalidStatement(format!(
                            "INSERT row {} has {} values for {} columns",
                            index,
                            row.values.len(),
                            insert.columns.len()
                        )));
                    }
                }
            }
        }

        let tables = TablesContext::from_statement(&statement);
        let select = match &statement {
            Statement::Select(select) => Some(SelectContext::from_select(sql, select)),
            _ => None,
        };
        Ok(StatementContext {
            sql: sql.to_string(),
            statement,
            parameter_count,
            tables,
            select,
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn kind(&self) -> StatementKind {
        match self.statement {
            Statement::Select(_) => StatementKind::Select,
            Statement::Insert(_) => StatementKind::Insert,
            Statement::Update(_) => StatementKind::Update,
            Statement::Delete(_) => StatementKind::Delete,
            Statement::Ddl(_) => StatementKind::Ddl,
        }
    }

    pub fn is_query(&self) -> bool {
        self.kind() == StatementKind::Select
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    pub fn tables(&self) -> &TablesContext {
        &self.tables
    }

    pub fn select_context(&self) -> Option<&SelectContext> {
        self.select.as_ref()
    }

    pub fn insert_statement(&self) -> Option<&InsertStatement> {
        match &self.statement {
            Statement::Insert(insert) => Some(insert),
            _ => None,
        }
    }

    /// The WHERE clause of a SELECT, UPDATE or DELETE
    pub fn where_clause(&self) -> Option<&Expression> {
        match &self.statement {
            Statement::Select(select) => select.where_clause.as_ref(),
            Statement::Update(update) => update.where_clause.as_ref(),
            Statement::Delete(delete) => delete.where_clause.as_ref(),
            _ => None,
        }
    }
}
