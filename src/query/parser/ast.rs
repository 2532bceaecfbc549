// SQL Abstract Syntax Tree (AST) Implementation
//
// This module defines the AST nodes for representing parsed SQL statements.
// Nodes that the rewrite stage may replace carry a `Span` into the
// original SQL text.

use std::fmt;

use crate::common::value::DataValue;

/// Half-open byte range `start..end` in the original SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// Span covering `self` through `other`
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start, other.end)
    }

    pub fn text<'a>(&self, sql: &'a str) -> &'a str {
        &sql[self.start..self.end]
    }
}

/// Represents a SQL statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    Ddl(DdlStatement),
}

/// SELECT statement representation
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub distinct: bool,
    /// Offset just past `SELECT` (or `SELECT DISTINCT`)
    pub select_end: usize,
    pub projections: Vec<SelectItem>,
    pub projections_span: Span,
    /// Tables of the FROM clause, including joined tables, in source order
    pub from: Vec<TableSegment>,
    pub join_conditions: Vec<Expression>,
    pub where_clause: Option<Expression>,
    pub group_by: Vec<OrderByItem>,
    pub having: Option<Expression>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<LimitSegment>,
    /// Whole statement without a trailing semicolon
    pub span: Span,
}

/// Item of a SELECT list
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*` or `owner.*`
    Wildcard { owner: Option<OwnerSegment>, span: Span },
    Expression { expr: Expression, alias: Option<String>, span: Span },
}

/// Table occurrence; `span` covers the name token including delimiters
#[derive(Debug, Clone, PartialEq)]
pub struct TableSegment {
    pub name: String,
    pub quote: Option<char>,
    pub alias: Option<String>,
    pub span: Span,
}

/// Qualifier in `owner.column` or `owner.*`
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerSegment {
    pub name: String,
    pub quote: Option<char>,
    pub span: Span,
}

/// Column reference (could be qualified with a table name or alias)
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnReference {
    pub owner: Option<OwnerSegment>,
    pub name: String,
    pub span: Span,
    pub name_span: Span,
}

/// SQL literal values
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
}

impl Value {
    pub fn to_data_value(&self) -> DataValue {
        match self {
            Value::Null => DataValue::Null,
            Value::Integer(i) => DataValue::Integer(*i),
            Value::Float(f) => DataValue::Float(*f),
            Value::String(s) => DataValue::Text(s.clone()),
            Value::Boolean(b) => DataValue::Boolean(*b),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    LessEquals,
    GreaterEquals,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equals
                | BinaryOperator::NotEquals
                | BinaryOperator::LessThan
                | BinaryOperator::GreaterThan
                | BinaryOperator::LessEquals
                | BinaryOperator::GreaterEquals
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        };
        write!(f, "{}", name)
    }
}

/// Expression in SQL
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal { value: Value, span: Span },
    /// Positional `?` marker; `index` is zero-based in source order
    Parameter { index: usize, span: Span },
    Column(ColumnReference),
    Binary { left: Box<Expression>, op: BinaryOperator, right: Box<Expression>, span: Span },
    Unary { op: UnaryOperator, expr: Box<Expression>, span: Span },
    InList { expr: Box<Expression>, list: Vec<Expression>, negated: bool, span: Span },
    InSubquery { expr: Box<Expression>, subquery: Box<SelectStatement>, negated: bool, span: Span },
    Between { expr: Box<Expression>, low: Box<Expression>, high: Box<Expression>, negated: bool, span: Span },
    IsNull { expr: Box<Expression>, negated: bool, span: Span },
    Like { expr: Box<Expression>, pattern: Box<Expression>, negated: bool, span: Span },
    Function { name: String, args: Vec<Expression>, span: Span },
    /// `arg` is `None` for `COUNT(*)`
    Aggregate { function: AggregateFunction, arg: Option<Box<Expression>>, distinct: bool, span: Span },
    Subquery { query: Box<SelectStatement>, span: Span },
    Nested { expr: Box<Expression>, span: Span },
}

impl Expression {
    pub fn span(&self) -> Span {
        match self {
            Expression::Column(column) => column.span,
            Expression::Literal { span, .. }
            | Expression::Parameter { span, .. }
            | Expression::Binary { span, .. }
            | Expression::Unary { span, .. }
            | Expression::InList { span, .. }
            | Expression::InSubquery { span, .. }
            | Expression::Between { span, .. }
            | Expression::IsNull { span, .. }
            | Expression::Like { span, .. }
            | Expression::Function { span, .. }
            | Expression::Aggregate { span, .. }
            | Expression::Subquery { span, .. }
            | Expression::Nested { span, .. } => *span,
        }
    }

    /// Visit this expression and every sub-expression, descending into subqueries
    pub fn walk<'a>(&'a self, visitor: &mut dyn FnMut(&'a Expression)) {
        visitor(self);
        match self {
            Expression::Literal { .. } | Expression::Parameter { .. } | Expression::Column(_) => {}
            Expression::Binary { left, right, .. } => {
                left.walk(visitor);
                right.walk(visitor);
            }
            Expression::Unary { expr, .. }
            | Expression::IsNull { expr, .. }
            | Expression::Nested { expr, .. } => expr.walk(visitor),
            Expression::InList { expr, list, .. } => {
                expr.walk(visitor);
                for item in list {
                    item.walk(visitor);
                }
            }
            Expression::InSubquery { expr, subquery, .. } => {
                expr.walk(visitor);
                subquery.walk_expressions(visitor);
            }
            Expression::Between { expr, low, high, .. } => {
                expr.walk(visitor);
                low.walk(visitor);
                high.walk(visitor);
            }
            Expression::Like { expr, pattern, .. } => {
                expr.walk(visitor);
                pattern.walk(visitor);
            }
            Expression::Function { args, .. } => {
                for arg in args {
                    arg.walk(visitor);
                }
            }
            Expression::Aggregate { arg, .. } => {
                if let Some(arg) = arg {
                    arg.walk(visitor);
                }
            }
            Expression::Subquery { query, .. } => query.walk_expressions(visitor),
        }
    }

    /// Nested subqueries directly under this expression tree
    pub fn subqueries(&self) -> Vec<&SelectStatement> {
        let mut found = Vec::new();
        self.walk(&mut |expr| match expr {
            Expression::InSubquery { subquery, .. } => found.push(subquery.as_ref()),
            Expression::Subquery { query, .. } => found.push(query.as_ref()),
            _ => {}
        });
        found
    }
}

/// ORDER BY / GROUP BY item
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: Expression,
    pub direction: OrderDirection,
    pub nulls: Option<NullsOrder>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// LIMIT / OFFSET clause; `span` covers the whole clause
#[derive(Debug, Clone, PartialEq)]
pub struct LimitSegment {
    pub row_count: Option<PaginationValue>,
    pub offset: Option<PaginationValue>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaginationValue {
    Literal { value: u64, span: Span },
    Parameter { index: usize, span: Span },
}

impl PaginationValue {
    pub fn span(&self) -> Span {
        match self {
            PaginationValue::Literal { span, .. } | PaginationValue::Parameter { span, .. } => *span,
        }
    }
}

/// INSERT statement
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: TableSegment,
    pub columns: Vec<ColumnReference>,
    /// `(a, b, c)` including parentheses
    pub columns_span: Option<Span>,
    pub rows: Vec<InsertRow>,
    /// From the first row's `(` to the last row's `)`
    pub values_span: Span,
    pub span: Span,
}

/// One parenthesized VALUES row
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRow {
    pub values: Vec<Expression>,
    pub span: Span,
}

/// UPDATE statement
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: TableSegment,
    pub assignments: Vec<Assignment>,
    pub where_clause: Option<Expression>,
    pub span: Span,
}

/// Column assignment in UPDATE
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: ColumnReference,
    pub value: Expression,
}

/// DELETE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: TableSegment,
    pub where_clause: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlKind {
    CreateTable,
    AlterTable,
    DropTable,
    TruncateTable,
}

/// Table-level DDL; only the table name is modelled, the rest passes through
#[derive(Debug, Clone, PartialEq)]
pub struct DdlStatement {
    pub kind: DdlKind,
    pub table: TableSegment,
    pub span: Span,
}

impl SelectStatement {
    /// Visit every expression of the statement, including those in subqueries
    pub fn walk_expressions<'a>(&'a self, visitor: &mut dyn FnMut(&'a Expression)) {
        for item in &self.projections {
            if let SelectItem::Expression { expr, .. } = item {
                expr.walk(visitor);
            }
        }
        for condition in &self.join_conditions {
            condition.walk(visitor);
        }
        if let Some(where_clause) = &self.where_clause {
            where_clause.walk(visitor);
        }
        for item in self.group_by.iter().chain(self.order_by.iter()) {
            item.expr.walk(visitor);
        }
        if let Some(having) = &self.having {
            having.walk(visitor);
        }
    }

    /// Table segments of this query and every nested subquery
    pub fn all_tables(&self) -> Vec<&TableSegment> {
        let mut tables: Vec<&TableSegment> = self.from.iter().collect();
        let mut subqueries = Vec::new();
        self.walk_expressions(&mut |expr| match expr {
            Expression::InSubquery { subquery, .. } => subqueries.push(subquery.as_ref()),
            Expression::Subquery { query, .. } => subqueries.push(query.as_ref()),
            _ => {}
        });
        for subquery in subqueries {
            tables.extend(subquery.from.iter());
        }
        tables
    }
}

impl Statement {
    /// Visit every expression in the statement
    pub fn walk_expressions<'a>(&'a self, visitor: &mut dyn FnMut(&'a Expression)) {
        match self {
            Statement::Select(select) => select.walk_expressions(visitor),
            Statement::Insert(insert) => {
                for row in &insert.rows {
                    for value in &row.values {
                        value.walk(visitor);
                    }
                }
            }
            Statement::Update(update) => {
                for assignment in &update.assignments {
                    assignment.value.walk(visitor);
                }
                if let Some(where_clause) = &update.where_clause {
                    where_clause.walk(visitor);
                }
            }
            Statement::Delete(delete) => {
                if let Some(where_clause) = &delete.where_clause {
                    where_clause.walk(visitor);
                }
            }
            Statement::Ddl(_) => {}
        }
    }

    /// Every table occurrence in the statement, subqueries included
    pub fn all_tables(&self) -> Vec<&TableSegment> {
        match self {
            Statement::Select(select) => select.all_tables(),
            Statement::Insert(insert) => vec![&insert.table],
            Statement::Update(update) => {
                let mut tables = vec![&update.table];
                if let Some(where_clause) = &update.where_clause {
                    for subquery in where_clause.subqueries() {
                        tables.extend(subquery.from.iter());
                    }
                }
                tables
            }
            Statement::Delete(delete) => {
                let mut tables = vec![&delete.table];
                if let Some(where_clause) = &delete.where_clause {
                    for subquery in where_clause.subqueries() {
                        tables.extend(subquery.from.iter());
                    }
                }
                tables
            }
            Statement::Ddl(ddl) => vec![&ddl.table],
        }
    }

    /// Every column reference in the statement, including INSERT column
    /// lists and UPDATE targets. Wildcard owners are not columns.
    pub fn column_references(&self) -> Vec<&ColumnReference> {
        let mut columns = Vec::new();
        match self {
            Statement::Insert(insert) => columns.extend(insert.columns.iter()),
            Statement::Update(update) => columns.extend(update.assignments.iter().map(|a| &a.column)),
            _ => {}
        }
        self.walk_expressions(&mut |expr| {
            if let Expression::Column(column) = expr {
                columns.push(column);
            }
        });
        columns
    }

    /// Wildcard owners (`t.*`) in the statement's top-level projection list
    pub fn wildcard_owners(&self) -> Vec<&OwnerSegment> {
        match self {
            Statement::Select(select) => select
                .projections
                .iter()
                .filter_map(|item| match item {
                    SelectItem::Wildcard { owner: Some(owner), .. } => Some(owner),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Select(_) => write!(f, "SELECT statement"),
            Statement::Insert(_) => write!(f, "INSERT statement"),
            Statement::Update(_) => write!(f, "UPDATE statement"),
            Statement::Delete(_) => write!(f, "DELETE statement"),
            Statement::Ddl(_) => write!(f, "DDL statement"),
        }
    }
}
