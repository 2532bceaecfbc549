// Token Generators
//
// Each generator inspects the bound statement and the route, and records
// the SQL tokens and parameter changes it needs in a `RewritePlan`. The
// engine later splices the plan into one SQL string per route unit.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use super::parameter::ParameterRewriter;
use super::token::SqlToken;
use crate::common::error::ShardingResult;
use crate::common::value::DataValue;
use crate::config::Dialect;
use crate::encrypt::{EncryptAlgorithm, EncryptContext};
use crate::query::context::{SelectContext, StatementContext, StatementKind};
use crate::query::parser::ast::{Expression, InsertRow, PaginationValue, Span, Statement};
use crate::route::unit::RouteContext;
use crate::sharding::{GeneratedKeyContext, ShardingRule};

/// Row count sent to every shard when rows must be regrouped in memory
const MAX_ROW_COUNT: u64 = i32::MAX as u64;

/// Everything a generator may read
pub struct GeneratorContext<'a> {
    pub rule: &'a ShardingRule,
    pub statement: &'a StatementContext,
    pub route: &'a RouteContext,
    pub params: &'a [DataValue],
    pub generated: Option<&'a GeneratedKeyContext>,
    pub encrypt: &'a EncryptContext,
}

impl GeneratorContext<'_> {
    fn is_multi_unit(&self) -> bool {
        self.route.units.len() > 1
    }
}

/// Accumulated output of the generators for one statement
#[derive(Debug, Clone, Default)]
pub struct RewritePlan {
    pub tokens: Vec<SqlToken>,
    pub parameters: ParameterRewriter,
    /// Unit index to the INSERT rows it carries, when rows were split
    pub insert_rows: HashMap<usize, Vec<usize>>,
    /// Hidden columns appended to the projection list
    pub derived_columns: usize,
    /// Hidden columns appended after the derived ones by pagination wrapping
    pub trailing_columns: usize,
}

impl RewritePlan {
    pub fn new(parameter_encryptors: BTreeMap<usize, EncryptAlgorithm>) -> Self {
        RewritePlan { parameters: ParameterRewriter::new(parameter_encryptors), ..Default::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenGenerator {
    Table,
    Projections,
    Pagination,
    GeneratedKey,
    InsertValues,
    Encrypt,
}

/// Generators that apply to a statement kind, in generation order
pub fn generators_for(kind: StatementKind) -> &'static [TokenGenerator] {
    use TokenGenerator::*;
    match kind {
        StatementKind::Select => &[Table, Projections, Pagination, Encrypt],
        StatementKind::Insert => &[Table, GeneratedKey, InsertValues, Encrypt],
        StatementKind::Update | StatementKind::Delete => &[Table, Encrypt],
        StatementKind::Ddl => &[Table],
    }
}

impl TokenGenerator {
    pub fn generate(&self, ctx: &GeneratorContext<'_>, plan: &mut RewritePlan) -> ShardingResult<()> {
        let before = plan.tokens.len();
        match self {
            TokenGenerator::Table => generate_table_tokens(ctx, plan),
            TokenGenerator::Projections => generate_projection_tokens(ctx, plan),
            TokenGenerator::Pagination => generate_pagination_tokens(ctx, plan)?,
            TokenGenerator::GeneratedKey => generate_key_tokens(ctx, plan),
            TokenGenerator::InsertValues => generate_insert_value_tokens(ctx, plan),
            TokenGenerator::Encrypt => generate_encrypt_tokens(ctx, plan),
        }
        debug!("{:?} generator produced {} tokens", self, plan.tokens.len() - before);
        Ok(())
    }
}

fn generate_table_tokens(ctx: &GeneratorContext<'_>, plan: &mut RewritePlan) {
    let rule = ctx.rule;
    let tables = ctx.statement.tables();
    for segment in tables.segments() {
        let name = segment.name.to_lowercase();
        if rule.is_sharding_table(&name) {
            plan.tokens.push(SqlToken::table(segment.span.start, segment.span.end, &name, segment.quote));
        }
    }

    // Owners spelled as the table name itself must follow the table
    let statement = ctx.statement.statement();
    let owners = statement
        .column_references()
        .into_iter()
        .filter_map(|column| column.owner.as_ref())
        .chain(statement.wildcard_owners());
    for owner in owners {
        let name = owner.name.to_lowercase();
        if tables.is_table_name(&name) && rule.is_sharding_table(&name) {
            plan.tokens.push(SqlToken::table(owner.span.start, owner.span.end, &name, owner.quote));
        }
    }
}

fn generate_projection_tokens(ctx: &GeneratorContext<'_>, plan: &mut RewritePlan) {
    let Some(select) = ctx.statement.select_context() else { return };
    let derived = &select.projections.derived;
    if !ctx.is_multi_unit() || derived.is_empty() {
        return;
    }
    let text: Vec<String> = derived.iter().map(|d| d.to_sql()).collect();
    plan.tokens.push(SqlToken::insert(select.projections.insert_position, format!(", {}", text.join(", "))));
    plan.derived_columns = derived.len();
}

/// Row count each shard must return so the merged page is complete
fn revised_row_count(select: &SelectContext, offset: u64, row_count: u64) -> u64 {
    if !select.group_by.is_empty() && !select.is_same_group_by_and_order_by() {
        MAX_ROW_COUNT
    } else {
        offset.saturating_add(row_count)
    }
}

fn generate_pagination_tokens(ctx: &GeneratorContext<'_>, plan: &mut RewritePlan) -> ShardingResult<()> {
    let Some(select) = ctx.statement.select_context() else { return Ok(()) };
    let pagination = &select.pagination;
    let Some(limit_span) = pagination.span else { return Ok(()) };

    let offset = pagination.actual_offset(ctx.params)?;
    let row_count = pagination.actual_row_count(ctx.params)?;
    let multi = ctx.is_multi_unit();

    match ctx.rule.props().dialect {
        Dialect::MySql | Dialect::PostgreSql => {
            if !multi {
                return Ok(());
            }
            if let Some(value) = &pagination.offset {
                rewrite_pagination_value(value, 0, plan);
            }
            if let (Some(value), Some(count)) = (&pagination.row_count, row_count) {
                rewrite_pagination_value(value, revised_row_count(select, offset, count), plan);
            }
        }
        Dialect::SqlServer => {
            remove_limit_clause(ctx, limit_span, plan);
            if multi {
                if let Some(count) = row_count {
                    let top = revised_row_count(select, offset, count);
                    plan.tokens.push(SqlToken::insert(select.select_end, format!(" TOP ({})", top)));
                }
            } else if offset == 0 {
                if let Some(count) = row_count {
                    plan.tokens.push(SqlToken::insert(select.select_end, format!(" TOP ({})", count)));
                }
            } else {
                if let Some(count) = row_count {
                    let top = offset.saturating_add(count);
                    plan.tokens.push(SqlToken::insert(select.select_end, format!(" TOP ({})", top)));
                }
                let order = if select.order_by.is_empty() {
                    "(SELECT 0)".to_string()
                } else {
                    select
                        .order_by
                        .iter()
                        .map(|o| if o.descending() { format!("{} DESC", o.text) } else { o.text.clone() })
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                plan.tokens.push(SqlToken::insert(
                    select.projections.insert_position,
                    format!(", ROW_NUMBER() OVER (ORDER BY {}) AS rownum_", order),
                ));
                plan.tokens.push(SqlToken::insert(statement_start(ctx), "SELECT * FROM ("));
                plan.tokens.push(SqlToken::insert(
                    select.statement_end,
                    format!(") AS row_ WHERE row_.rownum_ > {}", offset),
                ));
                plan.trailing_columns = 1;
            }
        }
        Dialect::Oracle => {
            remove_limit_clause(ctx, limit_span, plan);
            let (low, upper) = if multi {
                (0, row_count.map(|count| revised_row_count(select, offset, count)))
            } else {
                (offset, row_count.map(|count| offset.saturating_add(count)))
            };
            plan.tokens.push(SqlToken::insert(
                statement_start(ctx),
                "SELECT * FROM (SELECT row_.*, rownum rownum_ FROM (",
            ));
            let suffix = match upper {
                Some(upper) => format!(") row_ WHERE rownum <= {}) WHERE rownum_ > {}", upper, low),
                None => format!(") row_) WHERE rownum_ > {}", low),
            };
            plan.tokens.push(SqlToken::insert(select.statement_end, suffix));
            plan.trailing_columns = 1;
        }
    }
    Ok(())
}

fn rewrite_pagination_value(value: &PaginationValue, revised: u64, plan: &mut RewritePlan) {
    match value {
        PaginationValue::Literal { span, .. } => {
            plan.tokens.push(SqlToken::replace(span.start, span.end, revised.to_string()));
        }
        PaginationValue::Parameter { index, .. } => {
            plan.parameters.replace(*index, DataValue::Integer(revised.min(i64::MAX as u64) as i64));
        }
    }
}

/// Drop the LIMIT clause together with the whitespace before it
fn remove_limit_clause(ctx: &GeneratorContext<'_>, span: Span, plan: &mut RewritePlan) {
    let start = ctx.statement.sql()[..span.start].trim_end().len();
    plan.tokens.push(SqlToken::replace(start, span.end, ""));
    if let Some(select) = ctx.statement.select_context() {
        for index in select.pagination.parameter_indexes() {
            plan.parameters.remove(index);
        }
    }
}

fn statement_start(ctx: &GeneratorContext<'_>) -> usize {
    match ctx.statement.statement() {
        Statement::Select(select) => select.span.start,
        _ => 0,
    }
}

fn generate_key_tokens(ctx: &GeneratorContext<'_>, plan: &mut RewritePlan) {
    let (Some(generated), Some(insert)) = (ctx.generated, ctx.statement.insert_statement()) else { return };
    if let Some(columns_span) = insert.columns_span {
        plan.tokens.push(SqlToken::insert(columns_span.end - 1, format!(", {}", generated.column)));
    }
}

fn generate_insert_value_tokens(ctx: &GeneratorContext<'_>, plan: &mut RewritePlan) {
    let Some(insert) = ctx.statement.insert_statement() else { return };
    let encryptors = &ctx.encrypt.insert_encryptors;
    let split_rows = !ctx.route.insert_row_nodes.is_empty() && ctx.is_multi_unit();
    if ctx.generated.is_none() && encryptors.is_empty() && !split_rows {
        return;
    }

    let sql = ctx.statement.sql();
    for (unit_index, unit) in ctx.route.units.iter().enumerate() {
        let rows: Vec<usize> = if ctx.route.insert_row_nodes.is_empty() {
            (0..insert.rows.len()).collect()
        } else {
            ctx.route.insert_rows_for(unit)
        };
        let text: Vec<String> = rows
            .iter()
            .filter_map(|&index| insert.rows.get(index).map(|row| (index, row)))
            .map(|(index, row)| render_row(sql, index, row, ctx.generated, encryptors))
            .collect();
        plan.tokens.push(
            SqlToken::replace(insert.values_span.start, insert.values_span.end, text.join(", ")).for_unit(unit_index),
        );
        plan.insert_rows.insert(unit_index, rows);
    }
}

fn render_row(
    sql: &str,
    index: usize,
    row: &InsertRow,
    generated: Option<&GeneratedKeyContext>,
    encryptors: &HashMap<usize, EncryptAlgorithm>,
) -> String {
    let mut values: Vec<String> = row
        .values
        .iter()
        .enumerate()
        .map(|(position, value)| match (encryptors.get(&position), value) {
            (Some(algorithm), Expression::Literal { value, .. }) => {
                algorithm.encrypt(&value.to_data_value()).to_sql_literal()
            }
            _ => value.span().text(sql).to_string(),
        })
        .collect();
    if let Some(key) = generated.and_then(|g| g.values.get(index)) {
        values.push(key.to_sql_literal());
    }
    format!("({})", values.join(", "))
}

fn generate_encrypt_tokens(ctx: &GeneratorContext<'_>, plan: &mut RewritePlan) {
    let encrypt = ctx.encrypt;
    for rewrite in encrypt.column_rewrites.iter().chain(encrypt.literal_rewrites.iter()) {
        plan.tokens.push(SqlToken::replace(rewrite.span.start, rewrite.span.end, rewrite.text.clone()));
    }
}
