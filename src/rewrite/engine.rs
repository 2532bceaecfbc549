// Rewrite Engine
//
// Produces one physical SQL statement, with its parameters, for every route
// unit. Rewriting never mutates the logical statement: it collects tokens
// and splices them into a copy of the original text per unit.

use std::fmt;

use log::debug;

use super::generator::{generators_for, GeneratorContext, RewritePlan};
use super::token::{check_overlap, sort_tokens, SqlToken};
use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;
use crate::encrypt::EncryptContext;
use crate::query::context::StatementContext;
use crate::route::unit::RouteContext;
use crate::sharding::{GeneratedKeyContext, ShardingRule};

/// A physical statement bound for one data source
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUnit {
    pub data_source: String,
    pub sql: String,
    pub parameters: Vec<DataValue>,
}

impl fmt::Display for ExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ::: {}", self.data_source, self.sql)?;
        if !self.parameters.is_empty() {
            let params: Vec<String> = self.parameters.iter().map(|p| p.to_sql_literal()).collect();
            write!(f, " ::: [{}]", params.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewriteResult {
    /// One unit per route unit, in route order
    pub units: Vec<ExecutionUnit>,
    /// Hidden columns following the logical ones in every result row
    pub derived_columns: usize,
    /// Hidden columns following the derived ones
    pub trailing_columns: usize,
}

pub struct RewriteEngine<'a> {
    rule: &'a ShardingRule,
}

impl<'a> RewriteEngine<'a> {
    pub fn new(rule: &'a ShardingRule) -> Self {
        RewriteEngine { rule }
    }

    pub fn rewrite(
        &self,
        statement: &StatementContext,
        route: &RouteContext,
        params: &[DataValue],
        generated: Option<&GeneratedKeyContext>,
        encrypt: &EncryptContext,
    ) -> ShardingResult<RewriteResult> {
        if params.len() < statement.parameter_count() {
            return Err(ShardingError::InvalidParameter(format!(
                "statement has {} parameters but {} were bound",
                statement.parameter_count(),
                params.len()
            )));
        }
        // No matching shard: nothing to run
        if route.units.is_empty() {
            return Ok(RewriteResult { units: Vec::new(), derived_columns: 0, trailing_columns: 0 });
        }
        if route.units.len() > 1 {
            if let Some(select) = statement.select_context() {
                if let Some(agg) = select.projections.aggregations().find(|a| a.distinct) {
                    return Err(ShardingError::UnsupportedShardingOperation(format!(
                        "{} cannot be merged across {} route units",
                        agg.text,
                        route.units.len()
                    )));
                }
            }
        }

        let ctx = GeneratorContext { rule: self.rule, statement, route, params, generated, encrypt };
        let mut plan = RewritePlan::new(encrypt.parameter_encryptors.clone());
        for generator in generators_for(statement.kind()) {
            generator.generate(&ctx, &mut plan)?;
        }
        sort_tokens(&mut plan.tokens);

        let mut units = Vec::with_capacity(route.units.len());
        for (index, unit) in route.units.iter().enumerate() {
            let tokens: Vec<&SqlToken> = plan.tokens.iter().filter(|t| t.applies_to(index)).collect();
            check_overlap(tokens.iter().copied())?;

            let sql = statement.sql();
            let mut rewritten = String::with_capacity(sql.len() + 32);
            let mut cursor = 0;
            for token in tokens {
                let start = token.start.min(sql.len());
                rewritten.push_str(&sql[cursor..start]);
                rewritten.push_str(&token.render(unit));
                cursor = token.stop.min(sql.len());
            }
            rewritten.push_str(&sql[cursor..]);

            let parameters = match (plan.insert_rows.get(&index), statement.insert_statement()) {
                (Some(rows), Some(insert)) => plan.parameters.rewrite_insert(params, insert, rows)?,
                _ => plan.parameters.rewrite(params, statement.parameter_count())?,
            };
            let unit = ExecutionUnit { data_source: unit.data_source.clone(), sql: rewritten, parameters };
            debug!("Rewrote unit {}: {}", index, unit);
            units.push(unit);
        }

        Ok(RewriteResult {
            units,
            derived_columns: plan.derived_columns,
            trailing_columns: plan.trailing_columns,
        })
    }
}
