// Sharding Runtime
//
// Entry point for callers: binds a logical statement to the current rule
// snapshot, routes and rewrites it, executes the units through the
// connection provider and merges the results into one logical cursor.

use std::sync::Arc;

use log::info;

use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;
use crate::config::ShardingRuleConfig;
use crate::encrypt::{EncryptAlgorithm, EncryptContext};
use crate::execute::{CancelFlag, ConnectionProvider, ExecutionCoordinator, UnitOutcome};
use crate::merge::{merge_update_counts, ColumnLayout, ColumnValueDecoder, MergeEngine, MergedResultSet};
use crate::query::context::StatementContext;
use crate::rewrite::{RewriteEngine, RewriteResult};
use crate::route::{HintManager, RouteContext, RoutingEngine, ShardingConditions};
use crate::sharding::{GeneratedKeyContext, RuleHolder, ShardingRule};

/// Everything decided about a statement before it touches a connection
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub route: RouteContext,
    pub rewrite: RewriteResult,
    pub generated_keys: Option<GeneratedKeyContext>,
    /// Result labels whose values are decrypted on read
    pub decrypt_labels: Vec<(String, EncryptAlgorithm)>,
}

/// Result of executing one logical statement
pub enum ExecutionOutput {
    Query(MergedResultSet),
    Update(u64),
}

impl std::fmt::Debug for ExecutionOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionOutput::Query(_) => write!(f, "Query"),
            ExecutionOutput::Update(count) => write!(f, "Update({})", count),
        }
    }
}

/// Route and rewrite `statement` against `rule` without executing it
pub fn plan_statement(
    rule: &ShardingRule,
    statement: &StatementContext,
    params: &[DataValue],
    hint: Option<&HintManager>,
    available: Option<&[String]>,
) -> ShardingResult<ExecutionPlan> {
    if params.len() < statement.parameter_count() {
        return Err(ShardingError::InvalidParameter(format!(
            "statement has {} parameters but {} were bound",
            statement.parameter_count(),
            params.len()
        )));
    }
    let generated_keys = rule.generated_keys(statement);
    let conditions = ShardingConditions::extract(rule, statement, generated_keys.as_ref())?;
    let route = RoutingEngine::new(rule, available).route(statement, &conditions, params, hint)?;
    let encrypt = rule.encrypt_rule().map(|r| EncryptContext::build(r, statement)).unwrap_or_default();
    let rewrite = RewriteEngine::new(rule).rewrite(statement, &route, params, generated_keys.as_ref(), &encrypt)?;

    if rule.props().sql_show {
        info!("Logic SQL: {}", statement.sql());
        for unit in &rewrite.units {
            info!("Actual SQL: {}", unit);
        }
    }
    Ok(ExecutionPlan { route, rewrite, generated_keys, decrypt_labels: encrypt.decrypt_labels })
}

pub struct ShardingRuntime {
    rules: RuleHolder,
    provider: Arc<dyn ConnectionProvider>,
}

impl ShardingRuntime {
    pub fn new(rule: ShardingRule, provider: Arc<dyn ConnectionProvider>) -> Self {
        ShardingRuntime { rules: RuleHolder::new(rule), provider }
    }

    /// Build a runtime straight from configuration
    pub fn from_config(config: ShardingRuleConfig, provider: Arc<dyn ConnectionProvider>) -> ShardingResult<Self> {
        Ok(Self::new(ShardingRule::new(config)?, provider))
    }

    /// The rule snapshot new queries will use
    pub fn rule(&self) -> Arc<ShardingRule> {
        self.rules.snapshot()
    }

    pub fn generation(&self) -> u64 {
        self.rules.generation()
    }

    /// Validate `config` and swap it in. Queries already running keep their
    /// snapshot; an invalid config leaves the current rule in place.
    pub fn reload(&self, config: ShardingRuleConfig) -> ShardingResult<u64> {
        let rule = ShardingRule::new(config)?;
        Ok(self.rules.swap(rule))
    }

    pub fn plan(
        &self,
        statement: &StatementContext,
        params: &[DataValue],
        hint: Option<&HintManager>,
    ) -> ShardingResult<ExecutionPlan> {
        let rule = self.rules.snapshot();
        let available = self.provider.available_data_sources();
        plan_statement(&rule, statement, params, hint, available.as_deref())
    }

    pub fn plan_and_execute(&self, statement: &StatementContext, params: &[DataValue]) -> ShardingResult<ExecutionOutput> {
        self.execute_with_cancel(statement, params, None, &CancelFlag::new())
    }

    pub fn plan_and_execute_with_hint(
        &self,
        statement: &StatementContext,
        params: &[DataValue],
        hint: &HintManager,
    ) -> ShardingResult<ExecutionOutput> {
        self.execute_with_cancel(statement, params, Some(hint), &CancelFlag::new())
    }

    /// Bind `sql` and execute it
    pub fn execute_sql(&self, sql: &str, params: &[DataValue]) -> ShardingResult<ExecutionOutput> {
        let statement = StatementContext::bind(sql)?;
        self.plan_and_execute(&statement, params)
    }

    /// Execute with a caller-held cancel flag, scoped to this one query
    pub fn execute_with_cancel(
        &self,
        statement: &StatementContext,
        params: &[DataValue],
        hint: Option<&HintManager>,
        cancel: &CancelFlag,
    ) -> ShardingResult<ExecutionOutput> {
        let rule = self.rules.snapshot();
        let available = self.provider.available_data_sources();
        let plan = plan_statement(&rule, statement, params, hint, available.as_deref())?;

        let coordinator = ExecutionCoordinator::new(self.provider.as_ref(), rule.props());
        let outcomes = coordinator.execute(&plan.rewrite.units, statement.is_query(), cancel)?;

        if !statement.is_query() {
            let counts = outcomes.into_iter().map(|outcome| match outcome {
                UnitOutcome::Update(count) => count,
                UnitOutcome::Query(_) => 0,
            });
            return Ok(ExecutionOutput::Update(merge_update_counts(counts)));
        }

        let mut cursors = Vec::with_capacity(outcomes.len());
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                UnitOutcome::Query(cursor) => cursors.push(cursor),
                UnitOutcome::Update(_) => {
                    return Err(ShardingError::MergeInconsistency(format!(
                        "unit {} returned an update count for a query",
                        index
                    )));
                }
            }
        }
        let decoders = plan
            .decrypt_labels
            .into_iter()
            .map(|(label, algorithm)| (label, Box::new(algorithm) as Box<dyn ColumnValueDecoder>))
            .collect();
        let layout = ColumnLayout {
            derived_columns: plan.rewrite.derived_columns,
            trailing_columns: plan.rewrite.trailing_columns,
        };
        let merged = MergeEngine::new(rule.props()).merge(statement, cursors, layout, params, decoders)?;
        Ok(ExecutionOutput::Query(merged))
    }
}
