// Sharding Rule
//
// Compiles a `ShardingRuleConfig` into the immutable rule every query reads:
// expanded data nodes per logic table, resolved strategies, binding groups,
// broadcast tables, the encrypt rule and the key generator.

use std::collections::HashSet;

use log::debug;

use super::algorithm::ShardingStrategy;
use super::inline::expand_inline;
use super::keygen::{GeneratedKeyContext, SnowflakeKeyGenerator};
use super::MetadataCatalog;
use crate::common::error::ShardingResult;
use crate::common::value::DataValue;
use crate::config::{ConfigError, ShardingProps, ShardingRuleConfig, StrategyConfig, TableRuleConfig};
use crate::encrypt::EncryptRule;
use crate::query::context::StatementContext;
use crate::route::unit::DataNode;

/// Rule for one sharded logic table
#[derive(Debug, Clone, PartialEq)]
pub struct TableRule {
    /// Lower-cased logic table name
    pub logic_table: String,
    pub data_nodes: Vec<DataNode>,
    pub database_strategy: ShardingStrategy,
    pub table_strategy: ShardingStrategy,
    pub key_column: Option<String>,
}

impl TableRule {
    fn from_config(
        config: &TableRuleConfig,
        data_sources: &[String],
        default_database: &ShardingStrategy,
        default_table: &ShardingStrategy,
    ) -> ShardingResult<Self> {
        let logic_table = config.logic_table.to_lowercase();
        let data_nodes = match &config.actual_data_nodes {
            Some(expression) => {
                let mut nodes = Vec::new();
                for text in expand_inline(expression)? {
                    let node = DataNode::parse(&text)?;
                    if !data_sources.contains(&node.data_source) {
                        return Err(ConfigError::invalid(format!(
                            "data node '{}' of '{}' names an unknown data source",
                            node, config.logic_table
                        ))
                        .into());
                    }
                    if nodes.contains(&node) {
                        return Err(ConfigError::invalid(format!("duplicate data node '{}'", node)).into());
                    }
                    nodes.push(node);
                }
                nodes
            }
            None => data_sources.iter().map(|ds| DataNode::new(ds.clone(), logic_table.clone())).collect(),
        };
        if data_nodes.is_empty() {
            return Err(ConfigError::invalid(format!("table '{}' has no data nodes", config.logic_table)).into());
        }

        let database_strategy = resolve_strategy(config.database_strategy.as_ref(), default_database)?;
        let table_strategy = resolve_strategy(config.table_strategy.as_ref(), default_table)?;

        Ok(TableRule {
            logic_table,
            data_nodes,
            database_strategy,
            table_strategy,
            key_column: config.key_generator.as_ref().map(|k| k.column.clone()),
        })
    }

    /// Distinct data sources holding this table, in node order
    pub fn data_sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = Vec::new();
        for node in &self.data_nodes {
            if !sources.contains(&node.data_source) {
                sources.push(node.data_source.clone());
            }
        }
        sources
    }

    /// Distinct actual table names across every data source, in node order
    pub fn actual_table_names(&self) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        for node in &self.data_nodes {
            if !tables.contains(&node.table) {
                tables.push(node.table.clone());
            }
        }
        tables
    }

    /// Actual tables of one data source, in node order
    pub fn actual_tables_in(&self, data_source: &str) -> Vec<String> {
        self.data_nodes
            .iter()
            .filter(|node| node.data_source == data_source)
            .map(|node| node.table.clone())
            .collect()
    }

    /// Lower-cased columns feeding either strategy, plus the key column
    pub fn sharding_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for column in self
            .database_strategy
            .sharding_columns()
            .into_iter()
            .chain(self.table_strategy.sharding_columns())
        {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        }
        columns
    }

    pub fn is_sharding_column(&self, column: &str) -> bool {
        let column = column.to_lowercase();
        self.database_strategy.sharding_columns().contains(&column.as_str())
            || self.table_strategy.sharding_columns().contains(&column.as_str())
    }
}

fn resolve_strategy(config: Option<&StrategyConfig>, default: &ShardingStrategy) -> ShardingResult<ShardingStrategy> {
    match config {
        Some(config) => Ok(ShardingStrategy::from_config(config)?),
        None => Ok(default.clone()),
    }
}

/// The compiled, immutable sharding rule
#[derive(Debug)]
pub struct ShardingRule {
    data_sources: Vec<String>,
    tables: Vec<TableRule>,
    binding_groups: Vec<Vec<String>>,
    broadcast_tables: Vec<String>,
    default_data_source: Option<String>,
    encrypt: Option<EncryptRule>,
    props: ShardingProps,
    key_generator: SnowflakeKeyGenerator,
}

impl ShardingRule {
    pub fn new(config: ShardingRuleConfig) -> ShardingResult<Self> {
        if config.data_sources.is_empty() {
            return Err(ConfigError::invalid("at least one data source is required").into());
        }
        let mut seen = HashSet::new();
        for ds in &config.data_sources {
            if !seen.insert(ds.as_str()) {
                return Err(ConfigError::invalid(format!("duplicate data source '{}'", ds)).into());
            }
        }

        let default_database = resolve_strategy(config.default_database_strategy.as_ref(), &ShardingStrategy::None)?;
        let default_table = resolve_strategy(config.default_table_strategy.as_ref(), &ShardingStrategy::None)?;

        let mut tables: Vec<TableRule> = Vec::with_capacity(config.tables.len());
        for table in &config.tables {
            let rule = TableRule::from_config(table, &config.data_sources, &default_database, &default_table)?;
            if tables.iter().any(|t| t.logic_table == rule.logic_table) {
                return Err(ConfigError::invalid(format!("duplicate table rule '{}'", table.logic_table)).into());
            }
            tables.push(rule);
        }

        let broadcast_tables: Vec<String> = config.broadcast_tables.iter().map(|t| t.to_lowercase()).collect();
        if let Some(table) = broadcast_tables.iter().find(|b| tables.iter().any(|t| t.logic_table == **b)) {
            return Err(ConfigError::invalid(format!("'{}' cannot be both sharded and broadcast", table)).into());
        }

        let binding_groups: Vec<Vec<String>> = config
            .binding_tables
            .iter()
            .map(|group| group.iter().map(|t| t.to_lowercase()).collect())
            .collect();
        for group in &binding_groups {
            validate_binding_group(group, &tables)?;
        }

        let default_data_source = match config.default_data_source {
            Some(ds) if !config.data_sources.contains(&ds) => {
                return Err(ConfigError::invalid(format!("default data source '{}' is not configured", ds)).into());
            }
            Some(ds) => Some(ds),
            None if config.data_sources.len() == 1 => config.data_sources.first().cloned(),
            None => None,
        };

        let encrypt = match &config.encrypt {
            Some(encrypt) => Some(EncryptRule::from_config(encrypt)?),
            None => None,
        };
        let key_generator = SnowflakeKeyGenerator::new(config.props.worker_id)?;

        debug!(
            "Built sharding rule: {} data sources, {} table rules, {} binding groups, {} broadcast tables",
            config.data_sources.len(),
            tables.len(),
            binding_groups.len(),
            broadcast_tables.len()
        );

        Ok(ShardingRule {
            data_sources: config.data_sources,
            tables,
            binding_groups,
            broadcast_tables,
            default_data_source,
            encrypt,
            props: config.props,
            key_generator,
        })
    }

    pub fn data_sources(&self) -> &[String] {
        &self.data_sources
    }

    pub fn table_rules(&self) -> &[TableRule] {
        &self.tables
    }

    pub fn table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        let name = logic_table.to_lowercase();
        self.tables.iter().find(|t| t.logic_table == name)
    }

    pub fn is_sharding_table(&self, logic_table: &str) -> bool {
        self.table_rule(logic_table).is_some()
    }

    pub fn is_broadcast_table(&self, logic_table: &str) -> bool {
        let name = logic_table.to_lowercase();
        self.broadcast_tables.contains(&name)
    }

    /// Binding group containing `logic_table`
    pub fn binding_group(&self, logic_table: &str) -> Option<&[String]> {
        let name = logic_table.to_lowercase();
        self.binding_groups.iter().find(|g| g.contains(&name)).map(|g| g.as_slice())
    }

    /// Every table belongs to one and the same binding group
    pub fn is_all_binding(&self, logic_tables: &[String]) -> bool {
        match logic_tables.first().and_then(|t| self.binding_group(t)) {
            Some(group) => logic_tables.iter().all(|t| group.contains(&t.to_lowercase())),
            None => false,
        }
    }

    pub fn default_data_source(&self) -> Option<&str> {
        self.default_data_source.as_deref()
    }

    pub fn props(&self) -> &ShardingProps {
        &self.props
    }

    pub fn encrypt_rule(&self) -> Option<&EncryptRule> {
        self.encrypt.as_ref()
    }

    pub fn generate_key(&self) -> i64 {
        self.key_generator.generate()
    }

    /// Generate keys for an INSERT that omits its table's key column
    pub fn generated_keys(&self, ctx: &StatementContext) -> Option<GeneratedKeyContext> {
        let insert = ctx.insert_statement()?;
        let column = self.table_rule(&insert.table.name)?.key_column.as_ref()?;
        if insert.columns.is_empty() || insert.columns.iter().any(|c| c.name.eq_ignore_ascii_case(column)) {
            return None;
        }
        let values = insert.rows.iter().map(|_| DataValue::Integer(self.generate_key())).collect();
        Some(GeneratedKeyContext { column: column.clone(), values })
    }
}

fn validate_binding_group(group: &[String], tables: &[TableRule]) -> ShardingResult<()> {
    let mut rules = Vec::with_capacity(group.len());
    for name in group {
        match tables.iter().find(|t| t.logic_table == *name) {
            Some(rule) => rules.push(rule),
            None => {
                return Err(ConfigError::invalid(format!("binding table '{}' has no table rule", name)).into());
            }
        }
    }
    if let Some((first, rest)) = rules.split_first() {
        for other in rest {
            let same_shape = first.data_sources() == other.data_sources()
                && first
                    .data_sources()
                    .iter()
                    .all(|ds| first.actual_tables_in(ds).len() == other.actual_tables_in(ds).len());
            if !same_shape {
                return Err(ConfigError::invalid(format!(
                    "binding tables '{}' and '{}' are not distributed alike",
                    first.logic_table, other.logic_table
                ))
                .into());
            }
        }
    }
    Ok(())
}

impl MetadataCatalog for ShardingRule {
    fn list_actual_tables(&self, logic_table: &str) -> Vec<String> {
        match self.table_rule(logic_table) {
            Some(rule) => rule.actual_table_names(),
            None => vec![logic_table.to_lowercase()],
        }
    }

    fn list_data_sources(&self) -> Vec<String> {
        self.data_sources.clone()
    }
}
