// Runtime Properties
//
// Knobs that shape rewriting, execution and merging for every query.

use serde::{Deserialize, Serialize};

/// SQL dialect of the physical databases; selects pagination syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    #[default]
    #[serde(alias = "mysql")]
    MySql,
    #[serde(alias = "postgresql", alias = "postgres")]
    PostgreSql,
    #[serde(alias = "sqlserver")]
    SqlServer,
    Oracle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingProps {
    /// Log logic and actual SQL at info level
    pub sql_show: bool,
    pub dialect: Dialect,
    /// Upper bound on concurrently executing units of one query
    pub max_connections_per_query: usize,
    /// Cancel remaining units on the first failure
    pub strict_execution: bool,
    pub query_timeout_ms: Option<u64>,
    /// Rows a memory merge may buffer before failing
    pub max_memory_merge_rows: usize,
    /// Worker id for the snowflake key generator (0..1024)
    pub worker_id: u16,
}

impl Default for ShardingProps {
    fn default() -> Self {
        ShardingProps {
            sql_show: false,
            dialect: Dialect::MySql,
            max_connections_per_query: 8,
            strict_execution: false,
            query_timeout_ms: None,
            max_memory_merge_rows: 1_000_000,
            worker_id: 0,
        }
    }
}
