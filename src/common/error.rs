// Sharding Error Types
//
// Every stage reports failures through `ShardingError`. Routing and rewrite
// errors abort a statement before any connection is acquired; execution
// errors may carry the outcomes of sibling units that did complete.

use std::fmt;

use thiserror::Error;

use super::value::DataValue;
use crate::config::ConfigError;
use crate::query::parser::components::ParseError;

/// Result type for every sharding operation
pub type ShardingResult<T> = Result<T, ShardingError>;

#[derive(Error, Debug)]
pub enum ShardingError {
    /// The logical SQL could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    /// The statement parsed but is structurally unusable (e.g. value/column count mismatch)
    #[error("Invalid statement: {0}")]
    InvalidStatement(String),
    /// Rule or property configuration is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// No valid route could be determined
    #[error("Routing failure: {0}")]
    RoutingFailure(String),
    /// The statement shape cannot be executed correctly across shards
    #[error("Unsupported sharding operation: {0}")]
    UnsupportedShardingOperation(String),
    /// Token generation or SQL assembly failed
    #[error("Rewrite error: {0}")]
    Rewrite(String),
    /// Too few parameters, or a parameter of the wrong type
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// A connection could not be acquired from the provider
    #[error("Connection error on data source '{data_source}': {message}")]
    Connection { data_source: String, message: String },
    /// A physical statement failed
    #[error("Execution error: {0}")]
    Execution(String),
    /// The query was cancelled before completion
    #[error("Execution cancelled")]
    Cancelled,
    /// The per-query deadline elapsed
    #[error("Query timed out after {0} ms")]
    Timeout(u64),
    /// One or more execution units failed
    #[error("{0}")]
    PartialExecutionFailure(Box<PartialFailure>),
    /// Shard results disagree in shape
    #[error("Merge inconsistency: {0}")]
    MergeInconsistency(String),
    /// In-memory merge would buffer more rows than allowed
    #[error("Memory merge exceeded the limit of {limit} rows")]
    MemoryLimitExceeded { limit: usize },
    /// Values of incompatible types were compared or combined
    #[error("Type error: {0}")]
    TypeError(String),
    /// Result cursor used outside its valid states
    #[error("Invalid cursor state: {0}")]
    InvalidCursorState(String),
}

impl ShardingError {
    pub fn connection(data_source: &str, message: impl Into<String>) -> Self {
        ShardingError::Connection {
            data_source: data_source.to_string(),
            message: message.into(),
        }
    }

    /// Partial failure details, when this error is an aggregate execution failure
    pub fn partial_failure(&self) -> Option<&PartialFailure> {
        match self {
            ShardingError::PartialExecutionFailure(failure) => Some(failure),
            _ => None,
        }
    }
}

/// A failed execution unit
#[derive(Debug)]
pub struct UnitFailure {
    pub unit_index: usize,
    pub data_source: String,
    pub sql: String,
    pub cause: ShardingError,
}

/// Outcome of a unit that completed before its siblings failed
#[derive(Debug, Clone, PartialEq)]
pub enum CompletedOutcome {
    Rows { columns: Vec<String>, rows: Vec<Vec<DataValue>> },
    Updated(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedUnit {
    pub unit_index: usize,
    pub data_source: String,
    pub outcome: CompletedOutcome,
}

/// Aggregate execution failure
#[derive(Debug)]
pub struct PartialFailure {
    pub total_units: usize,
    pub failures: Vec<UnitFailure>,
    pub completed: Vec<CompletedUnit>,
}

impl fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} execution units failed",
            self.failures.len(),
            self.total_units
        )?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}unit {} on '{}' ({})", sep, failure.unit_index, failure.data_source, failure.cause)?;
        }
        Ok(())
    }
}
