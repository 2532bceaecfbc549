// BayunShard - sharding routing, rewrite and merge engine

pub mod common;
pub mod config;
pub mod encrypt;
pub mod execute;
pub mod merge;
pub mod query;
pub mod rewrite;
pub mod route;
pub mod runtime;
pub mod sharding;

// Re-export key items for convenient access
pub use common::error::{ShardingError, ShardingResult};
pub use common::value::DataValue;
pub use config::{ShardingProps, ShardingRuleConfig};
pub use execute::{CancelFlag, Connection, ConnectionProvider, ResultCursor};
pub use merge::{MergedResult, MergedResultSet};
pub use query::context::StatementContext;
pub use route::hint::HintManager;
pub use runtime::{ExecutionOutput, ShardingRuntime};
pub use sharding::ShardingRule;
