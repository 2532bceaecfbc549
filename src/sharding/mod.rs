// Sharding Module
//
// Rule model of the middleware: how each logic table maps onto data nodes
// and which algorithm picks among them.

pub mod algorithm;
pub mod holder;
pub mod inline;
pub mod keygen;
pub mod rule;

pub use algorithm::{ColumnShardingValue, ShardingAlgorithm, ShardingRange, ShardingStrategy, ShardingValue};
pub use holder::RuleHolder;
pub use inline::{expand_inline, InlineExpression};
pub use keygen::{GeneratedKeyContext, SnowflakeKeyGenerator};
pub use rule::{ShardingRule, TableRule};

/// Physical layout lookups
pub trait MetadataCatalog {
    /// Actual tables backing a logic table, in data node order
    fn list_actual_tables(&self, logic_table: &str) -> Vec<String>;

    fn list_data_sources(&self) -> Vec<String>;
}
