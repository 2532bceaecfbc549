// Rule Configuration
//
// Plain serde structures mirroring the JSON rule file. They carry no
// behaviour; `ShardingRule::new` validates and compiles them.

use serde::{Deserialize, Serialize};

use super::props::ShardingProps;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShardingRuleConfig {
    pub data_sources: Vec<String>,
    #[serde(default)]
    pub tables: Vec<TableRuleConfig>,
    /// Groups of tables sharded identically, joined without a cross product
    #[serde(default)]
    pub binding_tables: Vec<Vec<String>>,
    /// Tables replicated in full on every data source
    #[serde(default)]
    pub broadcast_tables: Vec<String>,
    #[serde(default)]
    pub default_database_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub default_table_strategy: Option<StrategyConfig>,
    /// Home of tables with no rule; required when more than one data source exists
    #[serde(default)]
    pub default_data_source: Option<String>,
    #[serde(default)]
    pub encrypt: Option<EncryptRuleConfig>,
    #[serde(default)]
    pub props: ShardingProps,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRuleConfig {
    pub logic_table: String,
    /// Inline expression such as `ds_${0..1}.t_order_${0..3}`; when absent
    /// the logic table exists once in every data source
    #[serde(default)]
    pub actual_data_nodes: Option<String>,
    #[serde(default)]
    pub database_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub table_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub key_generator: Option<KeyGeneratorConfig>,
}

/// Snowflake key generation for a column omitted from INSERT
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyGeneratorConfig {
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    Standard { sharding_column: String, algorithm: AlgorithmConfig },
    Complex { sharding_columns: Vec<String>, algorithm: AlgorithmConfig },
    Hint { algorithm: AlgorithmConfig },
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    Mod { sharding_count: u64 },
    HashMod { sharding_count: u64 },
    Inline { expression: String },
    /// Partition `i` covers `[boundaries[i-1], boundaries[i])`
    BoundaryRange { boundaries: Vec<i64> },
    VolumeRange { lower: i64, upper: i64, volume: i64 },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EncryptRuleConfig {
    pub tables: Vec<EncryptTableConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptTableConfig {
    pub table: String,
    pub columns: Vec<EncryptColumnConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptColumnConfig {
    pub logic_column: String,
    pub cipher_column: String,
    pub algorithm: EncryptAlgorithmConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EncryptAlgorithmConfig {
    /// Reversible hex encoding of the plaintext
    Hex,
    /// Repeating-key XOR, hex encoded
    Xor { key: String },
}
