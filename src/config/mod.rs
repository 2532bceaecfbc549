// Configuration Module
//
// Serde-backed rule configuration, runtime properties, and the JSON loader.
// Configurations are validated when a `ShardingRule` is built from them.

pub mod loader;
pub mod props;
pub mod rule_config;

use thiserror::Error;

pub use loader::{load_config, parse_config};
pub use props::{Dialect, ShardingProps};
pub use rule_config::{
    AlgorithmConfig, EncryptAlgorithmConfig, EncryptColumnConfig, EncryptRuleConfig,
    EncryptTableConfig, KeyGeneratorConfig, ShardingRuleConfig, StrategyConfig, TableRuleConfig,
};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid(message.into())
    }
}
