// Configuration Loader
//
// Reads a `ShardingRuleConfig` from JSON text or a JSON file.

use std::fs;
use std::path::Path;

use log::debug;

use super::rule_config::ShardingRuleConfig;
use super::ConfigError;

/// Parse a rule configuration from JSON text
pub fn parse_config(json: &str) -> Result<ShardingRuleConfig, ConfigError> {
    let config: ShardingRuleConfig = serde_json::from_str(json)?;
    if config.data_sources.is_empty() {
        return Err(ConfigError::invalid("at least one data source is required"));
    }
    Ok(config)
}

/// Load a rule configuration from a JSON file
pub fn load_config(path: impl AsRef<Path>) -> Result<ShardingRuleConfig, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config = parse_config(&text)?;
    debug!(
        "Loaded sharding config from {}: {} data sources, {} table rules",
        path.display(),
        config.data_sources.len(),
        config.tables.len()
    );
    Ok(config)
}
