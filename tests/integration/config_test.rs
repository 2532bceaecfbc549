use std::io::Write;

use anyhow::Result;
use tempfile::NamedTempFile;

use bayunshard::config::{
    load_config, parse_config, AlgorithmConfig, ConfigError, Dialect, EncryptAlgorithmConfig, StrategyConfig,
};
use bayunshard::{ShardingError, ShardingRule};

#[path = "../common/mod.rs"]
mod common;
use common::{rule_config, RULE_JSON};

fn is_invalid(result: Result<ShardingRule, ShardingError>) -> bool {
    matches!(result, Err(ShardingError::Config(ConfigError::Invalid(_))))
}

#[test]
fn test_load_from_file() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    file.write_all(RULE_JSON.as_bytes())?;
    let config = load_config(file.path())?;
    assert_eq!(config.data_sources, vec!["ds_0", "ds_1"]);
    assert_eq!(config.tables.len(), 3);
    assert_eq!(config.binding_tables, vec![vec!["t_order".to_string(), "t_order_item".to_string()]]);
    let encrypt = config.encrypt.as_ref().expect("encrypt section");
    assert_eq!(encrypt.tables[0].columns[0].algorithm, EncryptAlgorithmConfig::Hex);
    Ok(())
}

#[test]
fn test_rule_compiles_data_nodes() -> Result<()> {
    let rule = ShardingRule::new(rule_config()?)?;
    let order = rule.table_rule("T_ORDER").expect("t_order rule");
    let nodes: Vec<String> = order.data_nodes.iter().map(|n| n.to_string()).collect();
    assert_eq!(nodes, vec!["ds_0.t_order_0", "ds_0.t_order_1", "ds_1.t_order_0", "ds_1.t_order_1"]);
    assert_eq!(order.key_column.as_deref(), Some("order_id"));
    assert!(rule.is_broadcast_table("t_config"));
    assert!(rule.is_all_binding(&["t_order".to_string(), "t_order_item".to_string()]));
    assert_eq!(rule.default_data_source(), Some("ds_0"));
    Ok(())
}

#[test]
fn test_props_parse_with_defaults() -> Result<()> {
    let config = parse_config(
        r#"{"data_sources": ["ds"], "props": {"dialect": "postgresql", "query_timeout_ms": 500, "strict_execution": true}}"#,
    )?;
    assert_eq!(config.props.dialect, Dialect::PostgreSql);
    assert_eq!(config.props.query_timeout_ms, Some(500));
    assert!(config.props.strict_execution);
    assert_eq!(config.props.max_connections_per_query, 8);

    // A single data source becomes the default
    let rule = ShardingRule::new(config)?;
    assert_eq!(rule.default_data_source(), Some("ds"));
    Ok(())
}

#[test]
fn test_unknown_data_source_in_nodes() -> Result<()> {
    let mut config = rule_config()?;
    config.tables[0].actual_data_nodes = Some("ds_${0..2}.t_order".into());
    assert!(is_invalid(ShardingRule::new(config)));
    Ok(())
}

#[test]
fn test_invalid_algorithms() -> Result<()> {
    let mut config = rule_config()?;
    config.tables[2].database_strategy = Some(StrategyConfig::Standard {
        sharding_column: "user_id".into(),
        algorithm: AlgorithmConfig::Mod { sharding_count: 0 },
    });
    assert!(is_invalid(ShardingRule::new(config)));

    let mut config = rule_config()?;
    config.tables[2].database_strategy = Some(StrategyConfig::Standard {
        sharding_column: "user_id".into(),
        algorithm: AlgorithmConfig::BoundaryRange { boundaries: vec![10, 5] },
    });
    assert!(is_invalid(ShardingRule::new(config)));

    let mut config = rule_config()?;
    config.tables[0].actual_data_nodes = Some("ds_${0..1.t_order".into());
    assert!(ShardingRule::new(config).is_err());
    Ok(())
}

#[test]
fn test_conflicting_table_settings() -> Result<()> {
    let mut config = rule_config()?;
    config.broadcast_tables.push("t_order".into());
    assert!(is_invalid(ShardingRule::new(config)));

    let mut config = rule_config()?;
    config.binding_tables = vec![vec!["t_order".into(), "t_user".into()]];
    assert!(is_invalid(ShardingRule::new(config)));

    let mut config = rule_config()?;
    config.default_data_source = Some("ds_7".into());
    assert!(is_invalid(ShardingRule::new(config)));

    let mut config = rule_config()?;
    config.data_sources.push("ds_0".into());
    assert!(is_invalid(ShardingRule::new(config)));
    Ok(())
}

#[test]
fn test_worker_id_bound() -> Result<()> {
    let mut config = rule_config()?;
    config.props.worker_id = 4096;
    assert!(is_invalid(ShardingRule::new(config)));
    Ok(())
}

#[test]
fn test_bad_files() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    file.write_all(b"{\"data_sources\": [")?;
    assert!(matches!(load_config(file.path()), Err(ConfigError::Json(_))));
    assert!(matches!(parse_config(r#"{"data_sources": []}"#), Err(ConfigError::Invalid(_))));
    assert!(matches!(load_config("/definitely/missing.json"), Err(ConfigError::Io { .. })));
    Ok(())
}
