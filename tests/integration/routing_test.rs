use anyhow::Result;
use rand::Rng;

use bayunshard::route::{RouteContext, RoutingEngine, ShardingConditions};
use bayunshard::{DataValue, HintManager, ShardingError, ShardingResult, ShardingRule, StatementContext};

#[path = "../common/mod.rs"]
mod common;
use common::sharding_rule;

fn route_with(
    rule: &ShardingRule,
    sql: &str,
    params: &[DataValue],
    hint: Option<&HintManager>,
    available: Option<&[String]>,
) -> ShardingResult<RouteContext> {
    let ctx = StatementContext::bind(sql)?;
    let generated = rule.generated_keys(&ctx);
    let conditions = ShardingConditions::extract(rule, &ctx, generated.as_ref())?;
    RoutingEngine::new(rule, available).route(&ctx, &conditions, params, hint)
}

fn route(sql: &str, params: &[DataValue]) -> Result<RouteContext> {
    Ok(route_with(&sharding_rule()?, sql, params, None, None)?)
}

fn nodes(route: &RouteContext, table: &str) -> Vec<String> {
    route
        .units
        .iter()
        .map(|u| format!("{}.{}", u.data_source, u.actual_table(table).unwrap_or("?")))
        .collect()
}

#[test]
fn test_precise_route_on_both_columns() -> Result<()> {
    let route = route("SELECT * FROM t_order WHERE user_id = ? AND order_id = ?", &[3.into(), 4.into()])?;
    assert_eq!(nodes(&route, "t_order"), vec!["ds_1.t_order_0"]);
    assert!(route.is_single_unit());
    Ok(())
}

#[test]
fn test_database_only_condition_spans_tables() -> Result<()> {
    let route = route("SELECT * FROM t_order WHERE user_id = 2", &[])?;
    assert_eq!(nodes(&route, "t_order"), vec!["ds_0.t_order_0", "ds_0.t_order_1"]);
    Ok(())
}

#[test]
fn test_in_list_collects_targets() -> Result<()> {
    let route = route("SELECT * FROM t_order WHERE user_id IN (1, 3) AND order_id IN (?, ?)", &[2.into(), 4.into()])?;
    assert_eq!(nodes(&route, "t_order"), vec!["ds_1.t_order_0"]);
    Ok(())
}

#[test]
fn test_full_route_without_conditions() -> Result<()> {
    let route = route("SELECT COUNT(*) FROM t_order", &[])?;
    assert_eq!(
        nodes(&route, "t_order"),
        vec!["ds_0.t_order_0", "ds_0.t_order_1", "ds_1.t_order_0", "ds_1.t_order_1"]
    );
    Ok(())
}

#[test]
fn test_or_predicate_routes_everywhere() -> Result<()> {
    let route = route("SELECT * FROM t_order WHERE user_id = 1 OR order_id = 2", &[])?;
    assert_eq!(route.units.len(), 4);
    Ok(())
}

#[test]
fn test_range_on_mod_algorithm() -> Result<()> {
    let route = route("SELECT * FROM t_user WHERE user_id BETWEEN 5 AND 5", &[])?;
    assert_eq!(route.data_sources(), vec!["ds_1"]);

    let route = self::route("SELECT * FROM t_user WHERE user_id BETWEEN 1 AND 100", &[])?;
    assert_eq!(route.units.len(), 2);
    Ok(())
}

#[test]
fn test_unbounded_range_on_mod_algorithm() -> Result<()> {
    let route = route("SELECT * FROM t_user WHERE user_id BETWEEN ? AND ?", &[(-5).into(), i64::MAX.into()])?;
    assert_eq!(route.data_sources(), vec!["ds_0", "ds_1"]);
    Ok(())
}

#[test]
fn test_binding_tables_are_zipped() -> Result<()> {
    let route = route(
        "SELECT * FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id WHERE o.user_id = 1",
        &[],
    )?;
    assert_eq!(route.units.len(), 2);
    for unit in &route.units {
        let order = unit.actual_table("t_order").unwrap_or_default();
        let item = unit.actual_table("t_order_item").unwrap_or_default();
        assert_eq!(order.chars().last(), item.chars().last());
        assert_eq!(unit.data_source, "ds_1");
    }
    Ok(())
}

#[test]
fn test_broadcast_table_reads_once_and_writes_everywhere() -> Result<()> {
    let read = route("SELECT * FROM t_config", &[])?;
    assert_eq!(read.units.len(), 1);

    let write = route("UPDATE t_config SET value = 'x' WHERE name = 'a'", &[])?;
    assert_eq!(write.data_sources(), vec!["ds_0", "ds_1"]);
    Ok(())
}

#[test]
fn test_broadcast_read_skips_unavailable_source() -> Result<()> {
    let rule = sharding_rule()?;
    let available = vec!["ds_1".to_string()];
    let route = route_with(&rule, "SELECT * FROM t_config", &[], None, Some(&available))?;
    assert_eq!(route.units[0].data_source, "ds_1");
    Ok(())
}

#[test]
fn test_unconfigured_table_goes_to_default_source() -> Result<()> {
    let route = route("SELECT * FROM t_log WHERE id = 1", &[])?;
    assert_eq!(route.units.len(), 1);
    assert_eq!(route.units[0].data_source, "ds_0");
    assert_eq!(route.units[0].actual_table("t_log"), Some("t_log"));
    Ok(())
}

#[test]
fn test_unconfigured_table_with_sharding_table_is_rejected() {
    let err = route("SELECT * FROM t_order o JOIN t_log l ON o.order_id = l.id", &[]).unwrap_err();
    assert!(matches!(err.downcast_ref::<ShardingError>(), Some(ShardingError::UnsupportedShardingOperation(_))));
}

#[test]
fn test_insert_rows_route_individually() -> Result<()> {
    let route = route(
        "INSERT INTO t_order (user_id, order_id, status) VALUES (1, 1, 'a'), (2, 2, 'b'), (3, 5, 'c')",
        &[],
    )?;
    assert_eq!(nodes(&route, "t_order"), vec!["ds_0.t_order_0", "ds_1.t_order_1"]);
    assert_eq!(route.insert_rows_for(&route.units[1]), vec![0, 2]);
    Ok(())
}

#[test]
fn test_insert_with_generated_key() -> Result<()> {
    let rule = sharding_rule()?;
    let ctx = StatementContext::bind("INSERT INTO t_order (user_id, status) VALUES (?, ?)")?;
    let generated = rule.generated_keys(&ctx).expect("order_id is generated");
    let key = generated.values[0].as_i64().unwrap_or_default();
    let conditions = ShardingConditions::extract(&rule, &ctx, Some(&generated))?;
    let route = RoutingEngine::new(&rule, None).route(&ctx, &conditions, &[4.into(), "new".into()], None)?;
    let expected = format!("ds_0.t_order_{}", key % 2);
    assert_eq!(nodes(&route, "t_order"), vec![expected]);
    Ok(())
}

#[test]
fn test_insert_missing_sharding_value_is_rejected() {
    let err = route("INSERT INTO t_order_item (order_id, item) VALUES (1, 'x')", &[]).unwrap_err();
    assert!(matches!(err.downcast_ref::<ShardingError>(), Some(ShardingError::UnsupportedShardingOperation(_))));
}

#[test]
fn test_hint_values_replace_conditions() -> Result<()> {
    let rule = sharding_rule()?;
    let mut hint = HintManager::new();
    hint.add_database_value("t_order", 1).add_table_value("t_order", 0);
    let route = route_with(&rule, "SELECT * FROM t_order", &[], Some(&hint), None)?;
    assert_eq!(nodes(&route, "t_order"), vec!["ds_1.t_order_0"]);
    Ok(())
}

#[test]
fn test_hint_data_source_bypasses_rules() -> Result<()> {
    let rule = sharding_rule()?;
    let mut hint = HintManager::new();
    hint.set_data_source("ds_1");
    let route = route_with(&rule, "SELECT * FROM t_order WHERE user_id = 2", &[], Some(&hint), None)?;
    assert_eq!(route.units.len(), 1);
    assert_eq!(route.units[0].data_source, "ds_1");

    hint.set_data_source("ds_9");
    let err = route_with(&rule, "SELECT * FROM t_order", &[], Some(&hint), None).unwrap_err();
    assert!(matches!(err, ShardingError::RoutingFailure(_)));
    Ok(())
}

#[test]
fn test_unavailable_target_fails() -> Result<()> {
    let rule = sharding_rule()?;
    let available = vec!["ds_0".to_string()];
    let err = route_with(&rule, "SELECT * FROM t_order WHERE user_id = 1", &[], None, Some(&available)).unwrap_err();
    assert!(matches!(err, ShardingError::RoutingFailure(_)));
    Ok(())
}

#[test]
fn test_random_keys_hit_exactly_one_node() -> Result<()> {
    let rule = sharding_rule()?;
    let mut rng = rand::thread_rng();
    for _ in 0..50 {
        let user_id: i64 = rng.gen_range(0..10_000);
        let order_id: i64 = rng.gen_range(0..10_000);
        let route = route_with(
            &rule,
            "SELECT * FROM t_order WHERE user_id = ? AND order_id = ?",
            &[user_id.into(), order_id.into()],
            None,
            None,
        )?;
        assert_eq!(
            nodes(&route, "t_order"),
            vec![format!("ds_{}.t_order_{}", user_id % 2, order_id % 2)]
        );
    }
    Ok(())
}

#[test]
fn test_routing_is_deterministic() -> Result<()> {
    let rule = sharding_rule()?;
    let statements = [
        ("DELETE FROM t_config WHERE name = 'a'", 2),
        ("SELECT * FROM t_order o JOIN t_user u ON o.user_id = u.user_id", 4),
        ("SELECT * FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id", 4),
        ("SELECT * FROM t_order WHERE order_id IN (1, 2, 3) ORDER BY order_id", 4),
    ];
    for (sql, expected_units) in statements {
        let first = route_with(&rule, sql, &[], None, None)?;
        let second = route_with(&rule, sql, &[], None, None)?;
        assert_eq!(first.units.len(), expected_units, "{}", sql);
        assert_eq!(first, second, "{}", sql);
    }
    Ok(())
}
