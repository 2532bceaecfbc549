use anyhow::Result;

use bayunshard::config::{Dialect, ShardingProps};
use bayunshard::rewrite::ExecutionUnit;
use bayunshard::runtime::{plan_statement, ExecutionPlan};
use bayunshard::{DataValue, ShardingError, ShardingRule, StatementContext};

#[path = "../common/mod.rs"]
mod common;
use common::{rule_config, sharding_rule};

fn plan_with(rule: &ShardingRule, sql: &str, params: &[DataValue]) -> Result<ExecutionPlan> {
    let ctx = StatementContext::bind(sql)?;
    Ok(plan_statement(rule, &ctx, params, None, None)?)
}

fn plan(sql: &str, params: &[DataValue]) -> Result<ExecutionPlan> {
    plan_with(&sharding_rule()?, sql, params)
}

fn rule_for(dialect: Dialect) -> Result<ShardingRule> {
    let mut config = rule_config()?;
    config.props = ShardingProps { dialect, ..Default::default() };
    Ok(ShardingRule::new(config)?)
}

fn unit(data_source: &str, sql: &str, parameters: Vec<DataValue>) -> ExecutionUnit {
    ExecutionUnit { data_source: data_source.to_string(), sql: sql.to_string(), parameters }
}

#[test]
fn test_single_unit_keeps_statement_shape() -> Result<()> {
    let plan = plan("SELECT * FROM t_order WHERE user_id = ? AND order_id = ? LIMIT 10, 5", &[3.into(), 4.into()])?;
    assert_eq!(
        plan.rewrite.units,
        vec![unit(
            "ds_1",
            "SELECT * FROM t_order_0 WHERE user_id = ? AND order_id = ? LIMIT 10, 5",
            vec![3.into(), 4.into()]
        )]
    );
    Ok(())
}

#[test]
fn test_table_owner_follows_table() -> Result<()> {
    let plan = plan("SELECT t_order.status FROM t_order WHERE t_order.user_id = 1 AND t_order.order_id = 1", &[])?;
    assert_eq!(
        plan.rewrite.units[0].sql,
        "SELECT t_order_1.status FROM t_order_1 WHERE t_order_1.user_id = 1 AND t_order_1.order_id = 1"
    );
    Ok(())
}

#[test]
fn test_aliases_are_preserved_in_binding_join() -> Result<()> {
    let plan = plan(
        "SELECT o.order_id, i.item FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id \
         WHERE o.user_id = 2 AND o.order_id = 7",
        &[],
    )?;
    assert_eq!(
        plan.rewrite.units[0].sql,
        "SELECT o.order_id, i.item FROM t_order_1 o JOIN t_order_item_1 i ON o.order_id = i.order_id \
         WHERE o.user_id = 2 AND o.order_id = 7"
    );
    assert_eq!(plan.rewrite.units[0].data_source, "ds_0");
    Ok(())
}

#[test]
fn test_multi_unit_pagination_is_widened() -> Result<()> {
    let plan = plan("SELECT order_id FROM t_order ORDER BY order_id LIMIT 10, 5", &[])?;
    assert_eq!(plan.rewrite.units.len(), 4);
    assert_eq!(plan.rewrite.units[3].sql, "SELECT order_id FROM t_order_1 ORDER BY order_id LIMIT 0, 15");
    assert_eq!(plan.rewrite.derived_columns, 0);
    Ok(())
}

#[test]
fn test_parameterized_pagination_offset_form() -> Result<()> {
    let plan = plan("SELECT order_id FROM t_order ORDER BY order_id LIMIT ? OFFSET ?", &[5.into(), 20.into()])?;
    for unit in &plan.rewrite.units {
        assert_eq!(unit.parameters, vec![DataValue::Integer(25), DataValue::Integer(0)]);
    }
    Ok(())
}

#[test]
fn test_order_by_column_outside_projection_is_derived() -> Result<()> {
    let plan = plan("SELECT status FROM t_order WHERE user_id = 1 ORDER BY order_id DESC", &[])?;
    assert_eq!(
        plan.rewrite.units[0].sql,
        "SELECT status, order_id AS ORDER_BY_DERIVED_0 FROM t_order_0 WHERE user_id = 1 ORDER BY order_id DESC"
    );
    assert_eq!(plan.rewrite.derived_columns, 1);
    Ok(())
}

#[test]
fn test_group_by_differs_from_order_by_fetches_everything() -> Result<()> {
    let plan = plan("SELECT user_id, COUNT(*) FROM t_order GROUP BY user_id ORDER BY COUNT(*) DESC LIMIT 3", &[])?;
    assert!(plan.rewrite.units.iter().all(|u| u.sql.ends_with("LIMIT 2147483647")));
    Ok(())
}

#[test]
fn test_avg_gets_count_and_sum() -> Result<()> {
    let plan = plan("SELECT AVG(price) AS avg_price FROM t_order", &[])?;
    assert_eq!(
        plan.rewrite.units[0].sql,
        "SELECT AVG(price) AS avg_price, COUNT(price) AS AVG_DERIVED_COUNT_0, SUM(price) AS AVG_DERIVED_SUM_0 \
         FROM t_order_0"
    );
    assert_eq!(plan.rewrite.derived_columns, 2);
    Ok(())
}

#[test]
fn test_single_unit_adds_no_derived_columns() -> Result<()> {
    let plan = plan("SELECT AVG(price) FROM t_order WHERE user_id = 1 AND order_id = 1", &[])?;
    assert_eq!(plan.rewrite.units[0].sql, "SELECT AVG(price) FROM t_order_1 WHERE user_id = 1 AND order_id = 1");
    assert_eq!(plan.rewrite.derived_columns, 0);
    Ok(())
}

#[test]
fn test_insert_rows_are_split_across_units() -> Result<()> {
    let plan = plan(
        "INSERT INTO t_order (user_id, order_id, status) VALUES (?, ?, 'a'), (2, 2, ?)",
        &[1.into(), 1.into(), "b".into()],
    )?;
    assert_eq!(
        plan.rewrite.units,
        vec![
            unit("ds_0", "INSERT INTO t_order_0 (user_id, order_id, status) VALUES (2, 2, ?)", vec!["b".into()]),
            unit(
                "ds_1",
                "INSERT INTO t_order_1 (user_id, order_id, status) VALUES (?, ?, 'a')",
                vec![1.into(), 1.into()]
            ),
        ]
    );
    Ok(())
}

#[test]
fn test_generated_key_is_appended() -> Result<()> {
    let plan = plan("INSERT INTO t_order (user_id, status) VALUES (?, ?)", &[2.into(), "x".into()])?;
    let keys = plan.generated_keys.clone().expect("order_id is generated");
    let key = keys.values[0].as_i64().unwrap_or_default();
    assert_eq!(keys.column, "order_id");
    assert_eq!(
        plan.rewrite.units,
        vec![unit(
            "ds_0",
            &format!("INSERT INTO t_order_{} (user_id, status, order_id) VALUES (?, ?, {})", key % 2, key),
            vec![2.into(), "x".into()]
        )]
    );
    Ok(())
}

#[test]
fn test_encrypted_columns_are_rewritten() -> Result<()> {
    let plan = plan("SELECT pwd FROM t_user WHERE user_id = 1 AND pwd = ?", &["ab".into()])?;
    assert_eq!(
        plan.rewrite.units,
        vec![unit(
            "ds_1",
            "SELECT pwd_cipher AS pwd FROM t_user WHERE user_id = 1 AND pwd_cipher = ?",
            vec!["6162".into()]
        )]
    );
    assert_eq!(plan.decrypt_labels[0].0, "pwd");

    let plan = self::plan("INSERT INTO t_user (user_id, pwd) VALUES (1, 'ab'), (2, ?)", &["cd".into()])?;
    assert_eq!(
        plan.rewrite.units,
        vec![
            unit("ds_0", "INSERT INTO t_user (user_id, pwd_cipher) VALUES (2, ?)", vec!["6364".into()]),
            unit("ds_1", "INSERT INTO t_user (user_id, pwd_cipher) VALUES (1, '6162')", vec![]),
        ]
    );
    Ok(())
}

#[test]
fn test_postgres_limit_offset() -> Result<()> {
    let plan = plan_with(
        &rule_for(Dialect::PostgreSql)?,
        "SELECT order_id FROM t_order ORDER BY order_id LIMIT 5 OFFSET 5",
        &[],
    )?;
    assert_eq!(plan.rewrite.units[0].sql, "SELECT order_id FROM t_order_0 ORDER BY order_id LIMIT 10 OFFSET 0");
    Ok(())
}

#[test]
fn test_oracle_multi_unit_starts_at_zero() -> Result<()> {
    let plan = plan_with(&rule_for(Dialect::Oracle)?, "SELECT order_id FROM t_order LIMIT 2, 3", &[])?;
    assert_eq!(
        plan.rewrite.units[0].sql,
        "SELECT * FROM (SELECT row_.*, rownum rownum_ FROM (SELECT order_id FROM t_order_0) row_ \
         WHERE rownum <= 5) WHERE rownum_ > 0"
    );
    assert_eq!(plan.rewrite.trailing_columns, 1);
    Ok(())
}

#[test]
fn test_sql_server_drops_limit_parameters() -> Result<()> {
    let plan = plan_with(
        &rule_for(Dialect::SqlServer)?,
        "SELECT order_id FROM t_order WHERE status = ? LIMIT ?",
        &["paid".into(), 4.into()],
    )?;
    assert_eq!(plan.rewrite.units[0].sql, "SELECT TOP (4) order_id FROM t_order_0 WHERE status = ?");
    assert_eq!(plan.rewrite.units[0].parameters, vec![DataValue::from("paid")]);
    Ok(())
}

#[test]
fn test_ddl_reaches_every_node() -> Result<()> {
    let plan = plan("CREATE TABLE t_order (order_id BIGINT, user_id INT)", &[])?;
    let sql: Vec<&str> = plan.rewrite.units.iter().map(|u| u.sql.as_str()).collect();
    assert_eq!(
        sql,
        vec![
            "CREATE TABLE t_order_0 (order_id BIGINT, user_id INT)",
            "CREATE TABLE t_order_1 (order_id BIGINT, user_id INT)",
            "CREATE TABLE t_order_0 (order_id BIGINT, user_id INT)",
            "CREATE TABLE t_order_1 (order_id BIGINT, user_id INT)",
        ]
    );
    Ok(())
}

#[test]
fn test_distinct_aggregate_across_units_is_rejected() {
    let err = plan("SELECT SUM(DISTINCT price) FROM t_order", &[]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ShardingError>(),
        Some(ShardingError::UnsupportedShardingOperation(_))
    ));
}

#[test]
fn test_unit_display() {
    let unit = unit("ds_0", "SELECT 1", vec![DataValue::Integer(1)]);
    assert!(unit.to_string().starts_with("ds_0 ::: SELECT 1"));
}
