use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Result};

use bayunshard::{
    DataValue, ExecutionOutput, HintManager, MergedResult, MergedResultSet, ShardingError, ShardingRuntime,
    StatementContext,
};

#[path = "../common/mod.rs"]
mod common;
use common::{int_rows, rule_config, RecordingProvider};

fn runtime(provider: &RecordingProvider) -> Result<ShardingRuntime> {
    Ok(ShardingRuntime::from_config(rule_config()?, provider.shared())?)
}

fn query(output: ExecutionOutput) -> Result<MergedResultSet> {
    match output {
        ExecutionOutput::Query(rs) => Ok(rs),
        ExecutionOutput::Update(_) => Err(anyhow!("expected a result set")),
    }
}

fn updated(output: ExecutionOutput) -> Result<u64> {
    match output {
        ExecutionOutput::Update(count) => Ok(count),
        ExecutionOutput::Query(_) => Err(anyhow!("expected an update count")),
    }
}

#[test]
fn test_paged_query_across_all_shards() -> Result<()> {
    let provider = RecordingProvider::new();
    provider
        .answer_table("ds_0", "t_order_0", &["order_id"], int_rows(&[2, 8]))
        .answer_table("ds_0", "t_order_1", &["order_id"], int_rows(&[1, 5]))
        .answer_table("ds_1", "t_order_0", &["order_id"], int_rows(&[4, 6]))
        .answer_table("ds_1", "t_order_1", &["order_id"], int_rows(&[3, 7]));
    let runtime = runtime(&provider)?;

    let mut rs = query(runtime.execute_sql("SELECT order_id FROM t_order ORDER BY order_id LIMIT ?, ?", &[
        2.into(),
        3.into(),
    ])?)?;
    let ids: Vec<i64> = rs.collect_rows()?.iter().filter_map(|r| r[0].as_i64()).collect();
    assert_eq!(ids, vec![3, 4, 5]);

    let executed = provider.executed();
    assert_eq!(executed.len(), 4);
    assert!(executed.iter().all(|e| e.params == vec![DataValue::Integer(0), DataValue::Integer(5)]));
    Ok(())
}

#[test]
fn test_grouped_average_end_to_end() -> Result<()> {
    let labels = ["user_id", "AVG(price)", "AVG_DERIVED_COUNT_0", "AVG_DERIVED_SUM_0"];
    let provider = RecordingProvider::new();
    provider
        .answer_table("ds_1", "t_order_0", &labels, vec![vec![1.into(), DataValue::Float(4.0), 1.into(), 4.into()]])
        .answer_table("ds_1", "t_order_1", &labels, vec![vec![1.into(), DataValue::Float(1.0), 2.into(), 2.into()]]);
    let runtime = runtime(&provider)?;

    let mut rs = query(runtime.execute_sql(
        "SELECT user_id, AVG(price) FROM t_order WHERE user_id = 1 GROUP BY user_id ORDER BY user_id",
        &[],
    )?)?;
    assert_eq!(rs.column_labels(), &["user_id".to_string(), "AVG(price)".to_string()]);
    assert_eq!(rs.collect_rows()?, vec![vec![DataValue::Integer(1), DataValue::Float(2.0)]]);
    Ok(())
}

#[test]
fn test_encrypted_column_round_trip() -> Result<()> {
    let provider = RecordingProvider::new();
    provider.answer("ds_1", &["user_id", "pwd"], vec![vec![1.into(), "736563726574".into()]]);
    let runtime = runtime(&provider)?;

    let mut rs = query(runtime.execute_sql("SELECT user_id, pwd FROM t_user WHERE user_id = ?", &[1.into()])?)?;
    assert!(rs.next()?);
    assert_eq!(rs.value(1)?, DataValue::from("secret"));
    assert!(!rs.next()?);

    assert_eq!(provider.executed()[0].sql, "SELECT user_id, pwd_cipher AS pwd FROM t_user WHERE user_id = ?");
    Ok(())
}

#[test]
fn test_insert_with_generated_key() -> Result<()> {
    let provider = RecordingProvider::new();
    let runtime = runtime(&provider)?;
    let count = updated(runtime.execute_sql(
        "INSERT INTO t_order (user_id, status) VALUES (?, 'new'), (?, 'new')",
        &[1.into(), 2.into()],
    )?)?;
    assert_eq!(count, 2);

    let executed = provider.executed();
    assert_eq!(executed.len(), 2);
    for statement in &executed {
        assert!(statement.sql.contains("(user_id, status, order_id)"));
        assert_eq!(statement.params.len(), 1);
    }
    Ok(())
}

#[test]
fn test_broadcast_update_sums_counts() -> Result<()> {
    let provider = RecordingProvider::new();
    provider.update_count("ds_0", 2).update_count("ds_1", 2);
    let runtime = runtime(&provider)?;
    assert_eq!(updated(runtime.execute_sql("UPDATE t_config SET value = ? WHERE name = 'x'", &["y".into()])?)?, 4);
    Ok(())
}

#[test]
fn test_contradictory_conditions_touch_no_shard() -> Result<()> {
    let provider = RecordingProvider::new();
    let runtime = runtime(&provider)?;

    let mut rs = query(runtime.execute_sql(
        "SELECT order_id, status FROM t_order WHERE order_id = ? AND order_id = ? ORDER BY order_id",
        &[1.into(), 2.into()],
    )?)?;
    assert_eq!(rs.column_labels(), &["order_id".to_string(), "status".to_string()]);
    assert!(rs.collect_rows()?.is_empty());

    let count = updated(runtime.execute_sql("UPDATE t_order SET status = 'x' WHERE order_id = 1 AND order_id = 2", &[])?)?;
    assert_eq!(count, 0);
    assert!(provider.executed().is_empty());
    Ok(())
}

#[test]
fn test_partial_failure_surfaces() -> Result<()> {
    let provider = RecordingProvider::new();
    provider.answer("ds_0", &["order_id"], int_rows(&[1])).fail("ds_1");
    let runtime = runtime(&provider)?;
    let err = runtime.execute_sql("SELECT order_id FROM t_order", &[]).unwrap_err();
    let failure = err.partial_failure().ok_or_else(|| anyhow!("expected partial failure, got {}", err))?;
    assert_eq!(failure.total_units, 4);
    assert_eq!(failure.failures.len(), 2);
    assert_eq!(failure.completed.len(), 2);
    Ok(())
}

#[test]
fn test_hint_routes_statement() -> Result<()> {
    let provider = RecordingProvider::new();
    provider.answer("ds_1", &["order_id"], int_rows(&[9]));
    let runtime = runtime(&provider)?;
    let mut hint = HintManager::new();
    hint.add_database_value("t_order", 3).add_table_value("t_order", 1);
    let ctx = StatementContext::bind("SELECT order_id FROM t_order")?;
    let mut rs = query(runtime.plan_and_execute_with_hint(&ctx, &[], &hint)?)?;
    assert_eq!(rs.collect_rows()?, int_rows(&[9]));
    assert_eq!(provider.executed()[0].sql, "SELECT order_id FROM t_order_1");
    Ok(())
}

#[test]
fn test_unavailable_source_fails_routing() -> Result<()> {
    let provider = RecordingProvider::new();
    provider.only_available(&["ds_0"]);
    let runtime = runtime(&provider)?;
    let err = runtime.execute_sql("SELECT * FROM t_order WHERE user_id = 1", &[]).unwrap_err();
    assert!(matches!(err, ShardingError::RoutingFailure(_)));
    assert!(provider.executed().is_empty());
    Ok(())
}

#[test]
fn test_sql_show_does_not_change_results() -> Result<()> {
    let provider = RecordingProvider::new();
    provider.answer("ds_0", &["id"], int_rows(&[1]));
    let mut config = rule_config()?;
    config.props.sql_show = true;
    let runtime = ShardingRuntime::from_config(config, provider.shared())?;
    let mut rs = query(runtime.execute_sql("SELECT id FROM t_log", &[])?)?;
    assert_eq!(rs.collect_rows()?, int_rows(&[1]));
    Ok(())
}

#[test]
fn test_reload_while_querying() -> Result<()> {
    let provider = RecordingProvider::new();
    provider.answer("ds_0", &["id"], int_rows(&[1])).answer("ds_1", &["id"], int_rows(&[2]));
    let runtime = Arc::new(runtime(&provider)?);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let runtime = Arc::clone(&runtime);
            thread::spawn(move || -> Result<()> {
                for _ in 0..20 {
                    let mut rs = query(runtime.execute_sql("SELECT id FROM t_config", &[])?)?;
                    assert_eq!(rs.collect_rows()?.len(), 1);
                }
                Ok(())
            })
        })
        .collect();

    for _ in 0..5 {
        let mut config = rule_config()?;
        config.broadcast_tables.push("t_dict".to_string());
        runtime.reload(config)?;
    }
    for reader in readers {
        reader.join().map_err(|_| anyhow!("reader panicked"))??;
    }
    assert_eq!(runtime.generation(), 6);
    assert!(runtime.rule().is_broadcast_table("t_dict"));
    Ok(())
}
