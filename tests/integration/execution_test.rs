use std::time::{Duration, Instant};

use anyhow::Result;

use bayunshard::common::error::CompletedOutcome;
use bayunshard::execute::{ExecutionCoordinator, UnitOutcome};
use bayunshard::rewrite::ExecutionUnit;
use bayunshard::{CancelFlag, DataValue, ShardingError, ShardingProps};

#[path = "../common/mod.rs"]
mod common;
use common::{int_rows, RecordingProvider};

fn units(data_sources: &[&str]) -> Vec<ExecutionUnit> {
    data_sources
        .iter()
        .map(|ds| ExecutionUnit {
            data_source: ds.to_string(),
            sql: format!("SELECT id FROM t_{}", ds),
            parameters: vec![DataValue::Integer(1)],
        })
        .collect()
}

fn first_values(outcomes: Vec<UnitOutcome>) -> Result<Vec<DataValue>> {
    let mut values = Vec::new();
    for outcome in outcomes {
        match outcome {
            UnitOutcome::Query(mut cursor) => {
                assert!(cursor.next()?);
                values.push(cursor.value(0)?);
                cursor.close()?;
            }
            UnitOutcome::Update(count) => values.push(DataValue::Integer(count as i64)),
        }
    }
    Ok(values)
}

#[test]
fn test_outcomes_follow_unit_order() -> Result<()> {
    let provider = RecordingProvider::new();
    provider.answer("ds_0", &["id"], int_rows(&[10])).delay("ds_0", 40);
    provider.answer("ds_1", &["id"], int_rows(&[11]));
    provider.answer("ds_2", &["id"], int_rows(&[12]));

    let props = ShardingProps::default();
    let outcomes = ExecutionCoordinator::new(&provider, &props).execute(
        &units(&["ds_0", "ds_1", "ds_2"]),
        true,
        &CancelFlag::new(),
    )?;
    assert_eq!(first_values(outcomes)?, vec![10.into(), 11.into(), 12.into()]);

    let executed = provider.executed_on("ds_1");
    assert_eq!(executed[0].sql, "SELECT id FROM t_ds_1");
    assert_eq!(executed[0].params, vec![DataValue::Integer(1)]);
    Ok(())
}

#[test]
fn test_units_run_concurrently() -> Result<()> {
    let provider = RecordingProvider::new();
    for ds in ["ds_0", "ds_1", "ds_2", "ds_3"] {
        provider.answer(ds, &["id"], int_rows(&[1])).delay(ds, 100);
    }
    let props = ShardingProps { max_connections_per_query: 4, ..Default::default() };
    let start = Instant::now();
    ExecutionCoordinator::new(&provider, &props).execute(
        &units(&["ds_0", "ds_1", "ds_2", "ds_3"]),
        true,
        &CancelFlag::new(),
    )?;
    assert!(start.elapsed() < Duration::from_millis(350));
    Ok(())
}

#[test]
fn test_update_counts_per_unit() -> Result<()> {
    let provider = RecordingProvider::new();
    provider.update_count("ds_0", 3).update_count("ds_1", 4);
    let props = ShardingProps::default();
    let outcomes =
        ExecutionCoordinator::new(&provider, &props).execute(&units(&["ds_0", "ds_1"]), false, &CancelFlag::new())?;
    assert_eq!(first_values(outcomes)?, vec![3.into(), 4.into()]);
    Ok(())
}

#[test]
fn test_partial_failure_reports_every_unit() {
    let provider = RecordingProvider::new();
    provider.answer("ds_0", &["id"], int_rows(&[1, 2])).fail("ds_1");
    let props = ShardingProps::default();
    let err = ExecutionCoordinator::new(&provider, &props)
        .execute(&units(&["ds_0", "ds_1"]), true, &CancelFlag::new())
        .err()
        .unwrap();

    let failure = err.partial_failure().expect("partial failure");
    assert_eq!(failure.total_units, 2);
    assert_eq!(failure.failures.len(), 1);
    assert_eq!(failure.failures[0].unit_index, 1);
    assert_eq!(failure.failures[0].data_source, "ds_1");
    assert!(matches!(failure.failures[0].cause, ShardingError::Connection { .. }));
    assert_eq!(failure.completed.len(), 1);
    assert_eq!(
        failure.completed[0].outcome,
        CompletedOutcome::Rows { columns: vec!["id".to_string()], rows: int_rows(&[1, 2]) }
    );
    assert!(err.to_string().contains("1 of 2 execution units failed"));
}

#[test]
fn test_single_unit_failure_is_wrapped() {
    let provider = RecordingProvider::new();
    provider.fail("ds_0");
    let props = ShardingProps::default();
    let err = ExecutionCoordinator::new(&provider, &props)
        .execute(&units(&["ds_0"]), false, &CancelFlag::new())
        .err()
        .unwrap();
    assert_eq!(err.partial_failure().map(|f| f.total_units), Some(1));
}

#[test]
fn test_strict_mode_cancels_siblings() {
    let provider = RecordingProvider::new();
    provider.fail("ds_0").delay("ds_1", 2_000);
    let props = ShardingProps { strict_execution: true, ..Default::default() };
    let start = Instant::now();
    let err = ExecutionCoordinator::new(&provider, &props)
        .execute(&units(&["ds_0", "ds_1"]), true, &CancelFlag::new())
        .err()
        .unwrap();
    assert!(start.elapsed() < Duration::from_millis(1_500));
    let failure = err.partial_failure().expect("partial failure");
    assert_eq!(failure.failures.len(), 1);
    assert!(failure.completed.is_empty());
}

#[test]
fn test_timeout_cancels_slow_units() {
    let provider = RecordingProvider::new();
    provider.answer("ds_0", &["id"], int_rows(&[1]));
    provider.delay("ds_1", 2_000);
    let props = ShardingProps { query_timeout_ms: Some(50), ..Default::default() };
    let start = Instant::now();
    let err = ExecutionCoordinator::new(&provider, &props)
        .execute(&units(&["ds_0", "ds_1"]), true, &CancelFlag::new())
        .err()
        .unwrap();
    assert!(matches!(err, ShardingError::Timeout(50)));
    assert!(start.elapsed() < Duration::from_millis(1_500));
}

#[test]
fn test_external_cancel() {
    let provider = RecordingProvider::new();
    provider.delay("ds_0", 2_000).delay("ds_1", 2_000);
    let props = ShardingProps::default();
    let cancel = CancelFlag::new();
    let canceller = cancel.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        canceller.cancel();
    });
    let err = ExecutionCoordinator::new(&provider, &props)
        .execute(&units(&["ds_0", "ds_1"]), true, &cancel)
        .err()
        .unwrap();
    handle.join().unwrap();
    assert!(matches!(err, ShardingError::Cancelled));
}

#[test]
fn test_connection_limit_bounds_workers() -> Result<()> {
    let provider = RecordingProvider::new();
    for ds in ["ds_0", "ds_1", "ds_2"] {
        provider.answer(ds, &["id"], int_rows(&[1])).delay(ds, 40);
    }
    let props = ShardingProps { max_connections_per_query: 1, ..Default::default() };
    let start = Instant::now();
    let outcomes = ExecutionCoordinator::new(&provider, &props).execute(
        &units(&["ds_0", "ds_1", "ds_2"]),
        true,
        &CancelFlag::new(),
    )?;
    assert_eq!(outcomes.len(), 3);
    assert!(start.elapsed() >= Duration::from_millis(120));
    let order: Vec<String> = provider.executed().into_iter().map(|e| e.data_source).collect();
    assert_eq!(order, vec!["ds_0", "ds_1", "ds_2"]);
    Ok(())
}
