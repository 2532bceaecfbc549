use anyhow::Result;
use rand::Rng;

use bayunshard::encrypt::EncryptAlgorithm;
use bayunshard::execute::MemoryCursor;
use bayunshard::merge::{
    ColumnLayout, ColumnValueDecoder, CursorState, MergeEngine, MergedResult, OrderByStreamMerge, OrderKey,
};
use bayunshard::{DataValue, ResultCursor, ShardingError, ShardingProps, StatementContext};

fn shard(labels: &[&str], rows: Vec<Vec<DataValue>>) -> Box<dyn ResultCursor> {
    Box::new(MemoryCursor::from_rows(labels, rows))
}

fn row(values: &[DataValue]) -> Vec<DataValue> {
    values.to_vec()
}

fn merge_rows(
    sql: &str,
    props: &ShardingProps,
    shards: Vec<Box<dyn ResultCursor>>,
    derived_columns: usize,
    params: &[DataValue],
) -> Result<Vec<Vec<DataValue>>> {
    let ctx = StatementContext::bind(sql)?;
    let layout = ColumnLayout { derived_columns, trailing_columns: 0 };
    let mut merged = MergeEngine::new(props).merge(&ctx, shards, layout, params, Vec::new())?;
    Ok(merged.collect_rows()?)
}

fn merge(sql: &str, shards: Vec<Box<dyn ResultCursor>>, derived_columns: usize) -> Result<Vec<Vec<DataValue>>> {
    merge_rows(sql, &ShardingProps::default(), shards, derived_columns, &[])
}

fn ints(values: &[i64]) -> Vec<Vec<DataValue>> {
    values.iter().map(|v| vec![DataValue::Integer(*v)]).collect()
}

#[test]
fn test_iterator_merge_keeps_unit_order() -> Result<()> {
    let rows = merge(
        "SELECT id FROM t_order",
        vec![shard(&["id"], ints(&[3, 1])), shard(&["id"], vec![]), shard(&["id"], ints(&[2]))],
        0,
    )?;
    assert_eq!(rows, ints(&[3, 1, 2]));
    Ok(())
}

#[test]
fn test_order_by_stream_merge_descending() -> Result<()> {
    let labels = ["id", "name"];
    let rows = merge(
        "SELECT id, name FROM t_order ORDER BY id DESC",
        vec![
            shard(&labels, vec![row(&[9.into(), "a".into()]), row(&[4.into(), "b".into()])]),
            shard(&labels, vec![row(&[7.into(), "c".into()]), row(&[4.into(), "d".into()])]),
        ],
        0,
    )?;
    let names: Vec<String> = rows.iter().map(|r| r[1].to_plain_text()).collect();
    // Ties keep the earlier unit first
    assert_eq!(names, vec!["a", "c", "b", "d"]);
    Ok(())
}

#[test]
fn test_order_by_nulls_placement() -> Result<()> {
    let rows = merge(
        "SELECT id FROM t_order ORDER BY id DESC NULLS FIRST",
        vec![
            shard(&["id"], vec![row(&[DataValue::Null]), row(&[2.into()])]),
            shard(&["id"], vec![row(&[3.into()]), row(&[1.into()])]),
        ],
        0,
    )?;
    assert_eq!(rows, vec![row(&[DataValue::Null]), row(&[3.into()]), row(&[2.into()]), row(&[1.into()])]);
    Ok(())
}

#[test]
fn test_derived_order_column_is_hidden() -> Result<()> {
    let labels = ["name", "ORDER_BY_DERIVED_0"];
    let rows = merge(
        "SELECT name FROM t_order ORDER BY id",
        vec![
            shard(&labels, vec![row(&["b".into(), 2.into()])]),
            shard(&labels, vec![row(&["a".into(), 1.into()]), row(&["c".into(), 3.into()])]),
        ],
        1,
    )?;
    assert_eq!(rows, vec![row(&["a".into()]), row(&["b".into()]), row(&["c".into()])]);
    Ok(())
}

#[test]
fn test_group_by_stream_aggregates() -> Result<()> {
    let labels = ["user_id", "COUNT(*)", "SUM(price)", "MIN(price)", "MAX(price)"];
    let rows = merge(
        "SELECT user_id, COUNT(*), SUM(price), MIN(price), MAX(price) FROM t_order GROUP BY user_id ORDER BY user_id",
        vec![
            shard(
                &labels,
                vec![
                    row(&[1.into(), 2.into(), 30.into(), 10.into(), 20.into()]),
                    row(&[3.into(), 1.into(), 5.into(), 5.into(), 5.into()]),
                ],
            ),
            shard(&labels, vec![row(&[1.into(), 1.into(), 7.into(), 7.into(), 7.into()])]),
        ],
        0,
    )?;
    assert_eq!(
        rows,
        vec![
            row(&[1.into(), 3.into(), 37.into(), 7.into(), 20.into()]),
            row(&[3.into(), 1.into(), 5.into(), 5.into(), 5.into()]),
        ]
    );
    Ok(())
}

#[test]
fn test_group_by_memory_sorted_by_aggregate() -> Result<()> {
    let labels = ["status", "COUNT(*)"];
    let rows = merge(
        "SELECT status, COUNT(*) FROM t_order GROUP BY status ORDER BY COUNT(*) DESC",
        vec![
            shard(&labels, vec![row(&["new".into(), 1.into()]), row(&["paid".into(), 4.into()])]),
            shard(&labels, vec![row(&["new".into(), 5.into()]), row(&["void".into(), 2.into()])]),
        ],
        0,
    )?;
    assert_eq!(
        rows,
        vec![
            row(&["new".into(), 6.into()]),
            row(&["paid".into(), 4.into()]),
            row(&["void".into(), 2.into()]),
        ]
    );
    Ok(())
}

#[test]
fn test_group_by_with_pagination() -> Result<()> {
    let labels = ["status", "COUNT(*)"];
    let rows = merge_rows(
        "SELECT status, COUNT(*) FROM t_order GROUP BY status ORDER BY COUNT(*) DESC LIMIT ?, ?",
        &ShardingProps::default(),
        vec![
            shard(&labels, vec![row(&["a".into(), 1.into()]), row(&["b".into(), 2.into()])]),
            shard(&labels, vec![row(&["c".into(), 3.into()]), row(&["d".into(), 4.into()])]),
        ],
        0,
        &[1.into(), 2.into()],
    )?;
    assert_eq!(rows, vec![row(&["c".into(), 3.into()]), row(&["b".into(), 2.into()])]);
    Ok(())
}

#[test]
fn test_avg_is_recomputed_from_count_and_sum() -> Result<()> {
    let labels = ["AVG(price)", "AVG_DERIVED_COUNT_0", "AVG_DERIVED_SUM_0"];
    let rows = merge(
        "SELECT AVG(price) FROM t_order",
        vec![
            shard(&labels, vec![row(&[DataValue::Float(10.0), 1.into(), 10.into()])]),
            shard(&labels, vec![row(&[DataValue::Float(1.0), 3.into(), 3.into()])]),
        ],
        2,
    )?;
    assert_eq!(rows, vec![row(&[DataValue::Float(3.25)])]);
    Ok(())
}

#[test]
fn test_aggregate_over_no_rows() -> Result<()> {
    let labels = ["COUNT(*)", "MAX(price)"];
    let rows = merge("SELECT COUNT(*), MAX(price) FROM t_order", vec![shard(&labels, vec![]), shard(&labels, vec![])], 0)?;
    assert_eq!(rows, vec![row(&[0.into(), DataValue::Null])]);
    Ok(())
}

#[test]
fn test_distinct_rows_collapse() -> Result<()> {
    let rows = merge(
        "SELECT DISTINCT user_id FROM t_order",
        vec![shard(&["user_id"], ints(&[1, 2])), shard(&["user_id"], ints(&[2, 3]))],
        0,
    )?;
    let mut values: Vec<i64> = rows.iter().filter_map(|r| r[0].as_i64()).collect();
    values.sort();
    assert_eq!(values, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn test_offset_past_end_is_empty() -> Result<()> {
    let rows = merge(
        "SELECT id FROM t_order ORDER BY id LIMIT 100, 10",
        vec![shard(&["id"], ints(&[1, 2])), shard(&["id"], ints(&[3]))],
        0,
    )?;
    assert!(rows.is_empty());
    Ok(())
}

#[test]
fn test_memory_limit() {
    let props = ShardingProps { max_memory_merge_rows: 2, ..Default::default() };
    let labels = ["status", "COUNT(*)"];
    let err = merge_rows(
        "SELECT status, COUNT(*) FROM t_order GROUP BY status ORDER BY COUNT(*)",
        &props,
        vec![
            shard(&labels, vec![row(&["a".into(), 1.into()]), row(&["b".into(), 1.into()])]),
            shard(&labels, vec![row(&["c".into(), 1.into()])]),
        ],
        0,
        &[],
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ShardingError>(),
        Some(ShardingError::MemoryLimitExceeded { limit: 2 })
    ));
}

#[test]
fn test_decrypted_columns() -> Result<()> {
    let ctx = StatementContext::bind("SELECT user_id, pwd FROM t_user")?;
    let props = ShardingProps::default();
    let decoders: Vec<(String, Box<dyn ColumnValueDecoder>)> = vec![("pwd".to_string(), Box::new(EncryptAlgorithm::Hex))];
    let labels = ["user_id", "pwd"];
    let mut merged = MergeEngine::new(&props).merge(
        &ctx,
        vec![
            shard(&labels, vec![row(&[1.into(), "6162".into()])]),
            shard(&labels, vec![row(&[2.into(), DataValue::Null])]),
        ],
        ColumnLayout::default(),
        &[],
        decoders,
    )?;
    assert_eq!(merged.state(), CursorState::Unstarted);
    assert!(merged.next()?);
    assert_eq!(merged.value(1)?, DataValue::from("ab"));
    assert!(merged.next()?);
    assert_eq!(merged.value(1)?, DataValue::Null);
    assert!(!merged.next()?);
    assert_eq!(merged.state(), CursorState::Exhausted);
    Ok(())
}

#[test]
fn test_mismatched_shapes_are_rejected() {
    let err = merge(
        "SELECT id FROM t_order",
        vec![shard(&["id"], ints(&[1])), shard(&["id", "extra"], vec![])],
        0,
    )
    .unwrap_err();
    assert!(matches!(err.downcast_ref::<ShardingError>(), Some(ShardingError::MergeInconsistency(_))));
}

#[test]
fn test_random_streams_merge_sorted() -> Result<()> {
    let mut rng = rand::thread_rng();
    let mut expected = Vec::new();
    let mut cursors = Vec::new();
    for _ in 0..5 {
        let mut values: Vec<i64> = (0..rng.gen_range(0..40)).map(|_| rng.gen_range(-100..100)).collect();
        values.sort();
        expected.extend(values.iter().copied());
        cursors.push(shard(&["n"], ints(&values)));
    }
    expected.sort();

    let mut merged = OrderByStreamMerge::new(cursors, vec![OrderKey::ascending(0)]);
    let mut actual = Vec::new();
    while merged.next()? {
        actual.push(merged.value(0)?.as_i64().unwrap_or_default());
    }
    assert_eq!(actual, expected);
    Ok(())
}
