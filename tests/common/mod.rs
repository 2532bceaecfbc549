#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::Mutex;

use bayunshard::config::parse_config;
use bayunshard::execute::MemoryCursor;
use bayunshard::{
    CancelFlag, Connection, ConnectionProvider, DataValue, ResultCursor, ShardingError, ShardingResult,
    ShardingRule, ShardingRuleConfig,
};

/// Two data sources, `t_order`/`t_order_item` split four ways and bound,
/// a broadcast `t_config`, and `t_user` with an encrypted `pwd` column.
pub const RULE_JSON: &str = r#"{
    "data_sources": ["ds_0", "ds_1"],
    "default_data_source": "ds_0",
    "tables": [
        {
            "logic_table": "t_order",
            "actual_data_nodes": "ds_${0..1}.t_order_${0..1}",
            "database_strategy": {"type": "standard", "sharding_column": "user_id",
                                  "algorithm": {"type": "inline", "expression": "ds_${user_id % 2}"}},
            "table_strategy": {"type": "standard", "sharding_column": "order_id",
                               "algorithm": {"type": "inline", "expression": "t_order_${order_id % 2}"}},
            "key_generator": {"column": "order_id"}
        },
        {
            "logic_table": "t_order_item",
            "actual_data_nodes": "ds_${0..1}.t_order_item_${0..1}",
            "database_strategy": {"type": "standard", "sharding_column": "user_id",
                                  "algorithm": {"type": "inline", "expression": "ds_${user_id % 2}"}},
            "table_strategy": {"type": "standard", "sharding_column": "order_id",
                               "algorithm": {"type": "inline", "expression": "t_order_item_${order_id % 2}"}}
        },
        {
            "logic_table": "t_user",
            "actual_data_nodes": "ds_${0..1}.t_user",
            "database_strategy": {"type": "standard", "sharding_column": "user_id",
                                  "algorithm": {"type": "mod", "sharding_count": 2}}
        }
    ],
    "binding_tables": [["t_order", "t_order_item"]],
    "broadcast_tables": ["t_config"],
    "encrypt": {
        "tables": [
            {"table": "t_user", "columns": [
                {"logic_column": "pwd", "cipher_column": "pwd_cipher", "algorithm": {"type": "hex"}}
            ]}
        ]
    }
}"#;

pub fn rule_config() -> Result<ShardingRuleConfig> {
    Ok(parse_config(RULE_JSON)?)
}

pub fn sharding_rule() -> Result<ShardingRule> {
    Ok(ShardingRule::new(rule_config()?)?)
}

/// One statement as a data source received it
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub data_source: String,
    pub sql: String,
    pub params: Vec<DataValue>,
}

/// Canned answer for every query a data source receives
#[derive(Debug, Clone, Default)]
pub struct Answer {
    pub labels: Vec<String>,
    pub rows: Vec<Vec<DataValue>>,
}

#[derive(Default)]
struct State {
    executed: Vec<Executed>,
    answers: Vec<(String, Option<String>, Answer)>,
    failing: Vec<String>,
    delays_ms: HashMap<String, u64>,
    update_counts: HashMap<String, u64>,
    unavailable: Option<Vec<String>>,
}

/// Connection provider that records every statement and replays canned
/// results, with optional per-source failures and delays
#[derive(Clone, Default)]
pub struct RecordingProvider {
    state: Arc<Mutex<State>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(&self, data_source: &str, labels: &[&str], rows: Vec<Vec<DataValue>>) -> &Self {
        self.push_answer(data_source, None, labels, rows)
    }

    /// Answer only statements on `data_source` whose SQL mentions `table`
    pub fn answer_table(&self, data_source: &str, table: &str, labels: &[&str], rows: Vec<Vec<DataValue>>) -> &Self {
        self.push_answer(data_source, Some(table), labels, rows)
    }

    fn push_answer(&self, data_source: &str, table: Option<&str>, labels: &[&str], rows: Vec<Vec<DataValue>>) -> &Self {
        let answer = Answer { labels: labels.iter().map(|l| l.to_string()).collect(), rows };
        self.state.lock().answers.push((data_source.to_string(), table.map(|t| format!("{} ", t)), answer));
        self
    }

    pub fn fail(&self, data_source: &str) -> &Self {
        self.state.lock().failing.push(data_source.to_string());
        self
    }

    pub fn delay(&self, data_source: &str, ms: u64) -> &Self {
        self.state.lock().delays_ms.insert(data_source.to_string(), ms);
        self
    }

    pub fn update_count(&self, data_source: &str, count: u64) -> &Self {
        self.state.lock().update_counts.insert(data_source.to_string(), count);
        self
    }

    /// Report only these data sources as reachable
    pub fn only_available(&self, data_sources: &[&str]) -> &Self {
        self.state.lock().unavailable = Some(data_sources.iter().map(|d| d.to_string()).collect());
        self
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.state.lock().executed.clone()
    }

    pub fn executed_on(&self, data_source: &str) -> Vec<Executed> {
        self.executed().into_iter().filter(|e| e.data_source == data_source).collect()
    }

    pub fn shared(&self) -> Arc<dyn ConnectionProvider> {
        Arc::new(self.clone())
    }
}

impl ConnectionProvider for RecordingProvider {
    fn get_connection(&self, data_source: &str) -> ShardingResult<Box<dyn Connection>> {
        Ok(Box::new(RecordingConnection { data_source: data_source.to_string(), state: self.state.clone() }))
    }

    fn available_data_sources(&self) -> Option<Vec<String>> {
        self.state.lock().unavailable.clone()
    }
}

struct RecordingConnection {
    data_source: String,
    state: Arc<Mutex<State>>,
}

impl RecordingConnection {
    fn record(&self, sql: &str, params: &[DataValue], cancel: &CancelFlag) -> ShardingResult<()> {
        let (delay, fail) = {
            let mut state = self.state.lock();
            state.executed.push(Executed {
                data_source: self.data_source.clone(),
                sql: sql.to_string(),
                params: params.to_vec(),
            });
            (
                state.delays_ms.get(&self.data_source).copied().unwrap_or(0),
                state.failing.contains(&self.data_source),
            )
        };
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(delay) {
            cancel.check()?;
            thread::sleep(Duration::from_millis(1));
        }
        if fail {
            return Err(ShardingError::connection(&self.data_source, "connection refused"));
        }
        Ok(())
    }
}

impl Connection for RecordingConnection {
    fn execute_query(
        &mut self,
        sql: &str,
        params: &[DataValue],
        cancel: &CancelFlag,
    ) -> ShardingResult<Box<dyn ResultCursor>> {
        self.record(sql, params, cancel)?;
        let padded = format!("{} ", sql);
        let answer = {
            let state = self.state.lock();
            let mut candidates = state.answers.iter().filter(|(ds, _, _)| *ds == self.data_source);
            let by_table = candidates
                .clone()
                .find(|(_, table, _)| table.as_ref().is_some_and(|t| padded.contains(t.as_str())));
            by_table
                .or_else(|| candidates.find(|(_, table, _)| table.is_none()))
                .map(|(_, _, answer)| answer.clone())
                .unwrap_or_default()
        };
        Ok(Box::new(MemoryCursor::new(answer.labels, answer.rows)))
    }

    fn execute_update(&mut self, sql: &str, params: &[DataValue], cancel: &CancelFlag) -> ShardingResult<u64> {
        self.record(sql, params, cancel)?;
        Ok(self.state.lock().update_counts.get(&self.data_source).copied().unwrap_or(1))
    }
}

/// Integer rows for a single-column result
pub fn int_rows(values: &[i64]) -> Vec<Vec<DataValue>> {
    values.iter().map(|v| vec![DataValue::Integer(*v)]).collect()
}
