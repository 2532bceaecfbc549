// Execution Coordinator
//
// Runs execution units against their data sources. A single unit runs on
// the caller's thread; several units are fanned out to a bounded pool of
// scoped worker threads fed through a task channel. Results always come
// back in execution unit order.

use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};
use log::{debug, warn};

use super::{CancelFlag, ConnectionProvider, ResultCursor};
use crate::common::error::{CompletedOutcome, CompletedUnit, PartialFailure, ShardingError, ShardingResult, UnitFailure};
use crate::config::ShardingProps;
use crate::rewrite::ExecutionUnit;

/// Successful result of one execution unit
pub enum UnitOutcome {
    Query(Box<dyn ResultCursor>),
    Update(u64),
}

impl std::fmt::Debug for UnitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitOutcome::Query(cursor) => write!(f, "Query({:?})", cursor.column_labels()),
            UnitOutcome::Update(count) => write!(f, "Update({})", count),
        }
    }
}

pub struct ExecutionCoordinator<'a> {
    provider: &'a dyn ConnectionProvider,
    max_workers: usize,
    strict: bool,
    timeout_ms: Option<u64>,
}

type UnitResult = (usize, ShardingResult<UnitOutcome>);

impl<'a> ExecutionCoordinator<'a> {
    pub fn new(provider: &'a dyn ConnectionProvider, props: &ShardingProps) -> Self {
        ExecutionCoordinator {
            provider,
            max_workers: props.max_connections_per_query.max(1),
            strict: props.strict_execution,
            timeout_ms: props.query_timeout_ms,
        }
    }

    /// Execute every unit. `query` selects cursors over update counts.
    ///
    /// In strict mode the first failure sets `cancel`, so the flag should be
    /// scoped to this one query.
    ///
    /// On timeout `cancel` is set, but workers are joined before `Timeout` is
    /// returned: it arrives once every in-flight unit has finished or noticed
    /// the flag. Connections that ignore the flag delay it until they return.
    pub fn execute(
        &self,
        units: &[ExecutionUnit],
        query: bool,
        cancel: &CancelFlag,
    ) -> ShardingResult<Vec<UnitOutcome>> {
        cancel.check()?;
        if units.is_empty() {
            return Ok(Vec::new());
        }
        let results = if units.len() == 1 {
            vec![(0, self.run_unit(&units[0], query, cancel))]
        } else {
            self.run_parallel(units, query, cancel)?
        };
        self.collect(units, results, cancel)
    }

    fn run_unit(&self, unit: &ExecutionUnit, query: bool, cancel: &CancelFlag) -> ShardingResult<UnitOutcome> {
        cancel.check()?;
        let mut connection = self.provider.get_connection(&unit.data_source)?;
        if query {
            connection.execute_query(&unit.sql, &unit.parameters, cancel).map(UnitOutcome::Query)
        } else {
            connection.execute_update(&unit.sql, &unit.parameters, cancel).map(UnitOutcome::Update)
        }
    }

    fn run_parallel(
        &self,
        units: &[ExecutionUnit],
        query: bool,
        cancel: &CancelFlag,
    ) -> ShardingResult<Vec<UnitResult>> {
        let workers = self.max_workers.min(units.len());
        let deadline = self.timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
        debug!("Executing {} units on {} workers", units.len(), workers);

        let (task_tx, task_rx) = channel::unbounded::<usize>();
        let (result_tx, result_rx) = channel::unbounded::<UnitResult>();
        for index in 0..units.len() {
            // The receiver is alive for the whole scope
            let _ = task_tx.send(index);
        }
        drop(task_tx);

        let outcome = crossbeam::scope(|scope| {
            for _ in 0..workers {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move |_| {
                    while let Ok(index) = task_rx.recv() {
                        let result = self.run_unit(&units[index], query, cancel);
                        if result_tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            let mut results = Vec::with_capacity(units.len());
            while results.len() < units.len() {
                let received = match deadline {
                    Some(deadline) => match result_rx.recv_deadline(deadline) {
                        Ok(result) => result,
                        Err(RecvTimeoutError::Timeout) => {
                            cancel.cancel();
                            return Err(results);
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    },
                    None => match result_rx.recv() {
                        Ok(result) => result,
                        Err(_) => break,
                    },
                };
                if self.strict && matches!(received.1, Err(ref e) if !matches!(e, ShardingError::Cancelled)) {
                    cancel.cancel();
                }
                results.push(received);
            }
            Ok(results)
        })
        .map_err(|_| ShardingError::Execution("execution worker panicked".to_string()))?;

        match outcome {
            Ok(results) => Ok(results),
            Err(partial) => {
                // Units that finished in time still own open cursors
                close_all(partial.into_iter().filter_map(|(_, r)| r.ok()));
                close_all(result_rx.try_iter().filter_map(|(_, r)| r.ok()));
                let ms = self.timeout_ms.unwrap_or_default();
                warn!("Query timed out after {} ms", ms);
                Err(ShardingError::Timeout(ms))
            }
        }
    }

    fn collect(
        &self,
        units: &[ExecutionUnit],
        results: Vec<UnitResult>,
        cancel: &CancelFlag,
    ) -> ShardingResult<Vec<UnitOutcome>> {
        let mut slots: Vec<Option<ShardingResult<UnitOutcome>>> = (0..units.len()).map(|_| None).collect();
        for (index, result) in results {
            slots[index] = Some(result);
        }

        let mut outcomes = Vec::with_capacity(units.len());
        let mut failures = Vec::new();
        let mut cancelled = false;
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(outcome)) => outcomes.push((index, outcome)),
                Some(Err(ShardingError::Cancelled)) | None => cancelled = true,
                Some(Err(cause)) => {
                    let unit = &units[index];
                    warn!("Unit {} failed on '{}': {}", index, unit.data_source, cause);
                    failures.push(UnitFailure {
                        unit_index: index,
                        data_source: unit.data_source.clone(),
                        sql: unit.sql.clone(),
                        cause,
                    });
                }
            }
        }

        if !failures.is_empty() {
            let completed = outcomes
                .into_iter()
                .map(|(index, outcome)| CompletedUnit {
                    unit_index: index,
                    data_source: units[index].data_source.clone(),
                    outcome: drain(outcome),
                })
                .collect();
            return Err(ShardingError::PartialExecutionFailure(Box::new(PartialFailure {
                total_units: units.len(),
                failures,
                completed,
            })));
        }
        if cancelled || cancel.is_cancelled() {
            close_all(outcomes.into_iter().map(|(_, o)| o));
            return Err(ShardingError::Cancelled);
        }
        Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
    }
}

/// Materialize a completed unit so it can travel with a partial failure
fn drain(outcome: UnitOutcome) -> CompletedOutcome {
    match outcome {
        UnitOutcome::Update(count) => CompletedOutcome::Updated(count),
        UnitOutcome::Query(mut cursor) => {
            let columns = cursor.column_labels().to_vec();
            let mut rows = Vec::new();
            loop {
                match cursor.next() {
                    Ok(true) => match cursor.current_row() {
                        Ok(row) => rows.push(row),
                        Err(e) => {
                            warn!("Could not read a completed unit's row: {}", e);
                            break;
                        }
                    },
                    Ok(false) => break,
                    Err(e) => {
                        warn!("Could not drain a completed unit: {}", e);
                        break;
                    }
                }
            }
            let _ = cursor.close();
            CompletedOutcome::Rows { columns, rows }
        }
    }
}

fn close_all(outcomes: impl Iterator<Item = UnitOutcome>) {
    for outcome in outcomes {
        if let UnitOutcome::Query(mut cursor) = outcome {
            let _ = cursor.close();
        }
    }
}
