// Execute Module
//
// Connection-facing traits and the coordinator that runs rewritten
// execution units against their data sources.

pub mod coordinator;
pub mod cursor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;

pub use coordinator::{ExecutionCoordinator, UnitOutcome};
pub use cursor::MemoryCursor;

/// Forward-only cursor over one physical result set
pub trait ResultCursor: Send {
    fn column_labels(&self) -> &[String];

    /// Advance to the next row; false once exhausted
    fn next(&mut self) -> ShardingResult<bool>;

    /// Value of the current row at a zero-based column index
    fn value(&self, index: usize) -> ShardingResult<DataValue>;

    fn close(&mut self) -> ShardingResult<()>;

    /// Every value of the current row
    fn current_row(&self) -> ShardingResult<Vec<DataValue>> {
        (0..self.column_labels().len()).map(|i| self.value(i)).collect()
    }
}

/// A physical connection. Returned cursors must not borrow the connection.
///
/// Long-running statements must poll `cancel` and return
/// `ShardingError::Cancelled` once it is set; timeouts and strict-mode
/// failures only take effect as fast as connections observe the flag.
pub trait Connection: Send {
    fn execute_query(
        &mut self,
        sql: &str,
        params: &[DataValue],
        cancel: &CancelFlag,
    ) -> ShardingResult<Box<dyn ResultCursor>>;

    fn execute_update(&mut self, sql: &str, params: &[DataValue], cancel: &CancelFlag) -> ShardingResult<u64>;
}

/// Source of physical connections, keyed by data source name
pub trait ConnectionProvider: Send + Sync {
    fn get_connection(&self, data_source: &str) -> ShardingResult<Box<dyn Connection>>;

    /// Data sources currently able to serve; `None` means every configured one
    fn available_data_sources(&self) -> Option<Vec<String>> {
        None
    }
}

/// Cooperative cancellation shared by the caller, the coordinator and connections
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancelled
    pub fn check(&self) -> ShardingResult<()> {
        if self.is_cancelled() {
            Err(ShardingError::Cancelled)
        } else {
            Ok(())
        }
    }
}
