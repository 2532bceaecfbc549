// Key Generation
//
// Snowflake-style distributed keys for INSERT statements that omit a table's
// key column. Layout: 41 bits of milliseconds since 2016-11-01 UTC, 10 bits
// of worker id, 12 bits of per-millisecond sequence.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::common::value::DataValue;
use crate::config::ConfigError;

/// 2016-11-01T00:00:00Z in Unix milliseconds
pub const EPOCH_MILLIS: i64 = 1_477_958_400_000;

const WORKER_ID_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;
pub const MAX_WORKER_ID: u16 = (1 << WORKER_ID_BITS) - 1;

#[derive(Debug, Default)]
struct GeneratorState {
    last_millis: i64,
    sequence: i64,
}

#[derive(Debug)]
pub struct SnowflakeKeyGenerator {
    worker_id: u16,
    state: Mutex<GeneratorState>,
}

impl SnowflakeKeyGenerator {
    pub fn new(worker_id: u16) -> Result<Self, ConfigError> {
        if worker_id > MAX_WORKER_ID {
            return Err(ConfigError::invalid(format!(
                "worker_id {} exceeds the maximum of {}",
                worker_id, MAX_WORKER_ID
            )));
        }
        Ok(SnowflakeKeyGenerator { worker_id, state: Mutex::new(GeneratorState::default()) })
    }

    pub fn worker_id(&self) -> u16 {
        self.worker_id
    }

    /// Next key; strictly increasing within this generator
    pub fn generate(&self) -> i64 {
        let mut state = self.state.lock();
        // A clock that steps backwards keeps issuing from the last millisecond
        let mut now = current_millis().max(state.last_millis);
        if now == state.last_millis {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                while now <= state.last_millis {
                    std::hint::spin_loop();
                    now = current_millis();
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_millis = now;

        ((now - EPOCH_MILLIS) << (WORKER_ID_BITS + SEQUENCE_BITS))
            | ((self.worker_id as i64) << SEQUENCE_BITS)
            | state.sequence
    }
}

fn current_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(EPOCH_MILLIS)
}

/// Keys generated for one INSERT, one per VALUES row
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedKeyContext {
    /// Key column, as configured
    pub column: String,
    pub values: Vec<DataValue>,
}
