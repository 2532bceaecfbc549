// Common Types
//
// Value and error types shared by every stage of the sharding pipeline.

pub mod error;
pub mod value;

pub use error::{CompletedOutcome, CompletedUnit, PartialFailure, ShardingError, ShardingResult, UnitFailure};
pub use value::DataValue;
