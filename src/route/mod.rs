// Route Module
//
// Sharding condition extraction and the routing engine that maps a bound
// statement onto route units.

pub mod condition;
pub mod engine;
pub mod hint;
pub mod unit;

pub use condition::{ConditionOperator, ConditionSet, ConditionValue, ShardingCondition, ShardingConditions};
pub use engine::RoutingEngine;
pub use hint::HintManager;
pub use unit::{DataNode, RouteContext, RouteUnit, TableMapper};
