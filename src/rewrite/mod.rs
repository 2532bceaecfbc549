// Rewrite Module
//
// Turns a routed logical statement into physical statements: actual table
// names, derived projections, revised pagination, generated keys, split
// INSERT rows and cipher columns.

pub mod engine;
pub mod generator;
pub mod parameter;
pub mod token;

pub use engine::{ExecutionUnit, RewriteEngine, RewriteResult};
pub use generator::{generators_for, RewritePlan, TokenGenerator};
pub use parameter::ParameterRewriter;
pub use token::{SqlToken, TokenKind};
