// BayunShard Query Module
//
// This module contains the SQL parser and the bound statement context that
// routing, rewriting and merging consume.

pub mod context;
pub mod parser;

pub use context::{StatementContext, StatementKind};
pub use parser::Parser;
