// Parser Components
//
// Recursive descent over the token stream, split by statement family. Every
// node records the byte span it came from so the rewrite engine can place
// tokens over the original SQL text.

pub mod parser_core;
pub mod parser_ddl;
pub mod parser_dml;
pub mod parser_expressions;
pub mod parser_select;

pub use parser_core::{ParseError, ParseResult, Parser};
pub use parser_ddl::parse_ddl;
pub use parser_dml::{parse_delete, parse_insert, parse_update};
pub use parser_expressions::parse_expression;
pub use parser_select::parse_select;
