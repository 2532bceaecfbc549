// SQL Parser Module
//
// This module is responsible for parsing SQL statements and converting them
// into a positioned abstract syntax tree (AST) representation.

pub mod ast;
pub mod components;
pub mod lexer;

pub use self::ast::Statement;
pub use self::components::{ParseError, ParseResult, Parser};
pub use self::lexer::{Lexer, Token};

/// Parse one SQL statement, returning it with the number of `?` markers it contains
pub fn parse(sql: &str) -> ParseResult<(Statement, usize)> {
    let mut parser = Parser::new(sql);
    let statement = parser.parse_statement()?;
    Ok((statement, parser.parameter_count()))
}
