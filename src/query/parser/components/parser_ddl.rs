// DDL Statement Parser Implementation
//
// Table-level DDL is routed to every physical table of the logical table,
// so only the statement kind and the table name are parsed; the remainder
// of the statement is carried through verbatim.

use crate::query::parser::ast::*;
use crate::query::parser::lexer::TokenType;
use super::parser_core::{ParseError, ParseResult, Parser};

/// Parse CREATE TABLE, ALTER TABLE, DROP TABLE or TRUNCATE [TABLE]
pub fn parse_ddl(parser: &mut Parser) -> ParseResult<DdlStatement> {
    let token = parser.next_token();
    let kind = match token.token_type {
        TokenType::CREATE => {
            parser.expect_token(TokenType::TABLE)?;
            skip_if_clause(parser, true)?;
            DdlKind::CreateTable
        }
        TokenType::ALTER => {
            parser.expect_token(TokenType::TABLE)?;
            DdlKind::AlterTable
        }
        TokenType::DROP => {
            parser.expect_token(TokenType::TABLE)?;
            skip_if_clause(parser, false)?;
            DdlKind::DropTable
        }
        TokenType::TRUNCATE => {
            parser.consume_if(TokenType::TABLE);
            DdlKind::TruncateTable
        }
        _ => return Err(ParseError::UnexpectedToken(token)),
    };

    let (name, quote, span) = parser.parse_identifier()?;
    let table = TableSegment { name, quote, alias: None, span };

    // Column definitions and options are opaque; stop before a trailing semicolon
    while !parser.current_token_is(TokenType::EOF) && !parser.current_token_is(TokenType::SEMICOLON) {
        parser.next_token();
    }

    Ok(DdlStatement {
        kind,
        table,
        span: Span::new(token.start, parser.previous_end()),
    })
}

/// Skip `IF NOT EXISTS` (create) or `IF EXISTS` (drop)
fn skip_if_clause(parser: &mut Parser, with_not: bool) -> ParseResult<()> {
    if !parser.current_word_is("IF") {
        return Ok(());
    }
    parser.next_token();
    if with_not {
        parser.expect_token(TokenType::NOT)?;
    }
    if !parser.current_word_is("EXISTS") {
        return Err(ParseError::InvalidSyntax("expected EXISTS".to_string()));
    }
    parser.next_token();
    Ok(())
}
