// DML Statement Parser Implementation
//
// This module implements parsing for SQL DML (Data Manipulation Language) statements:
// INSERT, UPDATE, and DELETE

use crate::query::parser::ast::*;
use crate::query::parser::lexer::TokenType;
use super::parser_core::{ParseError, ParseResult, Parser, PREC_LOWEST};
use super::parser_expressions::{parse_column_reference, parse_expression, parse_expression_list};

/// Parse an INSERT statement with one or more VALUES rows
pub fn parse_insert(parser: &mut Parser) -> ParseResult<InsertStatement> {
    let start = parser.expect_token(TokenType::INSERT)?.start;
    parser.expect_token(TokenType::INTO)?;

    let (name, quote, table_span) = parser.parse_identifier()?;
    let table = TableSegment { name, quote, alias: None, span: table_span };

    let (columns, columns_span) = if parser.current_token_is(TokenType::LeftParen) {
        let open = parser.next_token().start;
        let mut columns = vec![parse_column_reference(parser)?];
        while parser.consume_if(TokenType::COMMA) {
            columns.push(parse_column_reference(parser)?);
        }
        parser.expect_token(TokenType::RightParen)?;
        (columns, Some(Span::new(open, parser.previous_end())))
    } else {
        (Vec::new(), None)
    };

    if parser.current_token_is(TokenType::SELECT) {
        return Err(ParseError::NotYetImplemented("INSERT ... SELECT".to_string()));
    }
    parser.expect_token(TokenType::VALUES)?;

    let mut rows = vec![parse_insert_row(parser)?];
    while parser.consume_if(TokenType::COMMA) {
        rows.push(parse_insert_row(parser)?);
    }
    let values_span = rows[0].span.to(rows[rows.len() - 1].span);

    Ok(InsertStatement {
        table,
        columns,
        columns_span,
        rows,
        values_span,
        span: Span::new(start, parser.previous_end()),
    })
}

fn parse_insert_row(parser: &mut Parser) -> ParseResult<InsertRow> {
    let open = parser.expect_token(TokenType::LeftParen)?.start;
    let values = parse_expression_list(parser)?;
    parser.expect_token(TokenType::RightParen)?;
    Ok(InsertRow { values, span: Span::new(open, parser.previous_end()) })
}

/// Parse an UPDATE statement
pub fn parse_update(parser: &mut Parser) -> ParseResult<UpdateStatement> {
    let start = parser.expect_token(TokenType::UPDATE)?.start;
    let table = parser.parse_table_segment()?;
    parser.expect_token(TokenType::SET)?;

    let mut assignments = vec![parse_assignment(parser)?];
    while parser.consume_if(TokenType::COMMA) {
        assignments.push(parse_assignment(parser)?);
    }

    let where_clause = if parser.consume_if(TokenType::WHERE) {
        Some(parse_expression(parser, PREC_LOWEST)?)
    } else {
        None
    };

    Ok(UpdateStatement {
        table,
        assignments,
        where_clause,
        span: Span::new(start, parser.previous_end()),
    })
}

fn parse_assignment(parser: &mut Parser) -> ParseResult<Assignment> {
    let column = parse_column_reference(parser)?;
    parser.expect_token(TokenType::EQUALS)?;
    let value = parse_expression(parser, PREC_LOWEST)?;
    Ok(Assignment { column, value })
}

/// Parse a DELETE statement
pub fn parse_delete(parser: &mut Parser) -> ParseResult<DeleteStatement> {
    let start = parser.expect_token(TokenType::DELETE)?.start;
    parser.expect_token(TokenType::FROM)?;
    let table = parser.parse_table_segment()?;

    let where_clause = if parser.consume_if(TokenType::WHERE) {
        Some(parse_expression(parser, PREC_LOWEST)?)
    } else {
        None
    };

    Ok(DeleteStatement {
        table,
        where_clause,
        span: Span::new(start, parser.previous_end()),
    })
}
