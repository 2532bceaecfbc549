// SELECT Statement Parser Implementation
//
// This module implements parsing for SQL SELECT statements, including
// subqueries, joins, grouping, ordering and LIMIT/OFFSET pagination

use crate::query::parser::ast::*;
use crate::query::parser::lexer::TokenType;
use super::parser_core::{ParseError, ParseResult, Parser, PREC_LOWEST};
use super::parser_expressions::parse_expression;

/// Parse a SELECT statement
pub fn parse_select(parser: &mut Parser) -> ParseResult<SelectStatement> {
    let start = parser.expect_token(TokenType::SELECT)?.start;
    let distinct = parser.consume_if(TokenType::DISTINCT);
    let select_end = parser.previous_end();

    let (projections, projections_span) = parse_select_items(parser)?;

    parser.expect_token(TokenType::FROM)?;
    let mut from = vec![parse_table_reference(parser)?];
    while parser.consume_if(TokenType::COMMA) {
        from.push(parse_table_reference(parser)?);
    }

    let mut join_conditions = Vec::new();
    while is_join_start(parser) {
        let (table, condition) = parse_join_clause(parser)?;
        from.push(table);
        if let Some(condition) = condition {
            join_conditions.push(condition);
        }
    }

    let where_clause = if parser.consume_if(TokenType::WHERE) {
        Some(parse_expression(parser, PREC_LOWEST)?)
    } else {
        None
    };

    let group_by = if parser.consume_if(TokenType::GROUP) {
        parser.expect_token(TokenType::BY)?;
        parse_order_by_items(parser)?
    } else {
        Vec::new()
    };

    let having = if parser.consume_if(TokenType::HAVING) {
        Some(parse_expression(parser, PREC_LOWEST)?)
    } else {
        None
    };

    let order_by = if parser.consume_if(TokenType::ORDER) {
        parser.expect_token(TokenType::BY)?;
        parse_order_by_items(parser)?
    } else {
        Vec::new()
    };

    let limit = parse_limit_clause(parser)?;

    Ok(SelectStatement {
        distinct,
        select_end,
        projections,
        projections_span,
        from,
        join_conditions,
        where_clause,
        group_by,
        having,
        order_by,
        limit,
        span: Span::new(start, parser.previous_end()),
    })
}

/// Parse the SELECT list
fn parse_select_items(parser: &mut Parser) -> ParseResult<(Vec<SelectItem>, Span)> {
    let mut items = vec![parse_select_item(parser)?];
    while parser.consume_if(TokenType::COMMA) {
        items.push(parse_select_item(parser)?);
    }
    let first = select_item_span(&items[0]);
    let last = select_item_span(&items[items.len() - 1]);
    Ok((items, first.to(last)))
}

fn select_item_span(item: &SelectItem) -> Span {
    match item {
        SelectItem::Wildcard { span, .. } | SelectItem::Expression { span, .. } => *span,
    }
}

fn parse_select_item(parser: &mut Parser) -> ParseResult<SelectItem> {
    if parser.current_token_is(TokenType::ASTERISK) {
        let token = parser.next_token();
        return Ok(SelectItem::Wildcard { owner: None, span: Span::new(token.start, token.end) });
    }

    if parser.current_is_identifier()
        && parser.peek_token_is(TokenType::DOT)
        && parser.lookahead_is(2, TokenType::ASTERISK)
    {
        let (name, quote, owner_span) = parser.parse_identifier()?;
        parser.expect_token(TokenType::DOT)?;
        parser.expect_token(TokenType::ASTERISK)?;
        return Ok(SelectItem::Wildcard {
            owner: Some(OwnerSegment { name, quote, span: owner_span }),
            span: Span::new(owner_span.start, parser.previous_end()),
        });
    }

    let expr = parse_expression(parser, PREC_LOWEST)?;
    let alias = parse_optional_alias(parser)?;
    let span = Span::new(expr.span().start, parser.previous_end());
    Ok(SelectItem::Expression { expr, alias, span })
}

/// Parse an optional `[AS] alias`
fn parse_optional_alias(parser: &mut Parser) -> ParseResult<Option<String>> {
    if parser.consume_if(TokenType::AS) {
        return Ok(Some(parser.parse_identifier()?.0));
    }
    if parser.current_is_identifier() {
        return Ok(Some(parser.parse_identifier()?.0));
    }
    if let TokenType::STRING(alias) = parser.current().token_type.clone() {
        parser.next_token();
        return Ok(Some(alias));
    }
    Ok(None)
}

fn parse_table_reference(parser: &mut Parser) -> ParseResult<TableSegment> {
    if parser.current_token_is(TokenType::LeftParen) {
        return Err(ParseError::NotYetImplemented("derived table in FROM clause".to_string()));
    }
    parser.parse_table_segment()
}

fn is_join_start(parser: &Parser) -> bool {
    [
        TokenType::JOIN,
        TokenType::INNER,
        TokenType::LEFT,
        TokenType::RIGHT,
        TokenType::FULL,
        TokenType::CROSS,
    ]
    .into_iter()
    .any(|t| parser.current_token_is(t))
}

/// Parse `[INNER | LEFT [OUTER] | RIGHT [OUTER] | FULL [OUTER] | CROSS] JOIN table [ON expr]`
fn parse_join_clause(parser: &mut Parser) -> ParseResult<(TableSegment, Option<Expression>)> {
    if !parser.consume_if(TokenType::JOIN) {
        parser.next_token();
        parser.consume_if(TokenType::OUTER);
        parser.expect_token(TokenType::JOIN)?;
    }
    let table = parse_table_reference(parser)?;
    let condition = if parser.consume_if(TokenType::ON) {
        Some(parse_expression(parser, PREC_LOWEST)?)
    } else {
        None
    };
    Ok((table, condition))
}

/// Parse ORDER BY / GROUP BY items
fn parse_order_by_items(parser: &mut Parser) -> ParseResult<Vec<OrderByItem>> {
    let mut items = Vec::new();
    loop {
        let expr = parse_expression(parser, PREC_LOWEST)?;
        let start = expr.span().start;

        let direction = if parser.consume_if(TokenType::DESC) {
            OrderDirection::Desc
        } else {
            parser.consume_if(TokenType::ASC);
            OrderDirection::Asc
        };

        let nulls = if parser.consume_if(TokenType::NULLS) {
            if parser.consume_if(TokenType::FIRST) {
                Some(NullsOrder::First)
            } else {
                parser.expect_token(TokenType::LAST)?;
                Some(NullsOrder::Last)
            }
        } else {
            None
        };

        items.push(OrderByItem {
            expr,
            direction,
            nulls,
            span: Span::new(start, parser.previous_end()),
        });

        if !parser.consume_if(TokenType::COMMA) {
            break;
        }
    }
    Ok(items)
}

/// Parse `LIMIT n`, `LIMIT n OFFSET m`, `LIMIT m, n` or a bare `OFFSET m`
fn parse_limit_clause(parser: &mut Parser) -> ParseResult<Option<LimitSegment>> {
    let start = parser.current().start;

    if parser.consume_if(TokenType::LIMIT) {
        let first = parse_pagination_value(parser)?;
        if parser.consume_if(TokenType::COMMA) {
            let row_count = parse_pagination_value(parser)?;
            return Ok(Some(LimitSegment {
                row_count: Some(row_count),
                offset: Some(first),
                span: Span::new(start, parser.previous_end()),
            }));
        }
        let offset = if parser.consume_if(TokenType::OFFSET) {
            Some(parse_pagination_value(parser)?)
        } else {
            None
        };
        return Ok(Some(LimitSegment {
            row_count: Some(first),
            offset,
            span: Span::new(start, parser.previous_end()),
        }));
    }

    if parser.consume_if(TokenType::OFFSET) {
        let offset = parse_pagination_value(parser)?;
        if parser.current_word_is("ROWS") || parser.current_word_is("ROW") {
            parser.next_token();
        }
        return Ok(Some(LimitSegment {
            row_count: None,
            offset: Some(offset),
            span: Span::new(start, parser.previous_end()),
        }));
    }

    Ok(None)
}

fn parse_pagination_value(parser: &mut Parser) -> ParseResult<PaginationValue> {
    let token = parser.next_token();
    let span = Span::new(token.start, token.end);
    match token.token_type {
        TokenType::INTEGER(value) if value >= 0 => Ok(PaginationValue::Literal { value: value as u64, span }),
        TokenType::PARAMETER => Ok(PaginationValue::Parameter { index: parser.next_parameter_index(), span }),
        TokenType::EOF => Err(ParseError::EndOfInput),
        _ => Err(ParseError::InvalidLiteral(format!(
            "pagination value must be a non-negative integer or '?', found '{}'",
            token.literal
        ))),
    }
}
