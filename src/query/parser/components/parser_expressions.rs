// Expression Parser Implementation
//
// This module implements precedence-climbing expression parsing for SQL

use crate::query::parser::ast::*;
use crate::query::parser::lexer::TokenType;
use super::parser_core::{
    get_operator_precedence, token_to_operator, ParseError, ParseResult, Parser, PREC_COMPARISON,
    PREC_LOWEST, PREC_NOT, PREC_SUM, PREC_UNARY,
};
use super::parser_select::parse_select;

/// Parse an expression with operator precedence
pub fn parse_expression(parser: &mut Parser, precedence: u8) -> ParseResult<Expression> {
    let mut left_expr = parse_prefix_expression(parser)?;

    loop {
        let op_precedence = get_operator_precedence(&parser.current().token_type);
        if op_precedence == PREC_LOWEST || precedence >= op_precedence {
            break;
        }
        left_expr = parse_infix_expression(parser, left_expr)?;
    }

    Ok(left_expr)
}

/// Parse a prefix expression (literal, identifier, etc.)
fn parse_prefix_expression(parser: &mut Parser) -> ParseResult<Expression> {
    let token = parser.current().clone();
    let span = Span::new(token.start, token.end);
    match token.token_type {
        TokenType::MINUS => {
            parser.next_token();
            // Fold negative numeric literals so they route like any other constant
            match parser.current().token_type.clone() {
                TokenType::INTEGER(value) => {
                    parser.next_token();
                    Ok(Expression::Literal {
                        value: Value::Integer(-value),
                        span: Span::new(span.start, parser.previous_end()),
                    })
                }
                TokenType::FLOAT(value) => {
                    parser.next_token();
                    Ok(Expression::Literal {
                        value: Value::Float(-value),
                        span: Span::new(span.start, parser.previous_end()),
                    })
                }
                _ => {
                    let operand = parse_expression(parser, PREC_UNARY)?;
                    Ok(Expression::Unary {
                        op: UnaryOperator::Minus,
                        expr: Box::new(operand),
                        span: Span::new(span.start, parser.previous_end()),
                    })
                }
            }
        }
        TokenType::NOT => {
            parser.next_token();
            let operand = parse_expression(parser, PREC_NOT)?;
            Ok(Expression::Unary {
                op: UnaryOperator::Not,
                expr: Box::new(operand),
                span: Span::new(span.start, parser.previous_end()),
            })
        }
        TokenType::INTEGER(value) => {
            parser.next_token();
            Ok(Expression::Literal { value: Value::Integer(value), span })
        }
        TokenType::FLOAT(value) => {
            parser.next_token();
            Ok(Expression::Literal { value: Value::Float(value), span })
        }
        TokenType::STRING(value) => {
            parser.next_token();
            Ok(Expression::Literal { value: Value::String(value), span })
        }
        TokenType::NULL => {
            parser.next_token();
            Ok(Expression::Literal { value: Value::Null, span })
        }
        TokenType::TRUE | TokenType::FALSE => {
            parser.next_token();
            let value = matches!(token.token_type, TokenType::TRUE);
            Ok(Expression::Literal { value: Value::Boolean(value), span })
        }
        TokenType::PARAMETER => {
            parser.next_token();
            Ok(Expression::Parameter { index: parser.next_parameter_index(), span })
        }
        TokenType::COUNT | TokenType::SUM | TokenType::AVG | TokenType::MIN | TokenType::MAX => {
            parse_aggregate_function(parser)
        }
        TokenType::IDENTIFIER(_) | TokenType::QuotedIdentifier(..) => {
            if parser.peek_token_is(TokenType::LeftParen) {
                parse_function_call(parser)
            } else {
                parse_column_reference(parser).map(Expression::Column)
            }
        }
        TokenType::LeftParen => {
            parser.next_token();
            if parser.current_token_is(TokenType::SELECT) {
                let query = parse_select(parser)?;
                parser.expect_token(TokenType::RightParen)?;
                return Ok(Expression::Subquery {
                    query: Box::new(query),
                    span: Span::new(span.start, parser.previous_end()),
                });
            }
            let expr = parse_expression(parser, PREC_LOWEST)?;
            parser.expect_token(TokenType::RightParen)?;
            Ok(Expression::Nested {
                expr: Box::new(expr),
                span: Span::new(span.start, parser.previous_end()),
            })
        }
        TokenType::EOF => Err(ParseError::EndOfInput),
        _ => Err(ParseError::UnexpectedToken(token)),
    }
}

/// Parse an infix expression (binary operation, IN, BETWEEN, LIKE, IS)
fn parse_infix_expression(parser: &mut Parser, left: Expression) -> ParseResult<Expression> {
    let start = left.span().start;
    let token_type = parser.current().token_type.clone();

    match token_type {
        TokenType::IS => {
            parser.next_token();
            let negated = parser.consume_if(TokenType::NOT);
            parser.expect_token(TokenType::NULL)?;
            Ok(Expression::IsNull {
                expr: Box::new(left),
                negated,
                span: Span::new(start, parser.previous_end()),
            })
        }
        TokenType::NOT => {
            parser.next_token();
            match parser.current().token_type {
                TokenType::IN => parse_in(parser, left, true),
                TokenType::BETWEEN => parse_between(parser, left, true),
                TokenType::LIKE => parse_like(parser, left, true),
                _ => Err(ParseError::UnexpectedToken(parser.current().clone())),
            }
        }
        TokenType::IN => parse_in(parser, left, false),
        TokenType::BETWEEN => parse_between(parser, left, false),
        TokenType::LIKE => parse_like(parser, left, false),
        _ => {
            let precedence = get_operator_precedence(&token_type);
            let op = token_to_operator(&token_type)?;
            parser.next_token();
            let right = parse_expression(parser, precedence)?;
            Ok(Expression::Binary {
                left: Box::new(left),
                op,
                right: Box::new(right),
                span: Span::new(start, parser.previous_end()),
            })
        }
    }
}

fn parse_in(parser: &mut Parser, left: Expression, negated: bool) -> ParseResult<Expression> {
    let start = left.span().start;
    parser.expect_token(TokenType::IN)?;
    parser.expect_token(TokenType::LeftParen)?;

    if parser.current_token_is(TokenType::SELECT) {
        let subquery = parse_select(parser)?;
        parser.expect_token(TokenType::RightParen)?;
        return Ok(Expression::InSubquery {
            expr: Box::new(left),
            subquery: Box::new(subquery),
            negated,
            span: Span::new(start, parser.previous_end()),
        });
    }

    let list = parse_expression_list(parser)?;
    parser.expect_token(TokenType::RightParen)?;
    Ok(Expression::InList {
        expr: Box::new(left),
        list,
        negated,
        span: Span::new(start, parser.previous_end()),
    })
}

fn parse_between(parser: &mut Parser, left: Expression, negated: bool) -> ParseResult<Expression> {
    let start = left.span().start;
    parser.expect_token(TokenType::BETWEEN)?;
    // Bounds bind tighter than AND so the separator is not read as a conjunction
    let low = parse_expression(parser, PREC_COMPARISON)?;
    parser.expect_token(TokenType::AND)?;
    let high = parse_expression(parser, PREC_COMPARISON)?;
    Ok(Expression::Between {
        expr: Box::new(left),
        low: Box::new(low),
        high: Box::new(high),
        negated,
        span: Span::new(start, parser.previous_end()),
    })
}

fn parse_like(parser: &mut Parser, left: Expression, negated: bool) -> ParseResult<Expression> {
    let start = left.span().start;
    parser.expect_token(TokenType::LIKE)?;
    let pattern = parse_expression(parser, PREC_SUM)?;
    Ok(Expression::Like {
        expr: Box::new(left),
        pattern: Box::new(pattern),
        negated,
        span: Span::new(start, parser.previous_end()),
    })
}

/// Parse a comma-separated list of expressions
pub fn parse_expression_list(parser: &mut Parser) -> ParseResult<Vec<Expression>> {
    let mut list = vec![parse_expression(parser, PREC_LOWEST)?];
    while parser.consume_if(TokenType::COMMA) {
        list.push(parse_expression(parser, PREC_LOWEST)?);
    }
    Ok(list)
}

/// Parse a column reference, possibly qualified with a table name or alias
pub fn parse_column_reference(parser: &mut Parser) -> ParseResult<ColumnReference> {
    let (first, first_quote, first_span) = parser.parse_identifier()?;

    if parser.current_token_is(TokenType::DOT) {
        parser.next_token();
        let (name, _, name_span) = parser.parse_identifier()?;
        return Ok(ColumnReference {
            owner: Some(OwnerSegment { name: first, quote: first_quote, span: first_span }),
            name,
            span: first_span.to(name_span),
            name_span,
        });
    }

    Ok(ColumnReference {
        owner: None,
        name: first,
        span: first_span,
        name_span: first_span,
    })
}

/// Parse an aggregate function (COUNT, SUM, AVG, MIN, MAX)
fn parse_aggregate_function(parser: &mut Parser) -> ParseResult<Expression> {
    let token = parser.next_token();
    let function = match token.token_type {
        TokenType::COUNT => AggregateFunction::Count,
        TokenType::SUM => AggregateFunction::Sum,
        TokenType::AVG => AggregateFunction::Avg,
        TokenType::MIN => AggregateFunction::Min,
        TokenType::MAX => AggregateFunction::Max,
        _ => return Err(ParseError::UnexpectedToken(token)),
    };

    parser.expect_token(TokenType::LeftParen)?;
    let distinct = parser.consume_if(TokenType::DISTINCT);

    let arg = if parser.current_token_is(TokenType::ASTERISK) {
        if function != AggregateFunction::Count {
            return Err(ParseError::InvalidSyntax(format!("{}(*) is not allowed", function)));
        }
        parser.next_token();
        None
    } else {
        Some(Box::new(parse_expression(parser, PREC_LOWEST)?))
    };

    parser.expect_token(TokenType::RightParen)?;
    Ok(Expression::Aggregate {
        function,
        arg,
        distinct,
        span: Span::new(token.start, parser.previous_end()),
    })
}

/// Parse a scalar function call such as `NOW()` or `CONCAT(a, b)`
fn parse_function_call(parser: &mut Parser) -> ParseResult<Expression> {
    let (name, _, name_span) = parser.parse_identifier()?;
    parser.expect_token(TokenType::LeftParen)?;
    let args = if parser.current_token_is(TokenType::RightParen) {
        Vec::new()
    } else {
        parse_expression_list(parser)?
    };
    parser.expect_token(TokenType::RightParen)?;
    Ok(Expression::Function {
        name,
        args,
        span: Span::new(name_span.start, parser.previous_end()),
    })
}
