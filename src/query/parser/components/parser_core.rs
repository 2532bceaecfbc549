// Core Parser Implementation
//
// This module implements the core parser functionality for SQL

use std::fmt;

use crate::query::parser::ast::*;
use crate::query::parser::lexer::{Lexer, Token, TokenType};

/// SQL Parsing errors
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    UnexpectedToken(Token),
    ExpectedToken(TokenType, Token),
    InvalidLiteral(String),
    EndOfInput,
    NotYetImplemented(String),
    InvalidSyntax(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken(token) => {
                write!(f, "Unexpected token '{}' at offset {}", token.literal, token.start)
            }
            ParseError::ExpectedToken(expected, actual) => write!(
                f,
                "Expected {:?}, found '{}' at offset {}",
                expected, actual.literal, actual.start
            ),
            ParseError::InvalidLiteral(lit) => write!(f, "Invalid literal: {}", lit),
            ParseError::EndOfInput => write!(f, "Unexpected end of input"),
            ParseError::NotYetImplemented(feature) => write!(f, "Not yet implemented: {}", feature),
            ParseError::InvalidSyntax(reason) => write!(f, "Invalid syntax: {}", reason),
        }
    }
}

impl std::error::Error for ParseError {}

/// Result type for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

/// SQL Parser for constructing an AST from SQL tokens
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    parameter_count: usize,
}

impl Parser {
    /// Create a new parser from a SQL query string
    pub fn new(input: &str) -> Self {
        Parser {
            tokens: Lexer::new(input).tokenize(),
            position: 0,
            parameter_count: 0,
        }
    }

    /// Parse a single statement, rejecting trailing input
    pub fn parse_statement(&mut self) -> ParseResult<Statement> {
        let statement = match self.current().token_type {
            TokenType::SELECT => Statement::Select(super::parse_select(self)?),
            TokenType::INSERT => Statement::Insert(super::parse_insert(self)?),
            TokenType::UPDATE => Statement::Update(super::parse_update(self)?),
            TokenType::DELETE => Statement::Delete(super::parse_delete(self)?),
            TokenType::CREATE | TokenType::DROP | TokenType::ALTER | TokenType::TRUNCATE => {
                Statement::Ddl(super::parse_ddl(self)?)
            }
            TokenType::EOF => return Err(ParseError::EndOfInput),
            _ => return Err(ParseError::UnexpectedToken(self.current().clone())),
        };
        self.consume_if(TokenType::SEMICOLON);
        if !self.current_token_is(TokenType::EOF) {
            return Err(ParseError::UnexpectedToken(self.current().clone()));
        }
        Ok(statement)
    }

    /// Number of `?` markers consumed so far
    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    /// Allocate the index of the next positional parameter
    pub fn next_parameter_index(&mut self) -> usize {
        let index = self.parameter_count;
        self.parameter_count += 1;
        index
    }

    /// The current token; the token list always ends with EOF
    pub fn current(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.position.min(last)]
    }

    /// The token after the current one
    pub fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.position + 1).min(last)]
    }

    /// True when the token `offset` places ahead of the current one matches
    pub fn lookahead_is(&self, offset: usize, token_type: TokenType) -> bool {
        let last = self.tokens.len() - 1;
        matches_token_type(&self.tokens[(self.position + offset).min(last)].token_type, &token_type)
    }

    /// Consume and return the current token
    pub fn next_token(&mut self) -> Token {
        let token = self.current().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    /// End offset of the most recently consumed token
    pub fn previous_end(&self) -> usize {
        if self.position == 0 {
            0
        } else {
            self.tokens[self.position - 1].end
        }
    }

    /// Consume the current token if it matches the expected type
    pub fn expect_token(&mut self, expected: TokenType) -> ParseResult<Token> {
        if self.current_token_is(expected.clone()) {
            Ok(self.next_token())
        } else if self.current_token_is(TokenType::EOF) {
            Err(ParseError::EndOfInput)
        } else {
            Err(ParseError::ExpectedToken(expected, self.current().clone()))
        }
    }

    /// Check if the current token is of the given type
    pub fn current_token_is(&self, token_type: TokenType) -> bool {
        matches_token_type(&self.current().token_type, &token_type)
    }

    pub fn peek_token_is(&self, token_type: TokenType) -> bool {
        matches_token_type(&self.peek().token_type, &token_type)
    }

    /// Consume the current token when it matches, reporting whether it did
    pub fn consume_if(&mut self, token_type: TokenType) -> bool {
        if self.current_token_is(token_type) {
            self.next_token();
            true
        } else {
            false
        }
    }

    /// True when the current token is a bare identifier spelled `word`
    pub fn current_word_is(&self, word: &str) -> bool {
        matches!(&self.current().token_type, TokenType::IDENTIFIER(name) if name.eq_ignore_ascii_case(word))
    }

    /// Parse an identifier, quoted or bare, returning its name, delimiter and span
    pub fn parse_identifier(&mut self) -> ParseResult<(String, Option<char>, Span)> {
        let token = self.current().clone();
        match token.token_type {
            TokenType::IDENTIFIER(name) => {
                self.next_token();
                Ok((name, None, Span::new(token.start, token.end)))
            }
            TokenType::QuotedIdentifier(name, quote) => {
                self.next_token();
                Ok((name, Some(quote), Span::new(token.start, token.end)))
            }
            TokenType::EOF => Err(ParseError::EndOfInput),
            _ => Err(ParseError::ExpectedToken(TokenType::IDENTIFIER(String::new()), token)),
        }
    }

    pub fn current_is_identifier(&self) -> bool {
        matches!(
            self.current().token_type,
            TokenType::IDENTIFIER(_) | TokenType::QuotedIdentifier(..)
        )
    }

    /// Parse a table name with an optional alias
    pub fn parse_table_segment(&mut self) -> ParseResult<TableSegment> {
        let (name, quote, span) = self.parse_identifier()?;
        if self.current_token_is(TokenType::DOT) {
            return Err(ParseError::NotYetImplemented(format!(
                "schema-qualified table name '{}.'",
                name
            )));
        }
        let alias = if self.consume_if(TokenType::AS) || self.current_is_identifier() {
            Some(self.parse_identifier()?.0)
        } else {
            None
        };
        Ok(TableSegment { name, quote, alias, span })
    }
}

/// Helper function to check if a token type matches the expected type
pub fn matches_token_type(token_type: &TokenType, expected: &TokenType) -> bool {
    match (token_type, expected) {
        (TokenType::IDENTIFIER(actual_val), TokenType::IDENTIFIER(expected_val)) => {
            expected_val.is_empty() || actual_val.eq_ignore_ascii_case(expected_val)
        }
        // Data-carrying variants match on the variant alone
        _ => std::mem::discriminant(token_type) == std::mem::discriminant(expected),
    }
}

/// Convert a token type to a binary operator
pub fn token_to_operator(token_type: &TokenType) -> ParseResult<BinaryOperator> {
    match token_type {
        TokenType::EQUALS => Ok(BinaryOperator::Equals),
        TokenType::NotEqual => Ok(BinaryOperator::NotEquals),
        TokenType::LessThan => Ok(BinaryOperator::LessThan),
        TokenType::GreaterThan => Ok(BinaryOperator::GreaterThan),
        TokenType::LessEqual => Ok(BinaryOperator::LessEquals),
        TokenType::GreaterEqual => Ok(BinaryOperator::GreaterEquals),
        TokenType::AND => Ok(BinaryOperator::And),
        TokenType::OR => Ok(BinaryOperator::Or),
        TokenType::PLUS => Ok(BinaryOperator::Plus),
        TokenType::MINUS => Ok(BinaryOperator::Minus),
        TokenType::ASTERISK => Ok(BinaryOperator::Multiply),
        TokenType::DIVIDE => Ok(BinaryOperator::Divide),
        TokenType::MODULO => Ok(BinaryOperator::Modulo),
        _ => Err(ParseError::InvalidSyntax(format!("Not an operator: {:?}", token_type))),
    }
}

pub const PREC_LOWEST: u8 = 0;
pub const PREC_OR: u8 = 1;
pub const PREC_AND: u8 = 2;
pub const PREC_NOT: u8 = 3;
pub const PREC_COMPARISON: u8 = 4;
pub const PREC_SUM: u8 = 5;
pub const PREC_PRODUCT: u8 = 6;
pub const PREC_UNARY: u8 = 7;

/// Get operator precedence for expression parsing
pub fn get_operator_precedence(token_type: &TokenType) -> u8 {
    match token_type {
        TokenType::OR => PREC_OR,
        TokenType::AND => PREC_AND,
        TokenType::EQUALS
        | TokenType::NotEqual
        | TokenType::LessThan
        | TokenType::GreaterThan
        | TokenType::LessEqual
        | TokenType::GreaterEqual
        | TokenType::IN
        | TokenType::BETWEEN
        | TokenType::LIKE
        | TokenType::IS
        | TokenType::NOT => PREC_COMPARISON,
        TokenType::PLUS | TokenType::MINUS => PREC_SUM,
        TokenType::ASTERISK | TokenType::DIVIDE | TokenType::MODULO => PREC_PRODUCT,
        _ => PREC_LOWEST,
    }
}
