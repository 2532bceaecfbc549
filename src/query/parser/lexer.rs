// SQL Lexer Implementation
//
// This module implements a lexer for SQL that tokenizes input queries.
// Every token records the byte range it occupies in the original text so
// the rewrite stage can splice replacements in place.

use std::collections::HashMap;
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use once_cell::sync::Lazy;

/// SQL Token types
#[derive(Debug, PartialEq, Clone)]
pub enum TokenType {
    // Keywords
    SELECT,
    DISTINCT,
    FROM,
    WHERE,
    INSERT,
    INTO,
    VALUES,
    DELETE,
    UPDATE,
    SET,
    CREATE,
    TABLE,
    DROP,
    ALTER,
    TRUNCATE,
    JOIN,
    INNER,
    LEFT,
    RIGHT,
    FULL,
    OUTER,
    CROSS,
    ON,
    GROUP,
    BY,
    HAVING,
    ORDER,
    ASC,
    DESC,
    NULLS,
    FIRST,
    LAST,
    LIMIT,
    OFFSET,
    AS,
    AND,
    OR,
    NOT,
    IN,
    BETWEEN,
    IS,
    NULL,
    LIKE,
    TRUE,
    FALSE,
    COUNT,
    SUM,
    AVG,
    MIN,
    MAX,

    // Literals
    STRING(String),
    INTEGER(i64),
    FLOAT(f64),

    // Identifiers; quoted identifiers carry their delimiter
    IDENTIFIER(String),
    QuotedIdentifier(String, char),

    // Positional parameter marker
    PARAMETER,

    // Operators
    EQUALS,         // =
    LessThan,       // <
    GreaterThan,    // >
    LessEqual,      // <=
    GreaterEqual,   // >=
    NotEqual,       // <> or !=
    PLUS,           // +
    MINUS,          // -
    ASTERISK,       // *
    DIVIDE,         // /
    MODULO,         // %

    // Punctuation
    SEMICOLON,      // ;
    COMMA,          // ,
    LeftParen,      // (
    RightParen,     // )
    DOT,            // .

    // Special
    EOF,
    ILLEGAL(String),
}

static KEYWORDS: Lazy<HashMap<&'static str, TokenType>> = Lazy::new(|| {
    use TokenType::*;
    [
        ("SELECT", SELECT), ("DISTINCT", DISTINCT), ("FROM", FROM), ("WHERE", WHERE),
        ("INSERT", INSERT), ("INTO", INTO), ("VALUES", VALUES), ("DELETE", DELETE),
        ("UPDATE", UPDATE), ("SET", SET), ("CREATE", CREATE), ("TABLE", TABLE),
        ("DROP", DROP), ("ALTER", ALTER), ("TRUNCATE", TRUNCATE), ("JOIN", JOIN),
        ("INNER", INNER), ("LEFT", LEFT), ("RIGHT", RIGHT), ("FULL", FULL),
        ("OUTER", OUTER), ("CROSS", CROSS), ("ON", ON), ("GROUP", GROUP), ("BY", BY),
        ("HAVING", HAVING), ("ORDER", ORDER), ("ASC", ASC), ("DESC", DESC),
        ("NULLS", NULLS), ("FIRST", FIRST), ("LAST", LAST), ("LIMIT", LIMIT),
        ("OFFSET", OFFSET), ("AS", AS), ("AND", AND), ("OR", OR), ("NOT", NOT),
        ("IN", IN), ("BETWEEN", BETWEEN), ("IS", IS), ("NULL", NULL), ("LIKE", LIKE),
        ("TRUE", TRUE), ("FALSE", FALSE), ("COUNT", COUNT), ("SUM", SUM), ("AVG", AVG),
        ("MIN", MIN), ("MAX", MAX),
    ]
    .into_iter()
    .collect()
});

/// A Token represents a lexical unit in the SQL query.
/// `start..end` is the half-open byte range of the token in the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub literal: String,
    pub start: usize,
    pub end: usize,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}({}) at {}", self.token_type, self.literal, self.start)
    }
}

/// SQL Lexer for breaking a query string into tokens
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer from a SQL query string
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    /// Tokenize the whole input, ending with an EOF token
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.token_type == TokenType::EOF;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn position(&mut self) -> usize {
        self.chars.peek().map(|(i, _)| *i).unwrap_or(self.input.len())
    }

    /// Skip whitespace and comments
    fn skip_whitespace(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some('-') if self.input[self.position()..].starts_with("--") => {
                    while let Some(c) = self.peek_char() {
                        self.chars.next();
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.input[self.position()..].starts_with("/*") => {
                    self.chars.next();
                    self.chars.next();
                    let mut prev = '\0';
                    while let Some((_, c)) = self.chars.next() {
                        if prev == '*' && c == '/' {
                            break;
                        }
                        prev = c;
                    }
                }
                _ => break,
            }
        }
    }

    fn make_token(&self, token_type: TokenType, start: usize, end: usize) -> Token {
        Token {
            token_type,
            literal: self.input[start..end].to_string(),
            start,
            end,
        }
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let Some((start, ch)) = self.chars.next() else {
            let end = self.input.len();
            return self.make_token(TokenType::EOF, end, end);
        };

        let token_type = match ch {
            ';' => TokenType::SEMICOLON,
            ',' => TokenType::COMMA,
            '(' => TokenType::LeftParen,
            ')' => TokenType::RightParen,
            '.' => TokenType::DOT,
            '+' => TokenType::PLUS,
            '-' => TokenType::MINUS,
            '*' => TokenType::ASTERISK,
            '/' => TokenType::DIVIDE,
            '%' => TokenType::MODULO,
            '=' => TokenType::EQUALS,
            '?' => TokenType::PARAMETER,
            '<' => match self.peek_char() {
                Some('=') => {
                    self.chars.next();
                    TokenType::LessEqual
                }
                Some('>') => {
                    self.chars.next();
                    TokenType::NotEqual
                }
                _ => TokenType::LessThan,
            },
            '>' => {
                if self.peek_char() == Some('=') {
                    self.chars.next();
                    TokenType::GreaterEqual
                } else {
                    TokenType::GreaterThan
                }
            }
            '!' => {
                if self.peek_char() == Some('=') {
                    self.chars.next();
                    TokenType::NotEqual
                } else {
                    TokenType::ILLEGAL("!".to_string())
                }
            }
            '\'' => self.read_string(),
            '`' | '"' => self.read_quoted_identifier(ch),
            c if c.is_ascii_digit() => self.read_number(start),
            c if is_letter(c) => {
                let end = self.read_identifier_end();
                let word = &self.input[start..end];
                KEYWORDS
                    .get(word.to_uppercase().as_str())
                    .cloned()
                    .unwrap_or_else(|| TokenType::IDENTIFIER(word.to_string()))
            }
            other => TokenType::ILLEGAL(other.to_string()),
        };

        let end = self.position();
        self.make_token(token_type, start, end)
    }

    fn read_identifier_end(&mut self) -> usize {
        while let Some(c) = self.peek_char() {
            if is_letter(c) || c.is_ascii_digit() || c == '$' {
                self.chars.next();
            } else {
                break;
            }
        }
        self.position()
    }

    fn read_number(&mut self, start: usize) -> TokenType {
        let mut has_dot = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.chars.next();
            } else if c == '.' && !has_dot {
                has_dot = true;
                self.chars.next();
            } else {
                break;
            }
        }
        let text = &self.input[start..self.position()];
        if has_dot {
            text.parse::<f64>()
                .map(TokenType::FLOAT)
                .unwrap_or_else(|_| TokenType::ILLEGAL(text.to_string()))
        } else {
            text.parse::<i64>()
                .map(TokenType::INTEGER)
                .unwrap_or_else(|_| TokenType::ILLEGAL(text.to_string()))
        }
    }

    /// Read a string literal; a doubled quote is an escaped quote
    fn read_string(&mut self) -> TokenType {
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some((_, '\'')) => {
                    if self.peek_char() == Some('\'') {
                        self.chars.next();
                        value.push('\'');
                    } else {
                        return TokenType::STRING(value);
                    }
                }
                Some((_, c)) => value.push(c),
                None => return TokenType::ILLEGAL(format!("unterminated string '{}", value)),
            }
        }
    }

    fn read_quoted_identifier(&mut self, quote: char) -> TokenType {
        let mut name = String::new();
        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote => return TokenType::QuotedIdentifier(name, quote),
                Some((_, c)) => name.push(c),
                None => return TokenType::ILLEGAL(format!("unterminated identifier {}{}", quote, name)),
            }
        }
    }
}

/// Check if a character is a letter (for identifiers)
fn is_letter(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}
