// SQL Tokens
//
// A token replaces the half-open range `[start, stop)` of the logical SQL.
// Zero-width tokens insert text. A token may be scoped to one route unit.

use std::fmt;

use crate::common::error::{ShardingError, ShardingResult};
use crate::route::unit::RouteUnit;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Logic table name, replaced by the unit's actual table
    Table { logic_table: String, quote: Option<char> },
    /// Fixed replacement text
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlToken {
    pub start: usize,
    pub stop: usize,
    pub kind: TokenKind,
    /// Route unit the token belongs to; `None` applies to every unit
    pub unit: Option<usize>,
}

impl SqlToken {
    pub fn replace(start: usize, stop: usize, text: impl Into<String>) -> Self {
        SqlToken { start, stop, kind: TokenKind::Text(text.into()), unit: None }
    }

    pub fn insert(position: usize, text: impl Into<String>) -> Self {
        Self::replace(position, position, text)
    }

    pub fn table(start: usize, stop: usize, logic_table: &str, quote: Option<char>) -> Self {
        SqlToken {
            start,
            stop,
            kind: TokenKind::Table { logic_table: logic_table.to_string(), quote },
            unit: None,
        }
    }

    pub fn for_unit(mut self, unit: usize) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn applies_to(&self, unit: usize) -> bool {
        self.unit.is_none_or(|u| u == unit)
    }

    pub fn render(&self, unit: &RouteUnit) -> String {
        match &self.kind {
            TokenKind::Table { logic_table, quote } => {
                let actual = unit.actual_table(logic_table).unwrap_or(logic_table);
                match quote {
                    Some(q) => format!("{}{}{}", q, actual, q),
                    None => actual.to_string(),
                }
            }
            TokenKind::Text(text) => text.clone(),
        }
    }
}

impl fmt::Display for SqlToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::Table { logic_table, .. } => write!(f, "[{}, {}) table {}", self.start, self.stop, logic_table),
            TokenKind::Text(text) => write!(f, "[{}, {}) '{}'", self.start, self.stop, text),
        }
    }
}

/// Sort by position; equal positions keep generation order
pub fn sort_tokens(tokens: &mut [SqlToken]) {
    tokens.sort_by_key(|t| (t.start, t.stop));
}

/// Fail when two tokens seen by the same unit overlap
pub fn check_overlap<'a>(tokens: impl IntoIterator<Item = &'a SqlToken>) -> ShardingResult<()> {
    let mut previous: Option<&SqlToken> = None;
    for token in tokens {
        if token.stop < token.start {
            return Err(ShardingError::Rewrite(format!("token {} has a negative range", token)));
        }
        if let Some(prev) = previous {
            if token.start < prev.stop {
                return Err(ShardingError::Rewrite(format!("token {} overlaps {}", token, prev)));
            }
        }
        previous = Some(token);
    }
    Ok(())
}
