// Inline Expressions
//
// Small template language used by data node lists and inline sharding
// algorithms: literal text with `${...}` (or `$->{...}`) placeholders holding
// integer/string arithmetic over column variables, inclusive ranges `a..b`
// and lists `[x, y]`.

use std::collections::HashMap;

use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;
use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Int(i64),
    Str(String),
    Var(String),
    Neg(Box<Expr>),
    Binary(ArithOp, Box<Expr>, Box<Expr>),
    Range(i64, i64),
    List(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
enum InlineValue {
    Int(i64),
    Str(String),
}

impl InlineValue {
    fn render(&self) -> String {
        match self {
            InlineValue::Int(i) => i.to_string(),
            InlineValue::Str(s) => s.clone(),
        }
    }
}

/// A parsed inline expression
#[derive(Debug, Clone, PartialEq)]
pub struct InlineExpression {
    source: String,
    segments: Vec<Segment>,
}

impl InlineExpression {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = text;

        while !rest.is_empty() {
            let open = if rest.starts_with("${") {
                Some(2)
            } else if rest.starts_with("$->{") {
                Some(4)
            } else {
                None
            };
            match open {
                Some(skip) => {
                    let body_start = skip;
                    let close = find_closing_brace(&rest[body_start..]).ok_or_else(|| {
                        ConfigError::invalid(format!("unclosed placeholder in inline expression '{}'", text))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut literal)));
                    }
                    let body = &rest[body_start..body_start + close];
                    segments.push(Segment::Expr(ExprParser::new(body, text).parse()?));
                    rest = &rest[body_start + close + 1..];
                }
                None => {
                    let mut chars = rest.chars();
                    if let Some(c) = chars.next() {
                        literal.push(c);
                    }
                    rest = chars.as_str();
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Text(literal));
        }

        Ok(InlineExpression { source: text.to_string(), segments })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate to a single string with the given variable bindings
    pub fn evaluate(&self, vars: &HashMap<String, DataValue>) -> ShardingResult<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Expr(expr) => out.push_str(&eval(expr, vars, &self.source)?.render()),
            }
        }
        Ok(out)
    }

    /// Expand ranges and lists into every combination, leftmost varying slowest
    pub fn expand(&self) -> ShardingResult<Vec<String>> {
        let empty = HashMap::new();
        let mut results = vec![String::new()];
        for segment in &self.segments {
            let choices: Vec<String> = match segment {
                Segment::Text(text) => vec![text.clone()],
                Segment::Expr(expr) => expand_expr(expr, &empty, &self.source)?,
            };
            let mut next = Vec::with_capacity(results.len() * choices.len());
            for prefix in &results {
                for choice in &choices {
                    next.push(format!("{}{}", prefix, choice));
                }
            }
            results = next;
        }
        Ok(results)
    }
}

/// Expand a comma-separated list of inline expressions, e.g.
/// `ds_0.t_${0..1}, ds_1.t_${2..3}`
pub fn expand_inline(text: &str) -> ShardingResult<Vec<String>> {
    let mut out = Vec::new();
    for part in split_top_level(text) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        out.extend(InlineExpression::parse(part)?.expand()?);
    }
    Ok(out)
}

fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '{' | '[' => depth += 1,
            '}' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn find_closing_brace(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn eval(expr: &Expr, vars: &HashMap<String, DataValue>, source: &str) -> ShardingResult<InlineValue> {
    let failure = |msg: String| ShardingError::RoutingFailure(format!("inline expression '{}': {}", source, msg));
    match expr {
        Expr::Int(i) => Ok(InlineValue::Int(*i)),
        Expr::Str(s) => Ok(InlineValue::Str(s.clone())),
        Expr::Var(name) => match vars.get(name) {
            Some(DataValue::Integer(i)) => Ok(InlineValue::Int(*i)),
            Some(DataValue::Null) => Err(failure(format!("variable '{}' is NULL", name))),
            Some(other) => match other.as_i64() {
                Some(i) if !matches!(other, DataValue::Text(_)) => Ok(InlineValue::Int(i)),
                _ => Ok(InlineValue::Str(other.to_plain_text())),
            },
            None => Err(failure(format!("unbound variable '{}'", name))),
        },
        Expr::Neg(inner) => match eval(inner, vars, source)? {
            InlineValue::Int(i) => Ok(InlineValue::Int(-i)),
            InlineValue::Str(s) => Err(failure(format!("cannot negate '{}'", s))),
        },
        Expr::Binary(op, left, right) => {
            let left = eval(left, vars, source)?;
            let right = eval(right, vars, source)?;
            match (op, left, right) {
                (ArithOp::Add, InlineValue::Str(a), b) => Ok(InlineValue::Str(a + &b.render())),
                (ArithOp::Add, a, InlineValue::Str(b)) => Ok(InlineValue::Str(a.render() + &b)),
                (op, InlineValue::Int(a), InlineValue::Int(b)) => {
                    let value = match op {
                        ArithOp::Add => a.checked_add(b),
                        ArithOp::Sub => a.checked_sub(b),
                        ArithOp::Mul => a.checked_mul(b),
                        ArithOp::Div => a.checked_div(b),
                        ArithOp::Mod => a.checked_rem_euclid(b),
                    };
                    value
                        .map(InlineValue::Int)
                        .ok_or_else(|| failure("arithmetic overflow or division by zero".to_string()))
                }
                (_, a, b) => Err(failure(format!(
                    "unsupported operands '{}' and '{}'",
                    a.render(),
                    b.render()
                ))),
            }
        }
        Expr::Range(..) | Expr::List(_) => Err(failure("ranges and lists only expand data nodes".to_string())),
    }
}

fn expand_expr(expr: &Expr, vars: &HashMap<String, DataValue>, source: &str) -> ShardingResult<Vec<String>> {
    match expr {
        Expr::Range(low, high) => Ok((*low..=*high).map(|i| i.to_string()).collect()),
        Expr::List(items) => {
            let mut out = Vec::new();
            for item in items {
                out.extend(expand_expr(item, vars, source)?);
            }
            Ok(out)
        }
        other => Ok(vec![eval(other, vars, source)?.render()]),
    }
}

/// Recursive-descent parser for placeholder bodies
struct ExprParser<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl<'a> ExprParser<'a> {
    fn new(body: &str, source: &'a str) -> Self {
        ExprParser { chars: body.chars().collect(), pos: 0, source }
    }

    fn error(&self, msg: &str) -> ConfigError {
        ConfigError::invalid(format!("inline expression '{}': {}", self.source, msg))
    }

    fn parse(mut self) -> Result<Expr, ConfigError> {
        let expr = self.parse_sum()?;
        self.skip_ws();
        if self.pos != self.chars.len() {
            return Err(self.error(&format!("unexpected '{}'", self.chars[self.pos])));
        }
        Ok(expr)
    }

    fn skip_ws(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    fn parse_sum(&mut self) -> Result<Expr, ConfigError> {
        let mut left = self.parse_product()?;
        while let Some(c) = self.peek() {
            let op = match c {
                '+' => ArithOp::Add,
                '-' => ArithOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_product()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr, ConfigError> {
        let mut left = self.parse_unary()?;
        while let Some(c) = self.peek() {
            let op = match c {
                '*' => ArithOp::Mul,
                '/' => ArithOp::Div,
                '%' => ArithOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ConfigError> {
        if self.peek() == Some('-') {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ConfigError> {
        match self.peek() {
            Some(c) if c.is_ascii_digit() => {
                let low = self.read_int()?;
                if self.chars.get(self.pos) == Some(&'.') && self.chars.get(self.pos + 1) == Some(&'.') {
                    self.pos += 2;
                    self.skip_ws();
                    let high = self.read_int()?;
                    if high < low {
                        return Err(self.error(&format!("empty range {}..{}", low, high)));
                    }
                    return Ok(Expr::Range(low, high));
                }
                Ok(Expr::Int(low))
            }
            Some(q) if q == '\'' || q == '"' => {
                self.pos += 1;
                let start = self.pos;
                while self.pos < self.chars.len() && self.chars[self.pos] != q {
                    self.pos += 1;
                }
                if self.pos >= self.chars.len() {
                    return Err(self.error("unterminated string"));
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                Ok(Expr::Str(text))
            }
            Some('(') => {
                self.pos += 1;
                let expr = self.parse_sum()?;
                self.expect(')')?;
                Ok(expr)
            }
            Some('[') => {
                self.pos += 1;
                let mut items = vec![self.parse_sum()?];
                while self.peek() == Some(',') {
                    self.pos += 1;
                    items.push(self.parse_sum()?);
                }
                self.expect(']')?;
                Ok(Expr::List(items))
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let start = self.pos;
                while self.pos < self.chars.len()
                    && (self.chars[self.pos].is_alphanumeric() || self.chars[self.pos] == '_')
                {
                    self.pos += 1;
                }
                Ok(Expr::Var(self.chars[start..self.pos].iter().collect()))
            }
            Some(c) => Err(self.error(&format!("unexpected '{}'", c))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn read_int(&mut self) -> Result<i64, ConfigError> {
        let start = self.pos;
        while self.pos < self.chars.len() && self.chars[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<i64>().map_err(|_| self.error(&format!("invalid integer '{}'", text)))
    }

    fn expect(&mut self, c: char) -> Result<(), ConfigError> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }
}
