// Data Value Implementation
//
// This module defines the scalar value type that flows through routing,
// parameter binding, result cursors and merging.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::error::{ShardingError, ShardingResult};

/// Possible data types for values in a row or a bound parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Date(String),
    Timestamp(String),
    Blob(Vec<u8>),
}

impl Eq for DataValue {}

impl Hash for DataValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            DataValue::Null => 0.hash(state),
            DataValue::Integer(i) => { 1.hash(state); i.hash(state); }
            DataValue::Float(f) => { 2.hash(state); f.to_bits().hash(state); }
            DataValue::Text(s) => { 3.hash(state); s.hash(state); }
            DataValue::Boolean(b) => { 4.hash(state); b.hash(state); }
            DataValue::Date(s) => { 5.hash(state); s.hash(state); }
            DataValue::Timestamp(s) => { 6.hash(state); s.hash(state); }
            DataValue::Blob(b) => { 7.hash(state); b.hash(state); }
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => write!(f, "NULL"),
            DataValue::Integer(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::Text(s) => write!(f, "{}", s),
            DataValue::Boolean(b) => write!(f, "{}", b),
            DataValue::Date(s) => write!(f, "{}", s),
            DataValue::Timestamp(s) => write!(f, "{}", s),
            DataValue::Blob(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

impl PartialOrd for DataValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (DataValue::Null, DataValue::Null) => Some(Ordering::Equal),
            (DataValue::Null, _) => Some(Ordering::Less),
            (_, DataValue::Null) => Some(Ordering::Greater),

            (DataValue::Integer(a), DataValue::Integer(b)) => a.partial_cmp(b),
            (DataValue::Float(a), DataValue::Float(b)) => a.partial_cmp(b),
            (DataValue::Integer(a), DataValue::Float(b)) => (*a as f64).partial_cmp(b),
            (DataValue::Float(a), DataValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (DataValue::Text(a), DataValue::Text(b)) => Some(a.cmp(b)),
            (DataValue::Boolean(a), DataValue::Boolean(b)) => a.partial_cmp(b),
            (DataValue::Date(a), DataValue::Date(b)) => Some(a.cmp(b)),
            (DataValue::Timestamp(a), DataValue::Timestamp(b)) => Some(a.cmp(b)),
            (DataValue::Blob(a), DataValue::Blob(b)) => Some(a.cmp(b)),

            // Temporal values travel as their string representation
            (DataValue::Text(a), DataValue::Date(b)) | (DataValue::Date(a), DataValue::Text(b)) => Some(a.cmp(b)),
            (DataValue::Text(a), DataValue::Timestamp(b)) | (DataValue::Timestamp(a), DataValue::Text(b)) => Some(a.cmp(b)),
            (DataValue::Date(a), DataValue::Timestamp(b)) => Some(a.as_str().cmp(b.split(' ').next().unwrap_or(""))),
            (DataValue::Timestamp(a), DataValue::Date(b)) => Some(a.split(' ').next().unwrap_or("").cmp(b.as_str())),

            _ => None,
        }
    }
}

impl DataValue {
    /// Name of the value's type, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::Null => "NULL",
            DataValue::Integer(_) => "INTEGER",
            DataValue::Float(_) => "FLOAT",
            DataValue::Text(_) => "TEXT",
            DataValue::Boolean(_) => "BOOLEAN",
            DataValue::Date(_) => "DATE",
            DataValue::Timestamp(_) => "TIMESTAMP",
            DataValue::Blob(_) => "BLOB",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    /// Compare two DataValues for sorting purposes.
    /// NULLs are considered less than any non-NULL value.
    /// Returns an error for incompatible types.
    pub fn compare(&self, other: &Self) -> ShardingResult<Ordering> {
        match (self, other) {
            (DataValue::Null, DataValue::Null) => Ok(Ordering::Equal),
            (DataValue::Null, _) => Ok(Ordering::Less),
            (_, DataValue::Null) => Ok(Ordering::Greater),
            (a, b) => a.partial_cmp(b).ok_or_else(|| {
                ShardingError::TypeError(format!(
                    "Cannot compare incompatible types: {} and {}",
                    a.type_name(),
                    b.type_name()
                ))
            }),
        }
    }

    /// Integer view of the value, used by numeric sharding algorithms
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DataValue::Integer(i) => Some(*i),
            DataValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            DataValue::Text(s) => s.trim().parse::<i64>().ok(),
            DataValue::Boolean(b) => Some(if *b { 1 } else { 0 }),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataValue::Integer(i) => Some(*i as f64),
            DataValue::Float(f) => Some(*f),
            DataValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DataValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Plain textual form without quoting, as fed to inline expressions and
    /// encryptors
    pub fn to_plain_text(&self) -> String {
        match self {
            DataValue::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Render the value as a SQL literal suitable for splicing into a statement
    pub fn to_sql_literal(&self) -> String {
        match self {
            DataValue::Null => "NULL".to_string(),
            DataValue::Integer(i) => i.to_string(),
            DataValue::Float(f) => f.to_string(),
            DataValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            DataValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            DataValue::Date(s) => format!("'{}'", s),
            DataValue::Timestamp(s) => format!("'{}'", s),
            DataValue::Blob(b) => format!("X'{}'", hex::encode(b)),
        }
    }

    /// Add two numeric values, widening to float on overflow or mixed types.
    /// NULL is the identity element.
    pub fn add(&self, other: &Self) -> ShardingResult<DataValue> {
        match (self, other) {
            (DataValue::Null, v) | (v, DataValue::Null) => Ok(v.clone()),
            (DataValue::Integer(a), DataValue::Integer(b)) => Ok(a
                .checked_add(*b)
                .map(DataValue::Integer)
                .unwrap_or(DataValue::Float(*a as f64 + *b as f64))),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(DataValue::Float(x + y)),
                _ => Err(ShardingError::TypeError(format!(
                    "Cannot add {} and {}",
                    a.type_name(),
                    b.type_name()
                ))),
            },
        }
    }
}

impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        DataValue::Integer(value)
    }
}

impl From<i32> for DataValue {
    fn from(value: i32) -> Self {
        DataValue::Integer(value as i64)
    }
}

impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        DataValue::Float(value)
    }
}

impl From<bool> for DataValue {
    fn from(value: bool) -> Self {
        DataValue::Boolean(value)
    }
}

impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        DataValue::Text(value.to_string())
    }
}

impl From<String> for DataValue {
    fn from(value: String) -> Self {
        DataValue::Text(value)
    }
}
