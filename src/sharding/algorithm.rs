// Sharding Algorithms and Strategies
//
// This module resolves configured algorithms into a closed set of variants
// once, at rule build time. Routing pattern-matches on them: a precise value
// selects at most one target, a range selects a subset, and hint values are
// treated as precise values supplied from outside the statement.

use std::collections::HashMap;
use std::ops::Bound;

use log::warn;

use super::inline::InlineExpression;
use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;
use crate::config::{AlgorithmConfig, ConfigError, StrategyConfig};

/// A range of sharding values
#[derive(Debug, Clone, PartialEq)]
pub struct ShardingRange {
    pub lower: Bound<DataValue>,
    pub upper: Bound<DataValue>,
}

impl ShardingRange {
    pub fn between(low: DataValue, high: DataValue) -> Self {
        ShardingRange { lower: Bound::Included(low), upper: Bound::Included(high) }
    }

    /// Inclusive integer bounds; `None` means unbounded on that side
    fn integer_bounds(&self) -> ShardingResult<(Option<i64>, Option<i64>)> {
        let lower = match &self.lower {
            Bound::Included(v) => Some(integer(v)?),
            Bound::Excluded(v) => Some(integer(v)?.saturating_add(1)),
            Bound::Unbounded => None,
        };
        let upper = match &self.upper {
            Bound::Included(v) => Some(integer(v)?),
            Bound::Excluded(v) => Some(integer(v)?.saturating_sub(1)),
            Bound::Unbounded => None,
        };
        Ok((lower, upper))
    }
}

/// Values of one sharding column, resolved from a condition or a hint
#[derive(Debug, Clone, PartialEq)]
pub enum ShardingValue {
    /// `=` or `IN`; routes to the union of each value's target
    Precise(Vec<DataValue>),
    Range(ShardingRange),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnShardingValue {
    pub column: String,
    pub value: ShardingValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShardingAlgorithm {
    /// `value % count` selects the target with that numeric suffix
    Mod { count: u64 },
    /// Stable hash of the value's text, modulo `count`
    HashMod { count: u64 },
    Inline(InlineExpression),
    /// Partition `i` covers `[boundaries[i-1], boundaries[i])`; the first and
    /// last partitions are open-ended
    BoundaryRange { boundaries: Vec<i64> },
}

impl ShardingAlgorithm {
    pub fn from_config(config: &AlgorithmConfig) -> Result<Self, ConfigError> {
        match config {
            AlgorithmConfig::Mod { sharding_count } | AlgorithmConfig::HashMod { sharding_count }
                if *sharding_count == 0 =>
            {
                Err(ConfigError::invalid("sharding_count must be positive"))
            }
            AlgorithmConfig::Mod { sharding_count } => Ok(ShardingAlgorithm::Mod { count: *sharding_count }),
            AlgorithmConfig::HashMod { sharding_count } => {
                Ok(ShardingAlgorithm::HashMod { count: *sharding_count })
            }
            AlgorithmConfig::Inline { expression } => {
                Ok(ShardingAlgorithm::Inline(InlineExpression::parse(expression)?))
            }
            AlgorithmConfig::BoundaryRange { boundaries } => {
                if boundaries.is_empty() || boundaries.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(ConfigError::invalid("boundaries must be non-empty and strictly ascending"));
                }
                Ok(ShardingAlgorithm::BoundaryRange { boundaries: boundaries.clone() })
            }
            AlgorithmConfig::VolumeRange { lower, upper, volume } => {
                if *volume <= 0 || upper <= lower {
                    return Err(ConfigError::invalid("volume range needs lower < upper and a positive volume"));
                }
                let mut boundaries = Vec::new();
                let mut next = *lower;
                while next < *upper {
                    boundaries.push(next);
                    next = next.saturating_add(*volume);
                }
                boundaries.push(*upper);
                Ok(ShardingAlgorithm::BoundaryRange { boundaries })
            }
        }
    }

    /// Route one value of `column`. `Ok(None)` means the value maps to no
    /// target in `targets`.
    pub fn precise(&self, targets: &[String], column: &str, value: &DataValue) -> ShardingResult<Option<String>> {
        match self {
            ShardingAlgorithm::Mod { count } => {
                let index = integer(value)?.rem_euclid(*count as i64) as u64;
                Ok(find_by_suffix(targets, index))
            }
            ShardingAlgorithm::HashMod { count } => {
                let index = fnv1a(value.to_plain_text().as_bytes()) % count;
                Ok(find_by_suffix(targets, index))
            }
            ShardingAlgorithm::Inline(expression) => {
                let mut vars = HashMap::new();
                vars.insert(column.to_string(), value.clone());
                let name = expression.evaluate(&vars)?;
                Ok(targets.iter().find(|t| t.eq_ignore_ascii_case(&name)).cloned())
            }
            ShardingAlgorithm::BoundaryRange { boundaries } => {
                let index = partition_of(boundaries, integer(value)?);
                Ok(find_by_suffix(targets, index))
            }
        }
    }

    /// Route a range of `column` values
    pub fn range(&self, targets: &[String], column: &str, range: &ShardingRange) -> ShardingResult<Vec<String>> {
        match self {
            ShardingAlgorithm::Mod { count } => match range.integer_bounds()? {
                (Some(low), Some(high)) if high < low => Ok(Vec::new()),
                (Some(low), Some(high)) if high.checked_sub(low).is_some_and(|span| span < *count as i64) => {
                    let indexes: Vec<u64> = (low..=high).map(|v| v.rem_euclid(*count as i64) as u64).collect();
                    Ok(targets
                        .iter()
                        .filter(|t| suffix_of(t).is_some_and(|s| indexes.contains(&s)))
                        .cloned()
                        .collect())
                }
                _ => Ok(targets.to_vec()),
            },
            ShardingAlgorithm::HashMod { .. } => Ok(targets.to_vec()),
            ShardingAlgorithm::Inline(expression) => {
                warn!(
                    "Range condition on '{}' cannot be evaluated by inline expression '{}', routing to all targets",
                    column,
                    expression.source()
                );
                Ok(targets.to_vec())
            }
            ShardingAlgorithm::BoundaryRange { boundaries } => {
                let (low, high) = range.integer_bounds()?;
                let first = low.map(|v| partition_of(boundaries, v)).unwrap_or(0);
                let last = high.map(|v| partition_of(boundaries, v)).unwrap_or(boundaries.len() as u64);
                if let (Some(low), Some(high)) = (low, high) {
                    if high < low {
                        return Ok(Vec::new());
                    }
                }
                Ok(targets
                    .iter()
                    .filter(|t| suffix_of(t).is_some_and(|s| s >= first && s <= last))
                    .cloned()
                    .collect())
            }
        }
    }
}

/// How a table is split over data sources or actual tables
#[derive(Debug, Clone, PartialEq)]
pub enum ShardingStrategy {
    Standard { column: String, algorithm: ShardingAlgorithm },
    /// Several columns feeding one inline expression
    Complex { columns: Vec<String>, algorithm: ShardingAlgorithm },
    /// Values come only from a `HintManager`
    Hint { algorithm: ShardingAlgorithm },
    None,
}

impl ShardingStrategy {
    pub fn from_config(config: &StrategyConfig) -> Result<Self, ConfigError> {
        match config {
            StrategyConfig::Standard { sharding_column, algorithm } => Ok(ShardingStrategy::Standard {
                column: sharding_column.to_lowercase(),
                algorithm: ShardingAlgorithm::from_config(algorithm)?,
            }),
            StrategyConfig::Complex { sharding_columns, algorithm } => {
                let algorithm = ShardingAlgorithm::from_config(algorithm)?;
                if !matches!(algorithm, ShardingAlgorithm::Inline(_)) {
                    return Err(ConfigError::invalid("complex strategies require an inline algorithm"));
                }
                if sharding_columns.is_empty() {
                    return Err(ConfigError::invalid("complex strategies need at least one sharding column"));
                }
                Ok(ShardingStrategy::Complex {
                    columns: sharding_columns.iter().map(|c| c.to_lowercase()).collect(),
                    algorithm,
                })
            }
            StrategyConfig::Hint { algorithm } => Ok(ShardingStrategy::Hint {
                algorithm: ShardingAlgorithm::from_config(algorithm)?,
            }),
            StrategyConfig::None => Ok(ShardingStrategy::None),
        }
    }

    /// Columns whose conditions feed this strategy (lower-cased)
    pub fn sharding_columns(&self) -> Vec<&str> {
        match self {
            ShardingStrategy::Standard { column, .. } => vec![column.as_str()],
            ShardingStrategy::Complex { columns, .. } => columns.iter().map(|c| c.as_str()).collect(),
            ShardingStrategy::Hint { .. } | ShardingStrategy::None => Vec::new(),
        }
    }

    /// Route `targets` by column values. Several values on the same column
    /// intersect; no values means every target. The result keeps the order
    /// of `targets`.
    pub fn do_sharding(&self, targets: &[String], values: &[ColumnShardingValue]) -> ShardingResult<Vec<String>> {
        match self {
            ShardingStrategy::Standard { column, algorithm } => {
                let mut result: Option<Vec<String>> = None;
                for value in values.iter().filter(|v| v.column == *column) {
                    let routed = route_value(algorithm, targets, column, &value.value)?;
                    result = Some(match result {
                        Some(previous) => previous.into_iter().filter(|t| routed.contains(t)).collect(),
                        None => routed,
                    });
                }
                Ok(result.unwrap_or_else(|| targets.to_vec()))
            }
            ShardingStrategy::Complex { columns, algorithm } => {
                complex_sharding(algorithm, columns, targets, values)
            }
            ShardingStrategy::Hint { .. } | ShardingStrategy::None => Ok(targets.to_vec()),
        }
    }

    /// Route `targets` by externally supplied values
    pub fn do_hint_sharding(&self, targets: &[String], hint_values: &[DataValue]) -> ShardingResult<Vec<String>> {
        let (column, algorithm) = match self {
            ShardingStrategy::Hint { algorithm } => ("value", algorithm),
            ShardingStrategy::Standard { column, algorithm } => (column.as_str(), algorithm),
            ShardingStrategy::Complex { .. } | ShardingStrategy::None => return Ok(targets.to_vec()),
        };
        route_value(algorithm, targets, column, &ShardingValue::Precise(hint_values.to_vec()))
    }
}

fn route_value(
    algorithm: &ShardingAlgorithm,
    targets: &[String],
    column: &str,
    value: &ShardingValue,
) -> ShardingResult<Vec<String>> {
    match value {
        ShardingValue::Precise(values) => {
            let mut hits = Vec::new();
            for value in values.iter().filter(|v| !v.is_null()) {
                match algorithm.precise(targets, column, value)? {
                    Some(target) => {
                        if !hits.contains(&target) {
                            hits.push(target);
                        }
                    }
                    None => {
                        return Err(ShardingError::RoutingFailure(format!(
                            "value {} of '{}' maps to no configured target among [{}]",
                            value.to_sql_literal(),
                            column,
                            targets.join(", ")
                        )));
                    }
                }
            }
            Ok(targets.iter().filter(|t| hits.contains(t)).cloned().collect())
        }
        ShardingValue::Range(range) => algorithm.range(targets, column, range),
    }
}

fn complex_sharding(
    algorithm: &ShardingAlgorithm,
    columns: &[String],
    targets: &[String],
    values: &[ColumnShardingValue],
) -> ShardingResult<Vec<String>> {
    let ShardingAlgorithm::Inline(expression) = algorithm else {
        return Ok(targets.to_vec());
    };

    // Each column needs precise values; anything else evaluates to every target
    let mut per_column: Vec<(String, Vec<DataValue>)> = Vec::new();
    for column in columns {
        let mut candidates: Option<Vec<DataValue>> = None;
        for value in values.iter().filter(|v| v.column == *column) {
            match &value.value {
                ShardingValue::Precise(list) => {
                    let list: Vec<DataValue> = list.iter().filter(|v| !v.is_null()).cloned().collect();
                    candidates = Some(match candidates {
                        Some(previous) => previous.into_iter().filter(|v| list.contains(v)).collect(),
                        None => list,
                    });
                }
                ShardingValue::Range(_) => {}
            }
        }
        match candidates {
            Some(list) => per_column.push((column.clone(), list)),
            None => return Ok(targets.to_vec()),
        }
    }

    let mut combinations: Vec<HashMap<String, DataValue>> = vec![HashMap::new()];
    for (column, list) in &per_column {
        let mut next = Vec::with_capacity(combinations.len() * list.len());
        for combination in &combinations {
            for value in list {
                let mut extended = combination.clone();
                extended.insert(column.clone(), value.clone());
                next.push(extended);
            }
        }
        combinations = next;
    }

    let mut hits = Vec::new();
    for vars in &combinations {
        let name = expression.evaluate(vars)?;
        match targets.iter().find(|t| t.eq_ignore_ascii_case(&name)) {
            Some(target) => hits.push(target.clone()),
            None => {
                return Err(ShardingError::RoutingFailure(format!(
                    "inline expression '{}' produced '{}', which is not among [{}]",
                    expression.source(),
                    name,
                    targets.join(", ")
                )));
            }
        }
    }
    Ok(targets.iter().filter(|t| hits.contains(t)).cloned().collect())
}

fn integer(value: &DataValue) -> ShardingResult<i64> {
    value.as_i64().ok_or_else(|| {
        ShardingError::TypeError(format!(
            "sharding value {} ({}) is not an integer",
            value.to_sql_literal(),
            value.type_name()
        ))
    })
}

fn partition_of(boundaries: &[i64], value: i64) -> u64 {
    boundaries.iter().take_while(|b| **b <= value).count() as u64
}

/// Trailing decimal digits of a target name, e.g. `t_order_12` -> 12
fn suffix_of(target: &str) -> Option<u64> {
    let digits = target.len() - target.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    target[target.len() - digits..].parse().ok()
}

fn find_by_suffix(targets: &[String], index: u64) -> Option<String> {
    targets.iter().find(|t| suffix_of(t) == Some(index)).cloned()
}

/// 64-bit FNV-1a; stable across processes and platforms
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
