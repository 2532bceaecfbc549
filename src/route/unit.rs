// Route Units
//
// The output of routing: which data source runs the statement and which
// actual table stands in for each logic table there.

use std::fmt;

use crate::config::ConfigError;

/// One physical table in one data source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        DataNode { data_source: data_source.into(), table: table.into() }
    }

    /// Parse the `ds.table` form
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let text = text.trim();
        match text.split_once('.') {
            Some((ds, table)) if !ds.is_empty() && !table.is_empty() && !table.contains('.') => {
                Ok(DataNode::new(ds, table))
            }
            _ => Err(ConfigError::invalid(format!("invalid data node '{}', expected ds.table", text))),
        }
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapper {
    pub logic_table: String,
    pub actual_table: String,
}

impl TableMapper {
    pub fn new(logic_table: impl Into<String>, actual_table: impl Into<String>) -> Self {
        TableMapper { logic_table: logic_table.into(), actual_table: actual_table.into() }
    }
}

/// One execution target: a data source plus the actual table for every
/// logic table the statement touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteUnit {
    pub data_source: String,
    pub table_mappers: Vec<TableMapper>,
}

impl RouteUnit {
    pub fn new(data_source: impl Into<String>, table_mappers: Vec<TableMapper>) -> Self {
        RouteUnit { data_source: data_source.into(), table_mappers }
    }

    /// Actual table standing in for `logic_table` (case-insensitive)
    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.table_mappers
            .iter()
            .find(|m| m.logic_table.eq_ignore_ascii_case(logic_table))
            .map(|m| m.actual_table.as_str())
    }
}

impl fmt::Display for RouteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.data_source)?;
        for (i, mapper) in self.table_mappers.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} -> {}", mapper.logic_table, mapper.actual_table)?;
        }
        write!(f, "]")
    }
}

/// Routing result for one statement
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteContext {
    pub units: Vec<RouteUnit>,
    /// For INSERT, the data node each VALUES row was routed to
    pub insert_row_nodes: Vec<DataNode>,
}

impl RouteContext {
    pub fn new(units: Vec<RouteUnit>) -> Self {
        RouteContext { units, insert_row_nodes: Vec::new() }
    }

    pub fn is_single_unit(&self) -> bool {
        self.units.len() == 1
    }

    /// Distinct data sources in unit order
    pub fn data_sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = Vec::new();
        for unit in &self.units {
            if !sources.contains(&unit.data_source.as_str()) {
                sources.push(&unit.data_source);
            }
        }
        sources
    }

    /// Indexes of the INSERT rows routed to `unit`
    pub fn insert_rows_for(&self, unit: &RouteUnit) -> Vec<usize> {
        self.insert_row_nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| {
                node.data_source == unit.data_source
                    && unit.table_mappers.iter().any(|m| m.actual_table == node.table)
            })
            .map(|(row, _)| row)
            .collect()
    }
}
