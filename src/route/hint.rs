// Hint Manager
//
// Sharding values supplied by the caller instead of being read from the
// statement. Table-scoped values replace extracted conditions for that table;
// a forced data source sends the statement there unchanged.

use std::collections::HashMap;

use crate::common::value::DataValue;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HintManager {
    database_values: HashMap<String, Vec<DataValue>>,
    table_values: HashMap<String, Vec<DataValue>>,
    data_source: Option<String>,
}

impl HintManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_database_value(&mut self, logic_table: &str, value: impl Into<DataValue>) -> &mut Self {
        self.database_values.entry(logic_table.to_lowercase()).or_default().push(value.into());
        self
    }

    pub fn add_table_value(&mut self, logic_table: &str, value: impl Into<DataValue>) -> &mut Self {
        self.table_values.entry(logic_table.to_lowercase()).or_default().push(value.into());
        self
    }

    /// Route the whole statement to one data source, bypassing sharding
    pub fn set_data_source(&mut self, data_source: impl Into<String>) -> &mut Self {
        self.data_source = Some(data_source.into());
        self
    }

    pub fn database_values(&self, logic_table: &str) -> Option<&[DataValue]> {
        self.database_values.get(&logic_table.to_lowercase()).map(|v| v.as_slice())
    }

    pub fn table_values(&self, logic_table: &str) -> Option<&[DataValue]> {
        self.table_values.get(&logic_table.to_lowercase()).map(|v| v.as_slice())
    }

    pub fn data_source(&self) -> Option<&str> {
        self.data_source.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.database_values.is_empty() && self.table_values.is_empty() && self.data_source.is_none()
    }

    pub fn clear(&mut self) {
        self.database_values.clear();
        self.table_values.clear();
        self.data_source = None;
    }
}
