// Encrypt Rule
//
// Compiled form of the encrypt configuration: per logic table, the columns
// stored encrypted and the physical cipher column holding each.

use std::collections::HashMap;

use super::algorithm::EncryptAlgorithm;
use crate::config::{ConfigError, EncryptRuleConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct EncryptColumn {
    pub logic_column: String,
    pub cipher_column: String,
    pub algorithm: EncryptAlgorithm,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncryptRule {
    tables: HashMap<String, Vec<EncryptColumn>>,
}

impl EncryptRule {
    pub fn from_config(config: &EncryptRuleConfig) -> Result<Self, ConfigError> {
        let mut tables: HashMap<String, Vec<EncryptColumn>> = HashMap::new();
        for table in &config.tables {
            let name = table.table.to_lowercase();
            if tables.contains_key(&name) {
                return Err(ConfigError::invalid(format!("duplicate encrypt rule for table '{}'", table.table)));
            }
            let mut columns = Vec::with_capacity(table.columns.len());
            for column in &table.columns {
                if column.cipher_column.eq_ignore_ascii_case(&column.logic_column) {
                    return Err(ConfigError::invalid(format!(
                        "cipher column of '{}.{}' must differ from the logic column",
                        table.table, column.logic_column
                    )));
                }
                columns.push(EncryptColumn {
                    logic_column: column.logic_column.to_lowercase(),
                    cipher_column: column.cipher_column.clone(),
                    algorithm: EncryptAlgorithm::from_config(&column.algorithm)?,
                });
            }
            tables.insert(name, columns);
        }
        Ok(EncryptRule { tables })
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn is_encrypt_table(&self, table: &str) -> bool {
        self.tables.contains_key(&table.to_lowercase())
    }

    pub fn find(&self, table: &str, column: &str) -> Option<&EncryptColumn> {
        self.tables
            .get(&table.to_lowercase())?
            .iter()
            .find(|c| c.logic_column.eq_ignore_ascii_case(column))
    }

    pub fn columns(&self, table: &str) -> &[EncryptColumn] {
        self.tables.get(&table.to_lowercase()).map(|c| c.as_slice()).unwrap_or(&[])
    }
}
