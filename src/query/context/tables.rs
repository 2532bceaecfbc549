// Table Binding
//
// Collects every table a statement touches and resolves column owners
// (table names or aliases) back to logical table names.

use std::collections::HashMap;

use crate::query::parser::ast::{Statement, TableSegment};

/// Tables referenced by a statement. Logical names are lower-cased.
#[derive(Debug, Clone, Default)]
pub struct TablesContext {
    segments: Vec<TableSegment>,
    names: Vec<String>,
    aliases: HashMap<String, String>,
}

impl TablesContext {
    pub fn from_statement(statement: &Statement) -> Self {
        let mut context = TablesContext::default();
        for segment in statement.all_tables() {
            let name = segment.name.to_lowercase();
            if !context.names.contains(&name) {
                context.names.push(name.clone());
            }
            if let Some(alias) = &segment.alias {
                context.aliases.insert(alias.to_lowercase(), name);
            }
            context.segments.push(segment.clone());
        }
        context
    }

    /// Every table occurrence, including repeats and subquery tables
    pub fn segments(&self) -> &[TableSegment] {
        &self.segments
    }

    /// Distinct logical table names in order of first appearance
    pub fn table_names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Resolve an owner qualifier to its logical table name
    pub fn resolve_owner(&self, owner: &str) -> Option<&str> {
        let owner = owner.to_lowercase();
        if let Some(table) = self.aliases.get(&owner) {
            return Some(table.as_str());
        }
        self.names.iter().find(|name| **name == owner).map(|name| name.as_str())
    }

    /// True when `owner` is written as a table name rather than an alias
    pub fn is_table_name(&self, owner: &str) -> bool {
        let owner = owner.to_lowercase();
        !self.aliases.contains_key(&owner) && self.names.contains(&owner)
    }
}
