// Encrypt Module
//
// Column-level encryption layered on top of sharding. Logic columns are
// stored in cipher columns: reads and predicates are rewritten to the cipher
// column, values written or compared are encrypted, and result values are
// decrypted by a column-value merge decorator.

pub mod algorithm;
pub mod rule;

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::query::context::StatementContext;
use crate::query::parser::ast::{ColumnReference, Expression, SelectItem, Span, Statement};

pub use algorithm::EncryptAlgorithm;
pub use rule::{EncryptColumn, EncryptRule};

/// Replacement text for a span of the logical SQL
#[derive(Debug, Clone, PartialEq)]
pub struct SpanRewrite {
    pub span: Span,
    pub text: String,
}

/// Everything encryption changes about one statement
#[derive(Debug, Clone, Default)]
pub struct EncryptContext {
    /// Column names replaced by cipher columns
    pub column_rewrites: Vec<SpanRewrite>,
    /// Literals replaced by their ciphertext
    pub literal_rewrites: Vec<SpanRewrite>,
    /// Parameters whose bound values must be encrypted, by parameter index
    pub parameter_encryptors: BTreeMap<usize, EncryptAlgorithm>,
    /// INSERT column positions holding encrypted values
    pub insert_encryptors: HashMap<usize, EncryptAlgorithm>,
    /// Result column labels to decrypt
    pub decrypt_labels: Vec<(String, EncryptAlgorithm)>,
}

impl EncryptContext {
    pub fn build(rule: &EncryptRule, ctx: &StatementContext) -> Self {
        let mut context = EncryptContext::default();
        if rule.is_empty() || !ctx.tables().table_names().iter().any(|t| rule.is_encrypt_table(t)) {
            return context;
        }
        let resolver = ColumnResolver { rule, ctx };
        let mut handled: HashSet<usize> = HashSet::new();

        if let Statement::Select(select) = ctx.statement() {
            for item in &select.projections {
                match item {
                    SelectItem::Expression { expr: Expression::Column(column), alias, .. } => {
                        if let Some(encrypt) = resolver.resolve(column) {
                            let text = match alias {
                                Some(_) => encrypt.cipher_column.clone(),
                                None => format!("{} AS {}", encrypt.cipher_column, column.name),
                            };
                            context.column_rewrites.push(SpanRewrite { span: column.name_span, text });
                            context
                                .decrypt_labels
                                .push((alias.clone().unwrap_or_else(|| column.name.clone()), encrypt.algorithm.clone()));
                            handled.insert(column.name_span.start);
                        }
                    }
                    SelectItem::Wildcard { owner, .. } => {
                        let tables: Vec<&str> = match owner {
                            Some(owner) => ctx.tables().resolve_owner(&owner.name).into_iter().collect(),
                            None => ctx.tables().table_names().iter().map(|t| t.as_str()).collect(),
                        };
                        for table in tables {
                            for encrypt in rule.columns(table) {
                                context
                                    .decrypt_labels
                                    .push((encrypt.cipher_column.clone(), encrypt.algorithm.clone()));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        for column in ctx.statement().column_references() {
            if handled.contains(&column.name_span.start) {
                continue;
            }
            if let Some(encrypt) = resolver.resolve(column) {
                context.column_rewrites.push(SpanRewrite {
                    span: column.name_span,
                    text: encrypt.cipher_column.clone(),
                });
                handled.insert(column.name_span.start);
            }
        }

        match ctx.statement() {
            Statement::Insert(insert) => {
                for (position, column) in insert.columns.iter().enumerate() {
                    if let Some(encrypt) = resolver.resolve(column) {
                        context.insert_encryptors.insert(position, encrypt.algorithm.clone());
                        for row in &insert.rows {
                            if let Some(Expression::Parameter { index, .. }) = row.values.get(position) {
                                context.parameter_encryptors.insert(*index, encrypt.algorithm.clone());
                            }
                        }
                    }
                }
            }
            Statement::Update(update) => {
                for assignment in &update.assignments {
                    if let Some(encrypt) = resolver.resolve(&assignment.column) {
                        context.encrypt_value(&assignment.value, &encrypt.algorithm);
                    }
                }
            }
            _ => {}
        }

        let mut compared: Vec<(&Expression, EncryptAlgorithm)> = Vec::new();
        ctx.statement().walk_expressions(&mut |expr| match expr {
            Expression::Binary { left, op, right, .. } if op.is_comparison() => {
                if let Expression::Column(column) = left.as_ref() {
                    if let Some(encrypt) = resolver.resolve(column) {
                        compared.push((right.as_ref(), encrypt.algorithm.clone()));
                    }
                }
                if let Expression::Column(column) = right.as_ref() {
                    if let Some(encrypt) = resolver.resolve(column) {
                        compared.push((left.as_ref(), encrypt.algorithm.clone()));
                    }
                }
            }
            Expression::InList { expr, list, .. } => {
                if let Expression::Column(column) = expr.as_ref() {
                    if let Some(encrypt) = resolver.resolve(column) {
                        compared.extend(list.iter().map(|item| (item, encrypt.algorithm.clone())));
                    }
                }
            }
            _ => {}
        });
        for (value, algorithm) in compared {
            context.encrypt_value(value, &algorithm);
        }

        context.column_rewrites.sort_by_key(|r| r.span.start);
        context.literal_rewrites.sort_by_key(|r| r.span.start);
        context
    }

    pub fn is_empty(&self) -> bool {
        self.column_rewrites.is_empty()
            && self.literal_rewrites.is_empty()
            && self.parameter_encryptors.is_empty()
            && self.insert_encryptors.is_empty()
            && self.decrypt_labels.is_empty()
    }

    fn encrypt_value(&mut self, value: &Expression, algorithm: &EncryptAlgorithm) {
        match value {
            Expression::Literal { value, span } => {
                if self.literal_rewrites.iter().any(|r| r.span == *span) {
                    return;
                }
                let cipher = algorithm.encrypt(&value.to_data_value());
                self.literal_rewrites.push(SpanRewrite { span: *span, text: cipher.to_sql_literal() });
            }
            Expression::Parameter { index, .. } => {
                self.parameter_encryptors.insert(*index, algorithm.clone());
            }
            _ => {}
        }
    }
}

struct ColumnResolver<'a> {
    rule: &'a EncryptRule,
    ctx: &'a StatementContext,
}

impl<'a> ColumnResolver<'a> {
    fn resolve(&self, column: &ColumnReference) -> Option<&'a EncryptColumn> {
        match &column.owner {
            Some(owner) => {
                let table = self.ctx.tables().resolve_owner(&owner.name)?;
                self.rule.find(table, &column.name)
            }
            None => self
                .ctx
                .tables()
                .table_names()
                .iter()
                .find_map(|table| self.rule.find(table, &column.name)),
        }
    }
}
