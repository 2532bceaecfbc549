// Projection Context
//
// Describes the SELECT list as the merge stage sees it: logical columns,
// aggregations, and the hidden derived columns that multi-shard queries
// append so ordering, grouping and AVG can be recomputed after the fact.

use crate::query::parser::ast::{AggregateFunction, Expression, SelectItem, SelectStatement};

pub const ORDER_BY_DERIVED_PREFIX: &str = "ORDER_BY_DERIVED_";
pub const GROUP_BY_DERIVED_PREFIX: &str = "GROUP_BY_DERIVED_";
pub const AVG_DERIVED_COUNT_PREFIX: &str = "AVG_DERIVED_COUNT_";
pub const AVG_DERIVED_SUM_PREFIX: &str = "AVG_DERIVED_SUM_";

/// Where a value lives in a physical result row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnLocator {
    /// Zero-based position among the logical columns
    Projection(usize),
    /// Index into the derived column list, which follows the logical columns
    Derived(usize),
    /// Resolved against the result's column labels at merge time
    Label(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationProjection {
    pub function: AggregateFunction,
    pub distinct: bool,
    /// Expression text as written, e.g. `COUNT(*)`
    pub text: String,
    pub alias: Option<String>,
    pub locator: ColumnLocator,
    /// Derived (count, sum) columns for AVG
    pub avg_derived: Option<(usize, usize)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Wildcard { owner: Option<String> },
    Column { owner: Option<String>, name: String, alias: Option<String> },
    Aggregation(AggregationProjection),
    Expression { text: String, alias: Option<String> },
}

impl Projection {
    /// Label the projection is expected to carry in a result set
    pub fn label(&self) -> Option<String> {
        match self {
            Projection::Wildcard { .. } => None,
            Projection::Column { name, alias, .. } => Some(alias.clone().unwrap_or_else(|| name.clone())),
            Projection::Aggregation(agg) => Some(agg.alias.clone().unwrap_or_else(|| agg.text.clone())),
            Projection::Expression { text, alias } => Some(alias.clone().unwrap_or_else(|| text.clone())),
        }
    }
}

/// A column appended to the physical SELECT list
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedProjection {
    pub expression: String,
    pub alias: String,
}

impl DerivedProjection {
    pub fn to_sql(&self) -> String {
        format!("{} AS {}", self.expression, self.alias)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectionsContext {
    pub items: Vec<Projection>,
    pub derived: Vec<DerivedProjection>,
    pub has_wildcard: bool,
    /// Offset just after the last projection, where derived columns are spliced
    pub insert_position: usize,
}

impl ProjectionsContext {
    pub fn from_select(sql: &str, select: &SelectStatement) -> Self {
        let mut context = ProjectionsContext {
            insert_position: select.projections_span.end,
            ..Default::default()
        };
        context.has_wildcard = select
            .projections
            .iter()
            .any(|item| matches!(item, SelectItem::Wildcard { .. }));

        let mut avg_count = 0;
        for (position, item) in select.projections.iter().enumerate() {
            let projection = match item {
                SelectItem::Wildcard { owner, .. } => Projection::Wildcard {
                    owner: owner.as_ref().map(|o| o.name.clone()),
                },
                SelectItem::Expression { expr: Expression::Column(column), alias, .. } => Projection::Column {
                    owner: column.owner.as_ref().map(|o| o.name.clone()),
                    name: column.name.clone(),
                    alias: alias.clone(),
                },
                SelectItem::Expression {
                    expr: Expression::Aggregate { function, arg, distinct, span },
                    alias,
                    ..
                } => {
                    let text = span.text(sql).to_string();
                    let locator = if context.has_wildcard {
                        ColumnLocator::Label(alias.clone().unwrap_or_else(|| text.clone()))
                    } else {
                        ColumnLocator::Projection(position)
                    };
                    let avg_derived = if *function == AggregateFunction::Avg {
                        let inner = arg.as_ref().map(|a| a.span().text(sql)).unwrap_or("*");
                        let count = context.push_derived(
                            format!("COUNT({})", inner),
                            format!("{}{}", AVG_DERIVED_COUNT_PREFIX, avg_count),
                        );
                        let sum = context.push_derived(
                            format!("SUM({})", inner),
                            format!("{}{}", AVG_DERIVED_SUM_PREFIX, avg_count),
                        );
                        avg_count += 1;
                        Some((count, sum))
                    } else {
                        None
                    };
                    Projection::Aggregation(AggregationProjection {
                        function: *function,
                        distinct: *distinct,
                        text,
                        alias: alias.clone(),
                        locator,
                        avg_derived,
                    })
                }
                SelectItem::Expression { expr, alias, .. } => Projection::Expression {
                    text: expr.span().text(sql).to_string(),
                    alias: alias.clone(),
                },
            };
            context.items.push(projection);
        }
        context
    }

    fn push_derived(&mut self, expression: String, alias: String) -> usize {
        self.derived.push(DerivedProjection { expression, alias });
        self.derived.len() - 1
    }

    /// Append a derived column for `expression`, reusing an identical one
    pub fn derive(&mut self, expression: &str, prefix: &str) -> usize {
        let normalized = normalize(expression);
        if let Some(index) = self
            .derived
            .iter()
            .position(|d| !d.alias.starts_with("AVG_DERIVED_") && normalize(&d.expression) == normalized)
        {
            return index;
        }
        let ordinal = self.derived.iter().filter(|d| d.alias.starts_with(prefix)).count();
        self.push_derived(expression.to_string(), format!("{}{}", prefix, ordinal))
    }

    pub fn aggregations(&self) -> impl Iterator<Item = &AggregationProjection> {
        self.items.iter().filter_map(|item| match item {
            Projection::Aggregation(agg) => Some(agg),
            _ => None,
        })
    }

    pub fn has_aggregation(&self) -> bool {
        self.aggregations().next().is_some()
    }

    /// Labels of the logical columns, when knowable without a result set
    pub fn logical_labels(&self) -> Vec<String> {
        self.items.iter().filter_map(Projection::label).collect()
    }

    /// Locate an ORDER BY / GROUP BY expression among the projections
    pub fn find(&self, sql: &str, expr: &Expression) -> Option<ColumnLocator> {
        if let Expression::Literal { value: crate::query::parser::ast::Value::Integer(ordinal), .. } = expr {
            if *ordinal >= 1 {
                return Some(ColumnLocator::Projection(*ordinal as usize - 1));
            }
            return None;
        }

        let target = normalize(expr.span().text(sql));
        for (position, item) in self.items.iter().enumerate() {
            let matched = match (item, expr) {
                (Projection::Column { owner, name, alias }, Expression::Column(column)) => {
                    let alias_match = column.owner.is_none()
                        && alias.as_ref().is_some_and(|a| a.eq_ignore_ascii_case(&column.name));
                    let owners_agree = match (owner, &column.owner) {
                        (Some(a), Some(b)) => a.eq_ignore_ascii_case(&b.name),
                        _ => true,
                    };
                    alias_match || (owners_agree && name.eq_ignore_ascii_case(&column.name))
                }
                (item, Expression::Column(column)) if column.owner.is_none() => item
                    .label()
                    .is_some_and(|label| label.eq_ignore_ascii_case(&column.name) && has_alias(item)),
                (Projection::Aggregation(agg), _) => normalize(&agg.text) == target,
                (Projection::Expression { text, .. }, _) => normalize(text) == target,
                _ => false,
            };
            if matched {
                return Some(if self.has_wildcard {
                    ColumnLocator::Label(item.label().unwrap_or_default())
                } else {
                    ColumnLocator::Projection(position)
                });
            }
        }
        None
    }
}

fn has_alias(item: &Projection) -> bool {
    match item {
        Projection::Column { alias, .. } | Projection::Expression { alias, .. } => alias.is_some(),
        Projection::Aggregation(agg) => agg.alias.is_some(),
        Projection::Wildcard { .. } => false,
    }
}

/// Case- and whitespace-insensitive form of an expression's text
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}
