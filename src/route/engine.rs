// Routing Engine
//
// Turns a bound statement and its sharding conditions into route units.
// Routing is deterministic and side-effect free: it reads the rule snapshot,
// the conditions and the bound parameters, nothing else.

use log::debug;

use super::condition::{ConditionSet, ShardingConditions};
use super::hint::HintManager;
use super::unit::{DataNode, RouteContext, RouteUnit, TableMapper};
use crate::common::error::{ShardingError, ShardingResult};
use crate::common::value::DataValue;
use crate::query::context::{StatementContext, StatementKind};
use crate::sharding::{ColumnShardingValue, ShardingRule, TableRule};

pub struct RoutingEngine<'a> {
    rule: &'a ShardingRule,
    /// Data sources the connection provider can serve; `None` means all
    available: Option<&'a [String]>,
}

/// Route for one group of co-routed tables: per data source, the mapper
/// tuples to combine with other groups
type GroupRoute = Vec<(String, Vec<TableMapper>)>;

impl<'a> RoutingEngine<'a> {
    pub fn new(rule: &'a ShardingRule, available: Option<&'a [String]>) -> Self {
        RoutingEngine { rule, available }
    }

    pub fn route(
        &self,
        ctx: &StatementContext,
        conditions: &ShardingConditions,
        params: &[DataValue],
        hint: Option<&HintManager>,
    ) -> ShardingResult<RouteContext> {
        let route = self.route_statement(ctx, conditions, params, hint)?;
        if let Some(available) = self.available {
            for unit in &route.units {
                if !available.contains(&unit.data_source) {
                    return Err(ShardingError::RoutingFailure(format!(
                        "data source '{}' is not available",
                        unit.data_source
                    )));
                }
            }
        }
        for unit in &route.units {
            debug!("Route unit: {}", unit);
        }
        Ok(route)
    }

    fn route_statement(
        &self,
        ctx: &StatementContext,
        conditions: &ShardingConditions,
        params: &[DataValue],
        hint: Option<&HintManager>,
    ) -> ShardingResult<RouteContext> {
        let tables = ctx.tables().table_names();

        if let Some(data_source) = hint.and_then(|h| h.data_source()) {
            if !self.rule.data_sources().iter().any(|ds| ds == data_source) {
                return Err(ShardingError::RoutingFailure(format!(
                    "hinted data source '{}' is not configured",
                    data_source
                )));
            }
            return Ok(RouteContext::new(vec![RouteUnit::new(data_source, identity(tables))]));
        }

        let sharding: Vec<&TableRule> = tables.iter().filter_map(|t| self.rule.table_rule(t)).collect();
        let broadcast: Vec<&String> = tables.iter().filter(|t| self.rule.is_broadcast_table(t)).collect();
        let single: Vec<&String> = tables
            .iter()
            .filter(|t| !self.rule.is_sharding_table(t) && !self.rule.is_broadcast_table(t))
            .collect();

        if sharding.is_empty() {
            return self.route_unsharded(ctx, tables, &broadcast, &single);
        }
        if let Some(table) = single.first() {
            return Err(ShardingError::UnsupportedShardingOperation(format!(
                "table '{}' has no sharding rule and cannot be combined with sharding table '{}'",
                table, sharding[0].logic_table
            )));
        }

        match ctx.kind() {
            StatementKind::Insert => self.route_insert(sharding[0], conditions, params, hint),
            // DDL reaches every data node regardless of predicates
            StatementKind::Ddl => self.route_sharding(&sharding, &broadcast, None, params, hint),
            _ => self.route_sharding(&sharding, &broadcast, conditions.sets.first(), params, hint),
        }
    }

    fn route_unsharded(
        &self,
        ctx: &StatementContext,
        tables: &[String],
        broadcast: &[&String],
        single: &[&String],
    ) -> ShardingResult<RouteContext> {
        if let Some(table) = single.first() {
            let data_source = self.rule.default_data_source().ok_or_else(|| {
                ShardingError::RoutingFailure(format!(
                    "table '{}' has no rule and no default data source is configured",
                    table
                ))
            })?;
            return Ok(RouteContext::new(vec![RouteUnit::new(data_source, identity(tables))]));
        }

        if !broadcast.is_empty() && ctx.kind() != StatementKind::Select {
            let units = self
                .rule
                .data_sources()
                .iter()
                .map(|ds| RouteUnit::new(ds.clone(), identity(tables)))
                .collect();
            return Ok(RouteContext::new(units));
        }

        // Broadcast reads and table-less statements need one data source
        let data_source = match self.rule.default_data_source() {
            Some(ds) if broadcast.is_empty() => Some(ds.to_string()),
            _ => self.rule.data_sources().iter().find(|ds| self.is_available(ds)).cloned(),
        }
        .ok_or_else(|| ShardingError::RoutingFailure("no data source is available".to_string()))?;
        Ok(RouteContext::new(vec![RouteUnit::new(data_source, identity(tables))]))
    }

    fn route_insert(
        &self,
        table_rule: &TableRule,
        conditions: &ShardingConditions,
        params: &[DataValue],
        hint: Option<&HintManager>,
    ) -> ShardingResult<RouteContext> {
        let group = [table_rule.logic_table.clone()];
        let mut row_nodes = Vec::with_capacity(conditions.sets.len());
        for set in &conditions.sets {
            let row = set.row_index.unwrap_or(row_nodes.len());
            let mut nodes = self.route_table(table_rule, &group, Some(set), params, hint)?;
            match nodes.len() {
                1 => row_nodes.extend(nodes.pop()),
                0 => {
                    return Err(ShardingError::RoutingFailure(format!(
                        "INSERT row {} into '{}' matches no data node",
                        row, table_rule.logic_table
                    )));
                }
                n => {
                    return Err(ShardingError::UnsupportedShardingOperation(format!(
                        "INSERT row {} into '{}' routes to {} data nodes; every sharding column must be given",
                        row, table_rule.logic_table, n
                    )));
                }
            }
        }

        let units = table_rule
            .data_nodes
            .iter()
            .filter(|node| row_nodes.contains(node))
            .map(|node| {
                RouteUnit::new(
                    node.data_source.clone(),
                    vec![TableMapper::new(table_rule.logic_table.clone(), node.table.clone())],
                )
            })
            .collect();
        Ok(RouteContext { units, insert_row_nodes: row_nodes })
    }

    fn route_sharding(
        &self,
        sharding: &[&TableRule],
        broadcast: &[&String],
        set: Option<&ConditionSet>,
        params: &[DataValue],
        hint: Option<&HintManager>,
    ) -> ShardingResult<RouteContext> {
        // Tables of one binding group route together
        let mut groups: Vec<Vec<&TableRule>> = Vec::new();
        for table in sharding {
            let group = self.rule.binding_group(&table.logic_table);
            let existing = groups.iter_mut().find(|g| {
                group.is_some_and(|names| names.contains(&g[0].logic_table))
            });
            match existing {
                Some(existing) => existing.push(table),
                None => groups.push(vec![table]),
            }
        }

        let mut group_routes: Vec<GroupRoute> = Vec::with_capacity(groups.len());
        for group in &groups {
            group_routes.push(self.route_group(group, set, params, hint)?);
        }

        let mut units = Vec::new();
        for data_source in self.rule.data_sources() {
            let per_group: Vec<Vec<&Vec<TableMapper>>> = group_routes
                .iter()
                .map(|route| route.iter().filter(|(ds, _)| ds == data_source).map(|(_, m)| m).collect())
                .collect();
            if per_group.iter().any(|mappers| mappers.is_empty()) {
                continue;
            }
            let mut combinations: Vec<Vec<TableMapper>> = vec![Vec::new()];
            for mappers in &per_group {
                let mut next = Vec::with_capacity(combinations.len() * mappers.len());
                for prefix in &combinations {
                    for tuple in mappers {
                        let mut combined = prefix.clone();
                        combined.extend(tuple.iter().cloned());
                        next.push(combined);
                    }
                }
                combinations = next;
            }
            for mut mappers in combinations {
                mappers.extend(broadcast.iter().map(|t| TableMapper::new(t.as_str(), t.as_str())));
                units.push(RouteUnit::new(data_source.clone(), mappers));
            }
        }
        Ok(RouteContext::new(units))
    }

    /// Route the group's primary table, then map the other members by the
    /// ordinal position of the primary's actual table within its data source
    fn route_group(
        &self,
        group: &[&TableRule],
        set: Option<&ConditionSet>,
        params: &[DataValue],
        hint: Option<&HintManager>,
    ) -> ShardingResult<GroupRoute> {
        let primary = group[0];
        let names: Vec<String> = group.iter().map(|t| t.logic_table.clone()).collect();
        let nodes = self.route_table(primary, &names, set, params, hint)?;

        let mut route = Vec::with_capacity(nodes.len());
        for node in nodes {
            let primary_tables = primary.actual_tables_in(&node.data_source);
            let ordinal = primary_tables.iter().position(|t| *t == node.table).unwrap_or(0);
            let mut mappers = vec![TableMapper::new(primary.logic_table.clone(), node.table.clone())];
            for member in &group[1..] {
                let actual = member.actual_tables_in(&node.data_source).get(ordinal).cloned().ok_or_else(|| {
                    ShardingError::RoutingFailure(format!(
                        "binding table '{}' has no actual table at position {} in '{}'",
                        member.logic_table, ordinal, node.data_source
                    ))
                })?;
                mappers.push(TableMapper::new(member.logic_table.clone(), actual));
            }
            route.push((node.data_source, mappers));
        }
        Ok(route)
    }

    /// Data nodes of one table. Conditions on any table in `condition_tables`
    /// apply, since binding tables share their sharding columns.
    fn route_table(
        &self,
        table_rule: &TableRule,
        condition_tables: &[String],
        set: Option<&ConditionSet>,
        params: &[DataValue],
        hint: Option<&HintManager>,
    ) -> ShardingResult<Vec<DataNode>> {
        let logic = &table_rule.logic_table;
        let values: Vec<ColumnShardingValue> = match set {
            Some(set) => set
                .conditions
                .iter()
                .filter(|c| condition_tables.contains(&c.table))
                .map(|c| c.to_sharding_value(params))
                .collect::<ShardingResult<_>>()?,
            None => Vec::new(),
        };

        let sources = table_rule.data_sources();
        let routed_sources = match hint.and_then(|h| h.database_values(logic)) {
            Some(hint_values) => table_rule.database_strategy.do_hint_sharding(&sources, hint_values)?,
            None => table_rule.database_strategy.do_sharding(&sources, &values)?,
        };

        let universe = table_rule.actual_table_names();
        let routed_tables = match hint.and_then(|h| h.table_values(logic)) {
            Some(hint_values) => table_rule.table_strategy.do_hint_sharding(&universe, hint_values)?,
            None => table_rule.table_strategy.do_sharding(&universe, &values)?,
        };

        Ok(table_rule
            .data_nodes
            .iter()
            .filter(|node| routed_sources.contains(&node.data_source) && routed_tables.contains(&node.table))
            .cloned()
            .collect())
    }

    fn is_available(&self, data_source: &str) -> bool {
        self.available.is_none_or(|available| available.iter().any(|ds| ds == data_source))
    }
}

fn identity(tables: &[String]) -> Vec<TableMapper> {
    tables.iter().map(|t| TableMapper::new(t.clone(), t.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlgorithmConfig, ShardingRuleConfig, StrategyConfig, TableRuleConfig};

    fn table(name: &str) -> TableRuleConfig {
        TableRuleConfig {
            logic_table: name.into(),
            actual_data_nodes: Some(format!("ds_${{0..1}}.{}_${{0..1}}", name)),
            database_strategy: Some(StrategyConfig::Standard {
                sharding_column: "user_id".into(),
                algorithm: AlgorithmConfig::Inline { expression: "ds_${user_id % 2}".into() },
            }),
            table_strategy: Some(StrategyConfig::Standard {
                sharding_column: "order_id".into(),
                algorithm: AlgorithmConfig::Inline { expression: format!("{}_${{order_id % 2}}", name) },
            }),
            key_generator: None,
        }
    }

    fn rule() -> ShardingRule {
        ShardingRule::new(ShardingRuleConfig {
            data_sources: vec!["ds_0".into(), "ds_1".into()],
            tables: vec![table("t_order"), table("t_order_item"), table("t_user")],
            binding_tables: vec![vec!["t_order".into(), "t_order_item".into()]],
            broadcast_tables: vec!["t_config".into()],
            default_data_source: Some("ds_0".into()),
            ..Default::default()
        })
        .unwrap()
    }

    fn route_sql(sql: &str, params: &[DataValue]) -> ShardingResult<RouteContext> {
        let rule = rule();
        let ctx = StatementContext::bind(sql)?;
        let conditions = ShardingConditions::extract(&rule, &ctx, None)?;
        RoutingEngine::new(&rule, None).route(&ctx, &conditions, params, None)
    }

    #[test]
    fn test_precise_route() {
        let route = route_sql("SELECT * FROM t_order WHERE user_id = ? AND order_id = ?", &[3.into(), 4.into()]).unwrap();
        assert_eq!(route.units.len(), 1);
        assert_eq!(route.units[0].data_source, "ds_1");
        assert_eq!(route.units[0].actual_table("t_order"), Some("t_order_0"));
    }

    #[test]
    fn test_broadcast_without_conditions() {
        let route = route_sql("SELECT * FROM t_order", &[]).unwrap();
        assert_eq!(route.units.len(), 4);
    }

    #[test]
    fn test_binding_tables_zip() {
        let route = route_sql(
            "SELECT * FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id WHERE o.user_id = 1",
            &[],
        )
        .unwrap();
        assert_eq!(route.units.len(), 2);
        for unit in &route.units {
            let order = unit.actual_table("t_order").unwrap();
            let item = unit.actual_table("t_order_item").unwrap();
            assert_eq!(order.chars().last(), item.chars().last());
        }
    }

    #[test]
    fn test_cartesian_without_binding() {
        let route = route_sql(
            "SELECT * FROM t_order o JOIN t_user u ON o.user_id = u.user_id WHERE o.user_id = 1",
            &[],
        )
        .unwrap();
        // o.user_id pins t_order to ds_1; t_user is unconstrained
        assert_eq!(route.units.len(), 4);
        assert!(route.units.iter().all(|u| u.data_source == "ds_1"));
    }

    #[test]
    fn test_empty_intersection_drops_units() {
        let route = route_sql("SELECT * FROM t_order WHERE order_id = 1 AND order_id = 2", &[]).unwrap();
        assert!(route.units.is_empty());
    }

    #[test]
    fn test_broadcast_and_single_tables() {
        let route = route_sql("SELECT * FROM t_config", &[]).unwrap();
        assert_eq!(route.units.len(), 1);
        let route = route_sql("DELETE FROM t_config", &[]).unwrap();
        assert_eq!(route.units.len(), 2);
        let route = route_sql("SELECT * FROM t_other", &[]).unwrap();
        assert_eq!(route.units[0].data_source, "ds_0");
        let err = route_sql("SELECT * FROM t_order o JOIN t_other x ON o.id = x.id", &[]).unwrap_err();
        assert!(matches!(err, ShardingError::UnsupportedShardingOperation(_)));
    }

    #[test]
    fn test_broadcast_joined_with_sharding_table() {
        let route = route_sql("SELECT * FROM t_order o JOIN t_config c ON o.k = c.k WHERE o.user_id = 2", &[]).unwrap();
        assert_eq!(route.units.len(), 2);
        assert_eq!(route.units[0].actual_table("t_config"), Some("t_config"));
    }

    #[test]
    fn test_insert_rows_route_individually() {
        let route = route_sql(
            "INSERT INTO t_order (user_id, order_id) VALUES (1, 1), (2, 2), (1, 3)",
            &[],
        )
        .unwrap();
        assert_eq!(route.insert_row_nodes.len(), 3);
        assert_eq!(route.insert_row_nodes[0], DataNode::new("ds_1", "t_order_1"));
        assert_eq!(route.units.len(), 2);
        let err = route_sql("INSERT INTO t_order (order_id) VALUES (1)", &[]).unwrap_err();
        assert!(matches!(err, ShardingError::UnsupportedShardingOperation(_)));
    }

    #[test]
    fn test_hint_routing() {
        let rule = rule();
        let ctx = StatementContext::bind("SELECT * FROM t_order").unwrap();
        let conditions = ShardingConditions::extract(&rule, &ctx, None).unwrap();
        let mut hint = HintManager::new();
        hint.add_database_value("t_order", 0).add_table_value("t_order", 1);
        let route = RoutingEngine::new(&rule, None).route(&ctx, &conditions, &[], Some(&hint)).unwrap();
        assert_eq!(route.units.len(), 1);
        assert_eq!(route.units[0].to_string(), "ds_0 [t_order -> t_order_1]");

        let mut forced = HintManager::new();
        forced.set_data_source("ds_1");
        let route = RoutingEngine::new(&rule, None).route(&ctx, &conditions, &[], Some(&forced)).unwrap();
        assert_eq!(route.units[0].actual_table("t_order"), Some("t_order"));
    }

    #[test]
    fn test_unavailable_data_source() {
        let rule = rule();
        let ctx = StatementContext::bind("SELECT * FROM t_order").unwrap();
        let conditions = ShardingConditions::extract(&rule, &ctx, None).unwrap();
        let available = vec!["ds_0".to_string()];
        let err = RoutingEngine::new(&rule, Some(&available)).route(&ctx, &conditions, &[], None).unwrap_err();
        assert!(matches!(err, ShardingError::RoutingFailure(_)));
    }

    #[test]
    fn test_ddl_reaches_every_node() {
        let route = route_sql("TRUNCATE TABLE t_order", &[]).unwrap();
        assert_eq!(route.units.len(), 4);
    }
}
