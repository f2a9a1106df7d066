//! Secondary loading for active has-many relationships.
//!
//! For each active has-many alias the assembler issues one query against the
//! related table, groups the returned rows by foreign key and attaches each
//! group to its parent row under the alias. Parent rows without children get
//! an empty list. No other parent field is touched.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use tracing::debug;

use super::definition::HasMany;
use crate::error::QueryResult;
use crate::filter::{Filter, FilterValue};
use crate::hooks::{Hook, HookEvent, ReadContext};
use crate::query::SelectQuery;
use crate::row::{row_to_value, Row};
use crate::traits::BoxFuture;

/// After-read hook attaching has-many children to parent rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAssembler;

impl ResultAssembler {
    /// Attach children for every active has-many relationship.
    pub async fn assemble(ctx: &ReadContext<'_>, rows: &mut [Row]) -> QueryResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        for relation in ctx.registry.active_has_many() {
            Self::attach(ctx, relation, rows).await?;
        }
        Ok(())
    }

    async fn attach(ctx: &ReadContext<'_>, relation: &HasMany, rows: &mut [Row]) -> QueryResult<()> {
        let values = link_values(rows, ctx.primary_key);

        let mut groups: IndexMap<String, Vec<Value>> = IndexMap::new();
        if !values.is_empty() {
            let query = Self::secondary_query(ctx, relation, values);
            let children = ctx.store.select(&query).await?;
            debug!(
                table = %ctx.schema.table(),
                alias = %relation.alias,
                children = children.len(),
                "loaded has-many rows"
            );

            for child in children {
                let Some(key) = child.get(&relation.foreign_key).and_then(link_key) else {
                    continue;
                };
                groups.entry(key).or_default().push(row_to_value(child));
            }
        }

        for row in rows.iter_mut() {
            let group = row
                .get(ctx.primary_key)
                .and_then(link_key)
                .and_then(|key| groups.get(&key))
                .cloned()
                .unwrap_or_default();
            row.insert(relation.alias.clone(), Value::Array(group));
        }
        Ok(())
    }

    /// `SELECT * FROM related WHERE fk IN (..)` plus ordering and any
    /// related-side filter for the alias.
    pub fn secondary_query(ctx: &ReadContext<'_>, relation: &HasMany, values: Vec<FilterValue>) -> SelectQuery {
        let mut query = SelectQuery::new(&relation.related_table)
            .from_target(ctx.store.prefix_table(&relation.related_table));
        query.and_where(Filter::In(relation.foreign_key.clone(), values));
        if let Some(conditions) = ctx.registry.relation_filter(&relation.alias) {
            query.and_where(Filter::from_conditions(Some(&relation.related_table), conditions));
        }
        query.order_by(relation.order_by.clone());
        query
    }
}

/// Distinct non-empty values of `column`, in first-seen order.
fn link_values(rows: &[Row], column: &str) -> Vec<FilterValue> {
    let mut seen = IndexSet::new();
    let mut values = Vec::new();
    for value in rows.iter().filter_map(|row| row.get(column)) {
        if let Some(key) = link_key(value) {
            if seen.insert(key) {
                values.push(FilterValue::from_json(value));
            }
        }
    }
    values
}

/// Normalized grouping key; `2` and `"2"` link to each other.
///
/// Null, empty strings and composite values never link.
fn link_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && n.as_i64().is_none() && n.as_u64().is_none() => {
                Some(format!("{}", f as i64))
            }
            _ => Some(n.to_string()),
        },
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

impl Hook for ResultAssembler {
    fn invoke<'a>(&'a self, event: &'a mut HookEvent<'_>) -> BoxFuture<'a, QueryResult<()>> {
        Box::pin(async move {
            if let HookEvent::AfterFind { ctx, rows } = event {
                Self::assemble(ctx, rows).await?;
            }
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "ResultAssembler"
    }
}
