//! Join and projection composition for active belongs-to relationships.

use tracing::debug;

use super::definition::{collision_name, BelongsTo};
use crate::error::QueryResult;
use crate::filter::Filter;
use crate::hooks::{Hook, HookEvent, ReadContext};
use crate::query::{Join, JoinKind, Projection, SelectQuery};
use crate::schema::TableSchema;
use crate::traits::BoxFuture;

/// Before-read hook joining every active belongs-to relationship into the
/// primary query.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryComposer;

impl QueryComposer {
    /// Add joins, projections and related-side filters to `query`.
    ///
    /// Does nothing when no belongs-to relationship is active.
    pub fn compose(ctx: &ReadContext<'_>, query: &mut SelectQuery) {
        let mut active = ctx.registry.active_belongs_to().peekable();
        if active.peek().is_none() {
            return;
        }

        let table = ctx.schema.table();
        if query.projections.is_empty() {
            query
                .projections
                .extend(ctx.schema.names().map(|column| Projection::qualified(table, column)));
        }

        for (relation, columns) in active {
            query.joins.push(Join {
                kind: JoinKind::Left,
                table: relation.related_table.clone(),
                target: ctx.store.prefix_table(&relation.related_table),
                alias: relation.alias.clone(),
                left: format!("{}.{}", relation.alias, relation.related_primary_key),
                right: format!("{}.{}", table, relation.foreign_key),
            });

            let before = query.projections.len();
            match columns {
                None => project_all(ctx.schema, relation, &mut query.projections),
                Some(columns) => project_listed(ctx.schema, relation, columns, &mut query.projections),
            }

            if let Some(conditions) = ctx.registry.relation_filter(&relation.alias) {
                query.and_where(Filter::from_conditions(Some(&relation.alias), conditions));
            }

            debug!(
                table = %table,
                alias = %relation.alias,
                columns = query.projections.len() - before,
                "joined belongs-to relationship"
            );
        }
    }
}

/// Every related column except its primary key.
fn project_all(own: &TableSchema, relation: &BelongsTo, out: &mut Vec<Projection>) {
    for column in relation.related_schema.names() {
        if column == relation.related_primary_key {
            continue;
        }
        out.push(related_column(own, &relation.alias, column));
    }
}

/// Only the requested columns. `"col AS name"` entries keep their own name.
fn project_listed(own: &TableSchema, relation: &BelongsTo, columns: &[String], out: &mut Vec<Projection>) {
    for entry in columns {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match split_alias(entry) {
            Some((column, name)) => {
                let projection = if column.contains('.') {
                    Projection {
                        table: None,
                        column: column.to_string(),
                        alias: None,
                    }
                } else {
                    Projection::qualified(&relation.alias, column)
                };
                out.push(projection.with_alias(name));
            }
            None => out.push(related_column(own, &relation.alias, entry)),
        }
    }
}

/// Qualify a joined column, renaming it when its bare name is also a column of
/// the parent table.
fn related_column(own: &TableSchema, alias: &str, column: &str) -> Projection {
    let projection = Projection::qualified(alias, column);
    if own.contains(column) {
        projection.with_alias(collision_name(alias, column))
    } else {
        projection
    }
}

fn split_alias(entry: &str) -> Option<(&str, &str)> {
    let idx = entry.to_ascii_lowercase().find(" as ")?;
    let column = entry[..idx].trim();
    let name = entry[idx + 4..].trim();
    (!column.is_empty() && !name.is_empty()).then_some((column, name))
}

impl Hook for QueryComposer {
    fn invoke<'a>(&'a self, event: &'a mut HookEvent<'_>) -> BoxFuture<'a, QueryResult<()>> {
        Box::pin(async move {
            if let HookEvent::BeforeFind { ctx, query } = event {
                Self::compose(ctx, query);
            }
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "QueryComposer"
    }
}
