//! Relationship declarations and per-call activation state.
//!
//! Declarations live as long as the registry. Activation (`with`) and
//! related-side filters (`where_relation`) apply to the next read only and
//! are cleared by [`RelationshipRegistry::reset`].

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::definition::{default_foreign_key, BelongsTo, HasMany, RelationSpec};
use crate::error::{QueryError, QueryResult};
use crate::filter::Conditions;
use crate::schema::SchemaCatalog;
use crate::types::OrderBy;

/// Alias -> optional explicit column list. Presence means active.
pub type RelationshipSelection = IndexMap<String, Option<Vec<String>>>;

/// Alias -> conditions applied to the related side.
pub type WhereRelationFilter = IndexMap<String, Conditions>;

/// Declared relationships of one model plus their activation state.
#[derive(Debug, Clone, Default)]
pub struct RelationshipRegistry {
    table: String,
    belongs_to: IndexMap<String, BelongsTo>,
    has_many: IndexMap<String, HasMany>,
    selection: RelationshipSelection,
    where_relations: WhereRelationFilter,
}

impl RelationshipRegistry {
    /// An empty registry for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Declare a belongs-to relationship.
    ///
    /// The related table's metadata is resolved immediately; a missing table
    /// or one without a primary key fails here rather than at read time.
    pub async fn belongs_to(
        &mut self,
        catalog: &mut SchemaCatalog,
        related_table: &str,
        foreign_key: Option<&str>,
        alias: Option<&str>,
    ) -> QueryResult<&BelongsTo> {
        let related = catalog.related_schema(related_table).await?.clone();
        let related_primary_key = related.primary_key()?.to_string();
        let foreign_key = foreign_key.map_or_else(|| default_foreign_key(related_table), str::to_string);
        let alias = alias.unwrap_or(related_table).to_string();

        if !catalog.field_info().contains(&foreign_key) {
            warn!(table = %self.table, foreign_key = %foreign_key, "belongs-to foreign key is not a column");
        }

        let relation = BelongsTo {
            related_table: related_table.to_string(),
            related_primary_key,
            foreign_key,
            alias: alias.clone(),
            related_schema: related,
        };
        debug!(table = %self.table, alias = %alias, related = %related_table, "declared belongs-to");

        self.belongs_to.insert(alias.clone(), relation);
        self.belongs_to
            .get(&alias)
            .ok_or_else(|| QueryError::internal("belongs-to declaration was not stored"))
    }

    /// Declare a has-many relationship.
    pub async fn has_many(
        &mut self,
        catalog: &mut SchemaCatalog,
        related_table: &str,
        foreign_key: Option<&str>,
        alias: Option<&str>,
        order_by: OrderBy,
    ) -> QueryResult<&HasMany> {
        let related = catalog.related_schema(related_table).await?.clone();
        let related_primary_key = related.primary_key()?.to_string();
        let foreign_key = foreign_key.map_or_else(|| default_foreign_key(&self.table), str::to_string);
        let alias = alias.unwrap_or(related_table).to_string();

        if !related.contains(&foreign_key) {
            warn!(related = %related_table, foreign_key = %foreign_key, "has-many foreign key is not a column");
        }

        let relation = HasMany {
            related_table: related_table.to_string(),
            related_primary_key,
            foreign_key,
            alias: alias.clone(),
            order_by,
        };
        debug!(table = %self.table, alias = %alias, related = %related_table, "declared has-many");

        self.has_many.insert(alias.clone(), relation);
        self.has_many
            .get(&alias)
            .ok_or_else(|| QueryError::internal("has-many declaration was not stored"))
    }

    /// Check whether any relationship is declared under `alias`.
    pub fn is_declared(&self, alias: &str) -> bool {
        self.belongs_to.contains_key(alias) || self.has_many.contains_key(alias)
    }

    fn ensure_declared(&self, alias: &str) -> QueryResult<()> {
        if self.is_declared(alias) {
            return Ok(());
        }
        let mut err = QueryError::invalid_relation(&self.table, alias);
        let declared: Vec<_> = self.belongs_to.keys().chain(self.has_many.keys()).cloned().collect();
        if !declared.is_empty() {
            err = err.with_suggestion(format!("Declared aliases: {}", declared.join(", ")));
        }
        Err(err)
    }

    /// Activate `alias` for the next read, optionally narrowing the joined
    /// columns.
    ///
    /// A column list with no non-blank entry counts as no list: every related
    /// column except the primary key is joined.
    pub fn with(&mut self, alias: &str, columns: Option<Vec<String>>) -> QueryResult<()> {
        self.ensure_declared(alias)?;
        let columns = columns
            .map(|cols| {
                cols.into_iter()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|cols| !cols.is_empty());
        self.selection.insert(alias.to_string(), columns);
        Ok(())
    }

    /// Filter the related side of `alias` on the next read.
    ///
    /// Conditions for the same alias accumulate rather than replace each
    /// other, so chained calls narrow the related rows further. A column
    /// given twice keeps its latest value.
    pub fn where_relation(&mut self, alias: &str, conditions: Conditions) -> QueryResult<()> {
        self.ensure_declared(alias)?;
        self.where_relations
            .entry(alias.to_string())
            .or_default()
            .extend(conditions);
        Ok(())
    }

    /// Check whether `alias` is active.
    pub fn is_active(&self, alias: &str) -> bool {
        self.selection.contains_key(alias)
    }

    /// Check whether any relationship is active.
    pub fn has_active(&self) -> bool {
        !self.selection.is_empty()
    }

    /// Active belongs-to relationships with their explicit column lists, in
    /// activation order.
    pub fn active_belongs_to(&self) -> impl Iterator<Item = (&BelongsTo, Option<&[String]>)> {
        self.selection.iter().filter_map(|(alias, columns)| {
            self.belongs_to
                .get(alias)
                .map(|relation| (relation, columns.as_deref()))
        })
    }

    /// Active has-many relationships, in activation order.
    pub fn active_has_many(&self) -> impl Iterator<Item = &HasMany> {
        self.selection
            .keys()
            .filter_map(|alias| self.has_many.get(alias))
    }

    /// Related-side conditions registered for `alias`.
    pub fn relation_filter(&self, alias: &str) -> Option<&Conditions> {
        self.where_relations.get(alias)
    }

    /// The current selection.
    pub fn selection(&self) -> &RelationshipSelection {
        &self.selection
    }

    /// Look up a declaration. A belongs-to wins when both kinds share the alias.
    pub fn get(&self, alias: &str) -> Option<RelationSpec> {
        self.belongs_to
            .get(alias)
            .cloned()
            .map(RelationSpec::from)
            .or_else(|| self.has_many.get(alias).cloned().map(RelationSpec::from))
    }

    /// Declared belongs-to relationships by alias.
    pub fn belongs_to_relations(&self) -> &IndexMap<String, BelongsTo> {
        &self.belongs_to
    }

    /// Declared has-many relationships by alias.
    pub fn has_many_relations(&self) -> &IndexMap<String, HasMany> {
        &self.has_many
    }

    /// Clear activation and related-side filters.
    pub fn reset(&mut self) {
        if self.has_active() || !self.where_relations.is_empty() {
            debug!(table = %self.table, "reset relationship activation");
        }
        self.selection.clear();
        self.where_relations.clear();
    }
}
