//! Column metadata and the per-model schema catalog.
//!
//! A [`SchemaCatalog`] is created with its model and fetches the model's
//! table metadata once. It is never refreshed behind the caller's back:
//! [`SchemaCatalog::collect_field_info`] and [`SchemaCatalog::refresh`] are
//! the only ways to re-read it.
//!
//! Related tables (those named in relationship declarations) are memoized
//! per catalog, so declaring several relationships against one table costs a
//! single metadata round trip. Nothing is shared between model instances.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ErrorCode, QueryError, QueryResult};
use crate::traits::DataStore;

/// Information about a column.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Database-specific type name.
    pub data_type: String,
    /// Whether this column is (part of) the primary key.
    pub is_primary_key: bool,
    /// Whether the column is nullable.
    #[serde(default)]
    pub nullable: bool,
}

impl ColumnInfo {
    /// Create a non-key, non-nullable column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_primary_key: false,
            nullable: false,
        }
    }

    /// Flag as primary key.
    pub fn primary(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    /// Flag as nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Ordered column metadata for one table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableSchema {
    table: String,
    columns: IndexMap<String, ColumnInfo>,
}

impl TableSchema {
    /// Build from columns in table order.
    pub fn new(table: impl Into<String>, columns: impl IntoIterator<Item = ColumnInfo>) -> Self {
        Self {
            table: table.into(),
            columns: columns.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column name -> metadata, in table order.
    pub fn columns(&self) -> &IndexMap<String, ColumnInfo> {
        &self.columns
    }

    /// Column names in table order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Check whether the table has a column.
    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Look up a column.
    pub fn get(&self, column: &str) -> Option<&ColumnInfo> {
        self.columns.get(column)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check whether the table has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The first column in table order flagged as primary key.
    ///
    /// Composite keys resolve to their first column. A table without any
    /// flagged column is an error.
    pub fn primary_key(&self) -> QueryResult<&str> {
        self.columns
            .values()
            .find(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .ok_or_else(|| QueryError::primary_key_missing(&self.table))
    }
}

/// Fetch metadata for `table` from the store.
///
/// Store failures are reported as `SchemaIntrospection` with the store error
/// kept as source; a missing table stays `TableNotFound`.
pub async fn fetch_schema(store: &dyn DataStore, table: &str) -> QueryResult<TableSchema> {
    let columns = store.columns(table).await.map_err(|err| match err.code {
        ErrorCode::TableNotFound | ErrorCode::SchemaIntrospection => err,
        _ => QueryError::schema_introspection(table, err.message.clone()).with_source(err),
    })?;

    debug!(table = %table, columns = columns.len(), "collected field info");
    Ok(TableSchema::new(table, columns))
}

/// Cached column metadata for one model instance.
pub struct SchemaCatalog {
    store: Arc<dyn DataStore>,
    schema: TableSchema,
    related: HashMap<String, TableSchema>,
}

impl SchemaCatalog {
    /// Create a catalog for `table`, fetching its metadata immediately.
    pub async fn load(store: Arc<dyn DataStore>, table: &str) -> QueryResult<Self> {
        let schema = fetch_schema(store.as_ref(), table).await?;
        Ok(Self {
            store,
            schema,
            related: HashMap::new(),
        })
    }

    /// Name of the catalog's own table.
    pub fn table(&self) -> &str {
        self.schema.table()
    }

    /// The cached schema of the catalog's own table.
    pub fn field_info(&self) -> &TableSchema {
        &self.schema
    }

    /// The cached primary key of the catalog's own table.
    pub fn primary_key(&self) -> QueryResult<&str> {
        self.schema.primary_key()
    }

    /// Re-query the store for the own table's columns and rebuild the cache.
    pub async fn collect_field_info(&mut self) -> QueryResult<&TableSchema> {
        let table = self.schema.table().to_string();
        self.schema = fetch_schema(self.store.as_ref(), &table).await?;
        Ok(&self.schema)
    }

    /// Re-collect metadata for `table` (the own table when `None`) and return it.
    ///
    /// Re-collecting a related table also refreshes its memoized entry.
    pub async fn get_field_info(&mut self, table: Option<&str>) -> QueryResult<TableSchema> {
        match table {
            None => self.collect_field_info().await.cloned(),
            Some(t) if t == self.schema.table() => self.collect_field_info().await.cloned(),
            Some(t) => {
                let schema = fetch_schema(self.store.as_ref(), t).await?;
                self.related.insert(t.to_string(), schema.clone());
                Ok(schema)
            }
        }
    }

    /// Re-collect metadata for `table` and return its primary key.
    pub async fn get_primary_key(&mut self, table: Option<&str>) -> QueryResult<String> {
        let schema = self.get_field_info(table).await?;
        schema.primary_key().map(str::to_string)
    }

    /// Metadata for a related table, fetched on first use and then memoized.
    pub async fn related_schema(&mut self, table: &str) -> QueryResult<&TableSchema> {
        if table == self.schema.table() {
            return Ok(&self.schema);
        }
        if !self.related.contains_key(table) {
            let schema = fetch_schema(self.store.as_ref(), table).await?;
            self.related.insert(table.to_string(), schema);
        }
        self.related
            .get(table)
            .ok_or_else(|| QueryError::internal(format!("schema for '{}' was not memoized", table)))
    }

    /// Drop every memoized related schema and re-collect the own table.
    pub async fn refresh(&mut self) -> QueryResult<()> {
        self.related.clear();
        self.collect_field_info().await?;
        Ok(())
    }
}

impl std::fmt::Debug for SchemaCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCatalog")
            .field("table", &self.schema.table())
            .field("columns", &self.schema.len())
            .field("related", &self.related.keys().collect::<Vec<_>>())
            .finish()
    }
}
