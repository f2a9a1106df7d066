//! The schema-driven model.
//!
//! A [`DynaModel`] is bound to one table. It owns a [`SchemaCatalog`] for that
//! table, a [`FieldGuard`] for writes, a [`RelationshipRegistry`] and the
//! [`LifecycleHooks`] that run relationship composition around each read.
//!
//! ```rust,ignore
//! let mut books = DynaModel::new(store.clone(), "books").await?;
//! books.belongs_to("authors", None, None).await?;
//!
//! let book = books.with("authors")?.find(5).await?;
//! // {id: 5, title: "X", author_id: 2, name: "N2"}
//! ```
//!
//! Everything set between two reads (`with`, `where_relation`, `order_by`,
//! `as_objects`, `with_deleted`, ..) applies to the next read only.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::error::{QueryError, QueryResult};
use crate::filter::{Conditions, Filter, FilterValue};
use crate::guard::FieldGuard;
use crate::hooks::{HookEvent, HookPoint, LifecycleHooks, ReadContext, SharedHook};
use crate::query::{DeleteQuery, InsertQuery, SelectQuery, UpdateQuery};
use crate::relations::{QueryComposer, RelationshipRegistry, ResultAssembler};
use crate::row::{FindResult, Record, ReturnType, Row};
use crate::schema::{SchemaCatalog, TableSchema};
use crate::traits::DataStore;
use crate::types::{OrderBy, OrderByField};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Which soft-deleted rows a read sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DeletedScope {
    #[default]
    Exclude,
    Include,
    Only,
}

/// Options that apply to the next read only.
#[derive(Debug, Clone, Default)]
struct PendingRead {
    return_type: Option<ReturnType>,
    order_by: OrderBy,
    deleted: DeletedScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cardinality {
    One,
    Many,
}

/// A model bound to one table.
pub struct DynaModel {
    store: Arc<dyn DataStore>,
    catalog: SchemaCatalog,
    guard: FieldGuard,
    registry: RelationshipRegistry,
    hooks: LifecycleHooks,
    composer: SharedHook,
    assembler: SharedHook,
    config: ModelConfig,
    primary_key: String,
    pending: PendingRead,
}

impl DynaModel {
    /// Build a model for `table` with default options.
    pub async fn new(store: Arc<dyn DataStore>, table: &str) -> QueryResult<Self> {
        Self::with_config(store, table, ModelConfig::default()).await
    }

    /// Build a model for `table`.
    ///
    /// Fails with `TableNotFound` when the table does not exist, and with
    /// `PrimaryKeyMissing` when no key is configured and none is flagged.
    pub async fn with_config(store: Arc<dyn DataStore>, table: &str, config: ModelConfig) -> QueryResult<Self> {
        if !store.table_exists(table).await? {
            return Err(QueryError::table_not_found(table));
        }

        let catalog = SchemaCatalog::load(store.clone(), table).await?;
        config.validate(catalog.field_info())?;

        let primary_key = match config.primary_key {
            Some(ref pk) => pk.clone(),
            None => catalog.primary_key()?.to_string(),
        };

        let mut guard = FieldGuard::new().protected(config.protected_fields.iter().cloned());
        if let Some(ref allowed) = config.allowed_fields {
            guard.set_allowed_fields(allowed.iter().cloned());
        }

        info!(table = %table, primary_key = %primary_key, columns = catalog.field_info().len(), "model ready");

        Ok(Self {
            store,
            catalog,
            guard,
            registry: RelationshipRegistry::new(table),
            hooks: LifecycleHooks::new(),
            composer: Arc::new(QueryComposer),
            assembler: Arc::new(ResultAssembler),
            config,
            primary_key,
            pending: PendingRead::default(),
        })
    }

    // ============== Schema ==============

    /// Table name.
    pub fn table(&self) -> &str {
        self.catalog.table()
    }

    /// Primary key column.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// The cached schema of the model's table.
    pub fn field_info(&self) -> &TableSchema {
        self.catalog.field_info()
    }

    /// Re-collect metadata for `table` (the model's own when `None`).
    pub async fn get_field_info(&mut self, table: Option<&str>) -> QueryResult<TableSchema> {
        self.catalog.get_field_info(table).await
    }

    /// Re-collect metadata for `table` and return its primary key.
    pub async fn get_primary_key(&mut self, table: Option<&str>) -> QueryResult<String> {
        self.catalog.get_primary_key(table).await
    }

    /// Drop all cached metadata and fetch the own table again.
    pub async fn refresh_schema(&mut self) -> QueryResult<()> {
        self.catalog.refresh().await
    }

    /// Current options.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// The store this model reads from and writes to.
    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    // ============== Options ==============

    /// Use `column` as primary key.
    pub fn set_primary_key(&mut self, column: &str) -> QueryResult<&mut Self> {
        if !self.catalog.field_info().contains(column) {
            return Err(QueryError::invalid_configuration(format!(
                "primary key '{}' is not a column of '{}'",
                column,
                self.table()
            ))
            .with_table(self.table())
            .with_field(column));
        }
        self.primary_key = column.to_string();
        self.config.primary_key = Some(column.to_string());
        Ok(self)
    }

    /// Restrict writable columns.
    pub fn set_allowed_fields<I, S>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.guard.set_allowed_fields(fields.iter().cloned());
        self.config.allowed_fields = Some(fields);
        self
    }

    /// Protect columns from writes.
    pub fn set_protected_fields<I, S>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.guard.set_protected_fields(fields.iter().cloned());
        self.config.protected_fields = fields;
        self
    }

    /// Turn soft deletes on or off, optionally moving the marker column.
    pub fn use_soft_delete(&mut self, enabled: bool, field: Option<&str>) -> QueryResult<&mut Self> {
        let field = field.unwrap_or(self.config.deleted_field.as_str()).to_string();
        if enabled && !self.catalog.field_info().contains(&field) {
            return Err(QueryError::invalid_configuration(format!(
                "deleted_field '{}' is not a column of '{}'",
                field,
                self.table()
            ))
            .with_table(self.table())
            .with_field(field));
        }
        self.config.use_soft_deletes = enabled;
        self.config.deleted_field = field;
        Ok(self)
    }

    /// Turn timestamps on or off, optionally moving the columns.
    pub fn use_timestamps(&mut self, enabled: bool, created: Option<&str>, updated: Option<&str>) -> QueryResult<&mut Self> {
        let mut config = self.config.clone();
        config.use_timestamps = enabled;
        if let Some(created) = created {
            config.created_field = created.to_string();
        }
        if let Some(updated) = updated {
            config.updated_field = updated.to_string();
        }
        config.validate(self.catalog.field_info())?;
        self.config = config;
        Ok(self)
    }

    /// Write guard in use.
    pub fn guard(&self) -> &FieldGuard {
        &self.guard
    }

    /// Filter a write payload the way inserts and updates do before the
    /// allow-list: unknown columns, then protected columns.
    pub fn do_protect_fields(&self, data: Row) -> Row {
        self.guard.do_protect_fields(self.catalog.field_info(), data)
    }

    // ============== Relationships ==============

    /// Declare that this table references `related_table`.
    ///
    /// Defaults: foreign key `singular(related_table)_id`, alias `related_table`.
    pub async fn belongs_to(
        &mut self,
        related_table: &str,
        foreign_key: Option<&str>,
        alias: Option<&str>,
    ) -> QueryResult<&mut Self> {
        self.registry
            .belongs_to(&mut self.catalog, related_table, foreign_key, alias)
            .await?;
        Ok(self)
    }

    /// Declare that `related_table` references this table.
    ///
    /// Defaults: foreign key `singular(own_table)_id`, alias `related_table`.
    pub async fn has_many(
        &mut self,
        related_table: &str,
        foreign_key: Option<&str>,
        alias: Option<&str>,
        order_by: OrderBy,
    ) -> QueryResult<&mut Self> {
        self.registry
            .has_many(&mut self.catalog, related_table, foreign_key, alias, order_by)
            .await?;
        Ok(self)
    }

    /// Include relationship `alias` in the next read.
    pub fn with(&mut self, alias: &str) -> QueryResult<&mut Self> {
        self.activate(alias, None)
    }

    /// Include relationship `alias` in the next read, joining only `columns`.
    ///
    /// Entries may rename with `"column AS name"`.
    pub fn with_columns<I, S>(&mut self, alias: &str, columns: I) -> QueryResult<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.activate(alias, Some(columns.into_iter().map(Into::into).collect()))
    }

    fn activate(&mut self, alias: &str, columns: Option<Vec<String>>) -> QueryResult<&mut Self> {
        self.registry.with(alias, columns)?;
        self.hooks.add(HookPoint::BeforeFind, self.composer.clone());
        self.hooks.add(HookPoint::AfterFind, self.assembler.clone());
        Ok(self)
    }

    /// Filter the related side of `alias` on the next read.
    pub fn where_relation(&mut self, alias: &str, conditions: Conditions) -> QueryResult<&mut Self> {
        self.registry.where_relation(alias, conditions)?;
        Ok(self)
    }

    /// Deactivate every relationship and remove the relationship hooks.
    pub fn reset_relationship(&mut self) {
        self.registry.reset();
        self.hooks.remove(HookPoint::BeforeFind, &self.composer);
        self.hooks.remove(HookPoint::AfterFind, &self.assembler);
    }

    /// Declared relationships and their activation state.
    pub fn relationships(&self) -> &RelationshipRegistry {
        &self.registry
    }

    /// Registered hooks.
    pub fn hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }

    /// Register an additional hook. It stays until removed.
    pub fn add_hook(&mut self, point: HookPoint, hook: SharedHook) -> bool {
        self.hooks.add(point, hook)
    }

    /// Remove a previously registered hook.
    pub fn remove_hook(&mut self, point: HookPoint, hook: &SharedHook) -> bool {
        self.hooks.remove(point, hook)
    }

    // ============== Per-read options ==============

    /// Return associative rows from the next read.
    pub fn as_rows(&mut self) -> &mut Self {
        self.pending.return_type = Some(ReturnType::Array);
        self
    }

    /// Return object records from the next read.
    pub fn as_objects(&mut self) -> &mut Self {
        self.pending.return_type = Some(ReturnType::Object);
        self
    }

    /// Order the next read by `(column, direction)` pairs.
    pub fn order_by<C, D>(&mut self, pairs: impl IntoIterator<Item = (C, D)>) -> QueryResult<&mut Self>
    where
        C: Into<String>,
        D: AsRef<str>,
    {
        let order = OrderBy::from_pairs(pairs)?;
        for field in order.fields() {
            self.pending.order_by.push(field.clone());
        }
        Ok(self)
    }

    /// Include soft-deleted rows in the next read.
    pub fn with_deleted(&mut self) -> &mut Self {
        self.pending.deleted = DeletedScope::Include;
        self
    }

    /// Return only soft-deleted rows from the next read.
    pub fn only_deleted(&mut self) -> &mut Self {
        self.pending.deleted = DeletedScope::Only;
        self
    }

    // ============== Reads ==============

    /// The row with primary key `id`.
    pub async fn find(&mut self, id: impl Into<FilterValue>) -> QueryResult<FindResult> {
        let filter = Filter::Equals(self.qualify(&self.primary_key), id.into());
        self.read(filter, 1, 0, Cardinality::One).await
    }

    /// The row with primary key `id`, or `RecordNotFound`.
    pub async fn find_or_fail(&mut self, id: impl Into<FilterValue>) -> QueryResult<Record> {
        self.find(id)
            .await?
            .into_one()
            .ok_or_else(|| QueryError::not_found(self.table()))
    }

    /// Rows whose primary key is in `ids`.
    pub async fn find_many<I, V>(&mut self, ids: I) -> QueryResult<FindResult>
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        let filter = Filter::In(self.qualify(&self.primary_key), ids.into_iter().map(Into::into).collect());
        self.read(filter, 0, 0, Cardinality::Many).await
    }

    /// Every row; `limit` 0 means unbounded.
    pub async fn find_all(&mut self, limit: u64, offset: u64) -> QueryResult<FindResult> {
        self.read(Filter::None, limit, offset, Cardinality::Many).await
    }

    /// Rows matching `conditions` (scalars compare equal, lists by membership).
    pub async fn find_by(&mut self, conditions: Conditions) -> QueryResult<FindResult> {
        let filter = Filter::from_conditions(Some(self.table()), &conditions);
        self.read(filter, 0, 0, Cardinality::Many).await
    }

    /// The first row matching `conditions`.
    pub async fn find_one_by(&mut self, conditions: Conditions) -> QueryResult<FindResult> {
        let filter = Filter::from_conditions(Some(self.table()), &conditions);
        self.read(filter, 1, 0, Cardinality::One).await
    }

    /// The first row by the pending order, or by primary key.
    pub async fn first(&mut self) -> QueryResult<FindResult> {
        if self.pending.order_by.is_empty() {
            self.pending.order_by = OrderBy::from(OrderByField::asc(self.primary_key.clone()));
        }
        self.read(Filter::None, 1, 0, Cardinality::One).await
    }

    /// The last row by the pending order, or by primary key.
    pub async fn last(&mut self) -> QueryResult<FindResult> {
        let order = if self.pending.order_by.is_empty() {
            OrderBy::from(OrderByField::asc(self.primary_key.clone()))
        } else {
            std::mem::take(&mut self.pending.order_by)
        };
        self.pending.order_by = order.reversed();
        self.read(Filter::None, 1, 0, Cardinality::One).await
    }

    /// Run one read through the hook pipeline.
    ///
    /// Per-read options and relationship activation are cleared whether the
    /// read succeeds or not.
    async fn read(&mut self, filter: Filter, limit: u64, offset: u64, cardinality: Cardinality) -> QueryResult<FindResult> {
        let pending = std::mem::take(&mut self.pending);
        let result = self.execute_read(filter, limit, offset, &pending).await;
        self.reset_relationship();
        let rows = result?;

        let shape = pending.return_type.unwrap_or(self.config.return_type);
        let mut records = rows.into_iter().map(|row| Record::from_row(row, shape));
        Ok(match cardinality {
            Cardinality::One => FindResult::One(records.next()),
            Cardinality::Many => FindResult::Many(records.collect()),
        })
    }

    async fn execute_read(&self, filter: Filter, limit: u64, offset: u64, pending: &PendingRead) -> QueryResult<Vec<Row>> {
        let table = self.table();
        let mut query = SelectQuery::new(table).from_target(self.store.prefix_table(table));
        query.and_where(filter);

        if self.config.use_soft_deletes {
            let column = self.qualify(&self.config.deleted_field);
            match pending.deleted {
                DeletedScope::Exclude => {
                    query.and_where(Filter::IsNull(column));
                }
                DeletedScope::Only => {
                    query.and_where(Filter::IsNotNull(column));
                }
                DeletedScope::Include => {}
            }
        } else if pending.deleted != DeletedScope::Exclude {
            warn!(table = %table, "deleted-row scope ignored, soft deletes are off");
        }

        query.order_by(OrderBy::from_fields(
            pending
                .order_by
                .fields()
                .iter()
                .map(|f| OrderByField::new(self.qualify(&f.column), f.order)),
        ));
        query.limit(limit, offset);

        let ctx = ReadContext {
            store: self.store.as_ref(),
            schema: self.catalog.field_info(),
            primary_key: &self.primary_key,
            registry: &self.registry,
        };

        self.hooks
            .run(&mut HookEvent::BeforeFind { ctx, query: &mut query })
            .await?;
        let mut rows = self.store.select(&query).await?;
        self.hooks
            .run(&mut HookEvent::AfterFind { ctx, rows: &mut rows })
            .await?;

        debug!(table = %table, rows = rows.len(), joins = query.joins.len(), "read complete");
        Ok(rows)
    }

    /// Qualify own columns with the table name; anything else is left alone.
    fn qualify(&self, column: &str) -> String {
        if !column.contains('.') && self.catalog.field_info().contains(column) {
            format!("{}.{}", self.table(), column)
        } else {
            column.to_string()
        }
    }

    // ============== Writes ==============

    fn prepare_write(&self, data: Row) -> Row {
        self.guard.guard(self.catalog.field_info(), data)
    }

    fn now() -> Value {
        Value::String(Utc::now().format(TIMESTAMP_FORMAT).to_string())
    }

    /// Insert a row, returning its generated key.
    pub async fn insert(&mut self, data: Row) -> QueryResult<Option<Value>> {
        let mut values = self.prepare_write(data);
        if self.config.use_timestamps {
            let now = Self::now();
            values.insert(self.config.created_field.clone(), now.clone());
            values.insert(self.config.updated_field.clone(), now);
        }

        let query = InsertQuery {
            table: self.table().to_string(),
            values,
        };
        let key = self.store.insert(&query).await?;
        debug!(table = %self.table(), key = ?key, "inserted row");
        Ok(key)
    }

    /// Update the row with primary key `id`.
    pub async fn update(&mut self, id: impl Into<FilterValue>, data: Row) -> QueryResult<u64> {
        let filter = Filter::Equals(self.primary_key.clone(), id.into());
        self.run_update(data, filter, None).await
    }

    /// Update rows matching `conditions`; `limit` 0 means unbounded.
    pub async fn update_by(&mut self, data: Row, conditions: Conditions, limit: u64) -> QueryResult<u64> {
        if conditions.is_empty() {
            return Err(QueryError::missing_conditions(self.table(), "update"));
        }
        let filter = Filter::from_conditions(None, &conditions);
        self.run_update(data, filter, (limit > 0).then_some(limit)).await
    }

    async fn run_update(&self, data: Row, filter: Filter, limit: Option<u64>) -> QueryResult<u64> {
        let mut set = self.prepare_write(data);
        if set.is_empty() {
            debug!(table = %self.table(), "nothing left to update after guarding");
            return Ok(0);
        }
        if self.config.use_timestamps {
            set.insert(self.config.updated_field.clone(), Self::now());
        }

        let query = UpdateQuery {
            table: self.table().to_string(),
            set,
            filter,
            limit,
        };
        self.store.update(&query).await
    }

    /// Delete the row with primary key `id`.
    ///
    /// With soft deletes on the row is only marked unless `purge` is set.
    pub async fn delete(&mut self, id: impl Into<FilterValue>, purge: bool) -> QueryResult<u64> {
        let filter = Filter::Equals(self.primary_key.clone(), id.into());
        self.run_delete(filter, purge).await
    }

    /// Delete rows matching `conditions`.
    pub async fn delete_by(&mut self, conditions: Conditions, purge: bool) -> QueryResult<u64> {
        if conditions.is_empty() {
            return Err(QueryError::missing_conditions(self.table(), "delete"));
        }
        let filter = Filter::from_conditions(None, &conditions);
        self.run_delete(filter, purge).await
    }

    async fn run_delete(&self, filter: Filter, purge: bool) -> QueryResult<u64> {
        let table = self.table().to_string();

        if self.config.use_soft_deletes && !purge {
            let now = Self::now();
            let mut set = Row::new();
            set.insert(self.config.deleted_field.clone(), now.clone());
            if self.config.use_timestamps {
                set.insert(self.config.updated_field.clone(), now);
            }
            let query = UpdateQuery {
                table,
                set,
                filter,
                limit: None,
            };
            let marked = self.store.update(&query).await?;
            debug!(table = %query.table, rows = marked, "soft-deleted rows");
            return Ok(marked);
        }

        let query = DeleteQuery {
            table,
            filter,
            limit: None,
        };
        let deleted = self.store.delete(&query).await?;
        debug!(table = %query.table, rows = deleted, "deleted rows");
        Ok(deleted)
    }
}

impl std::fmt::Debug for DynaModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynaModel")
            .field("table", &self.table())
            .field("primary_key", &self.primary_key)
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("hooks", &self.hooks)
            .finish()
    }
}
