//! In-process [`DataStore`] backed by ordered row vectors.
//!
//! Evaluates the structured statements directly: LEFT/INNER joins, projection
//! with renames, the full [`Filter`] tree, ordering and limit/offset. Equality
//! is loose between numbers and their string form, so `2` matches `"2"`.
//!
//! Every executed statement is logged, which lets tests assert how many joins
//! and secondary queries a read issued.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::trace;

use crate::error::{QueryError, QueryResult};
use crate::filter::{Filter, FilterValue};
use crate::query::{DeleteQuery, InsertQuery, JoinKind, SelectQuery, UpdateQuery};
use crate::row::Row;
use crate::schema::ColumnInfo;
use crate::sql;
use crate::traits::{BoxFuture, DataStore};

/// Kind of an executed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// SELECT.
    Select,
    /// INSERT.
    Insert,
    /// UPDATE.
    Update,
    /// DELETE.
    Delete,
}

/// One entry of the statement log.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    /// Statement kind.
    pub kind: StatementKind,
    /// Target table.
    pub table: String,
    /// Rendered SQL.
    pub sql: String,
    /// Number of joins (selects only).
    pub joins: usize,
}

#[derive(Debug, Clone, Default)]
struct MemTable {
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
}

impl MemTable {
    fn primary_key(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
    }

    fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }

    fn next_id(&self, pk: &str) -> i64 {
        self.rows
            .iter()
            .filter_map(|r| r.get(pk).and_then(as_number))
            .fold(0.0_f64, f64::max) as i64
            + 1
    }
}

/// An in-memory data store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    prefix: String,
    tables: RwLock<IndexMap<String, MemTable>>,
    log: Mutex<Vec<ExecutedStatement>>,
    failing: Mutex<HashSet<String>>,
    failing_metadata: Mutex<HashSet<String>>,
    metadata_calls: AtomicUsize,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the table prefix applied by [`DataStore::prefix_table`].
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Create (or replace) a table.
    pub fn create_table(&self, name: impl Into<String>, columns: impl IntoIterator<Item = ColumnInfo>) {
        self.tables.write().insert(
            name.into(),
            MemTable {
                columns: columns.into_iter().collect(),
                rows: Vec::new(),
            },
        );
    }

    /// Drop a table.
    pub fn drop_table(&self, name: &str) -> bool {
        self.tables.write().shift_remove(name).is_some()
    }

    /// Seed a row without logging, returning its primary key.
    pub fn insert_row(&self, table: &str, row: Row) -> QueryResult<Option<Value>> {
        self.run_insert(table, row)
    }

    /// Current rows of `table`.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Make every select against `table` fail with a database error.
    pub fn fail_selects_on(&self, table: impl Into<String>) {
        self.failing.lock().insert(table.into());
    }

    /// Make every column metadata request for `table` fail with a database
    /// error. The table still reports as existing.
    pub fn fail_metadata_on(&self, table: impl Into<String>) {
        self.failing_metadata.lock().insert(table.into());
    }

    /// Stop failing selects and metadata requests.
    pub fn clear_failures(&self) {
        self.failing.lock().clear();
        self.failing_metadata.lock().clear();
    }

    /// Executed statements, oldest first.
    pub fn statements(&self) -> Vec<ExecutedStatement> {
        self.log.lock().clone()
    }

    /// Number of selects executed against `table`.
    pub fn select_count(&self, table: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|s| s.kind == StatementKind::Select && s.table == table)
            .count()
    }

    /// The most recent select, if any.
    pub fn last_select(&self) -> Option<ExecutedStatement> {
        self.log
            .lock()
            .iter()
            .rev()
            .find(|s| s.kind == StatementKind::Select)
            .cloned()
    }

    /// Clear the statement log.
    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    /// Number of column metadata requests served.
    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(AtomicOrdering::SeqCst)
    }

    fn record(&self, kind: StatementKind, table: &str, sql: String, joins: usize) {
        trace!(sql = %sql, "memory store executing");
        self.log.lock().push(ExecutedStatement {
            kind,
            table: table.to_string(),
            sql,
            joins,
        });
    }

    fn run_select(&self, query: &SelectQuery) -> QueryResult<Vec<Row>> {
        let (sql, _) = query.to_sql();
        self.record(StatementKind::Select, &query.table, sql.clone(), query.joins.len());

        if self.failing.lock().contains(&query.table) {
            return Err(QueryError::database(format!("select on '{}' failed", query.table)).with_sql(sql));
        }

        let tables = self.tables.read();
        let base = tables
            .get(&query.table)
            .ok_or_else(|| QueryError::table_not_found(&query.table))?;

        let mut scopes: Vec<Scope> = base
            .rows
            .iter()
            .map(|row| vec![(query.table.clone(), Some(row.clone()))])
            .collect();

        for join in &query.joins {
            let related = tables
                .get(&join.table)
                .ok_or_else(|| QueryError::table_not_found(&join.table))?;
            let mut joined = Vec::with_capacity(scopes.len());
            for scope in scopes {
                let mut matched = false;
                for candidate in &related.rows {
                    let mut next = scope.clone();
                    next.push((join.alias.clone(), Some(candidate.clone())));
                    if loose_eq(&resolve(&next, &join.left), &resolve(&next, &join.right)) {
                        joined.push(next);
                        matched = true;
                    }
                }
                if !matched && join.kind == JoinKind::Left {
                    let mut next = scope;
                    next.push((join.alias.clone(), None));
                    joined.push(next);
                }
            }
            scopes = joined;
        }

        scopes.retain(|scope| matches(scope, &query.filter));

        if !query.order_by.is_empty() {
            scopes.sort_by(|a, b| {
                for field in query.order_by.fields() {
                    let ord = compare(&resolve(a, &field.column), &resolve(b, &field.column));
                    let ord = match field.order {
                        crate::types::SortOrder::Asc => ord,
                        crate::types::SortOrder::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);

        Ok(scopes
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|scope| project(&scope, query))
            .collect())
    }

    fn run_insert(&self, table: &str, values: Row) -> QueryResult<Option<Value>> {
        let mut tables = self.tables.write();
        let target = tables
            .get_mut(table)
            .ok_or_else(|| QueryError::table_not_found(table))?;

        if let Some(unknown) = values.keys().find(|k| !target.has_column(k)) {
            return Err(QueryError::database(format!("unknown column '{}'", unknown)).with_table(table));
        }

        let pk = target.primary_key().map(str::to_string);
        let mut row = Row::with_capacity(target.columns.len());
        for column in &target.columns {
            let value = values.get(&column.name).cloned().unwrap_or(Value::Null);
            row.insert(column.name.clone(), value);
        }

        let key = match pk {
            Some(pk) => {
                if row.get(&pk).is_none_or(Value::is_null) {
                    let id = target.next_id(&pk);
                    row.insert(pk.clone(), Value::from(id));
                }
                row.get(&pk).cloned()
            }
            None => None,
        };

        target.rows.push(row);
        Ok(key)
    }

    fn run_update(&self, query: &UpdateQuery) -> QueryResult<u64> {
        let mut tables = self.tables.write();
        let target = tables
            .get_mut(&query.table)
            .ok_or_else(|| QueryError::table_not_found(&query.table))?;

        if let Some(unknown) = query.set.keys().find(|k| !target.has_column(k)) {
            return Err(QueryError::database(format!("unknown column '{}'", unknown)).with_table(&query.table));
        }

        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        let mut affected = 0;
        for row in target.rows.iter_mut() {
            if affected >= limit {
                break;
            }
            let scope = vec![(query.table.clone(), Some(row.clone()))];
            if matches(&scope, &query.filter) {
                for (column, value) in &query.set {
                    row.insert(column.clone(), value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected as u64)
    }

    fn run_delete(&self, query: &DeleteQuery) -> QueryResult<u64> {
        let mut tables = self.tables.write();
        let target = tables
            .get_mut(&query.table)
            .ok_or_else(|| QueryError::table_not_found(&query.table))?;

        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        let mut affected = 0;
        target.rows.retain(|row| {
            if affected >= limit {
                return true;
            }
            let scope = vec![(query.table.clone(), Some(row.clone()))];
            if matches(&scope, &query.filter) {
                affected += 1;
                false
            } else {
                true
            }
        });
        Ok(affected as u64)
    }
}

impl DataStore for MemoryStore {
    fn table_exists<'a>(&'a self, table: &'a str) -> BoxFuture<'a, QueryResult<bool>> {
        Box::pin(async move { Ok(self.tables.read().contains_key(table)) })
    }

    fn columns<'a>(&'a self, table: &'a str) -> BoxFuture<'a, QueryResult<Vec<ColumnInfo>>> {
        Box::pin(async move {
            self.metadata_calls.fetch_add(1, AtomicOrdering::SeqCst);
            if self.failing_metadata.lock().contains(table) {
                return Err(QueryError::database(format!("metadata for '{}': connection reset", table)));
            }
            self.tables
                .read()
                .get(table)
                .map(|t| t.columns.clone())
                .ok_or_else(|| QueryError::table_not_found(table))
        })
    }

    fn prefix_table(&self, table: &str) -> String {
        sql::prefix_table(&self.prefix, table)
    }

    fn select<'a>(&'a self, query: &'a SelectQuery) -> BoxFuture<'a, QueryResult<Vec<Row>>> {
        Box::pin(async move { self.run_select(query) })
    }

    fn insert<'a>(&'a self, query: &'a InsertQuery) -> BoxFuture<'a, QueryResult<Option<Value>>> {
        Box::pin(async move {
            self.record(StatementKind::Insert, &query.table, query.to_sql().0, 0);
            self.run_insert(&query.table, query.values.clone())
        })
    }

    fn update<'a>(&'a self, query: &'a UpdateQuery) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            self.record(StatementKind::Update, &query.table, query.to_sql().0, 0);
            self.run_update(query)
        })
    }

    fn delete<'a>(&'a self, query: &'a DeleteQuery) -> BoxFuture<'a, QueryResult<u64>> {
        Box::pin(async move {
            self.record(StatementKind::Delete, &query.table, query.to_sql().0, 0);
            self.run_delete(query)
        })
    }
}

/// Qualifier -> row (None for an unmatched LEFT JOIN), base table first.
type Scope = Vec<(String, Option<Row>)>;

/// Resolve `table.column` or a bare `column` against a scope.
fn resolve(scope: &Scope, reference: &str) -> Value {
    let found = match reference.split_once('.') {
        Some((qualifier, column)) => scope
            .iter()
            .find(|(q, _)| q == qualifier)
            .and_then(|(_, row)| row.as_ref())
            .and_then(|row| row.get(column)),
        None => scope
            .iter()
            .filter_map(|(_, row)| row.as_ref())
            .find_map(|row| row.get(reference)),
    };
    found.cloned().unwrap_or(Value::Null)
}

fn project(scope: &Scope, query: &SelectQuery) -> Row {
    if query.projections.is_empty() {
        return scope
            .first()
            .and_then(|(_, row)| row.clone())
            .unwrap_or_default();
    }
    query
        .projections
        .iter()
        .map(|p| {
            let reference = match p.table {
                Some(ref table) => format!("{}.{}", table, p.column),
                None => p.column.clone(),
            };
            (p.output_name().to_string(), resolve(scope, &reference))
        })
        .collect()
}

fn matches(scope: &Scope, filter: &Filter) -> bool {
    match filter {
        Filter::None => true,
        Filter::Equals(col, v) if v.is_null() => resolve(scope, col).is_null(),
        Filter::Equals(col, v) => loose_eq(&resolve(scope, col), &v.to_json()),
        Filter::NotEquals(col, v) if v.is_null() => !resolve(scope, col).is_null(),
        Filter::NotEquals(col, v) => {
            let value = resolve(scope, col);
            !value.is_null() && !loose_eq(&value, &v.to_json())
        }
        Filter::Lt(col, v) => ordered(scope, col, v, |o| o == Ordering::Less),
        Filter::Lte(col, v) => ordered(scope, col, v, |o| o != Ordering::Greater),
        Filter::Gt(col, v) => ordered(scope, col, v, |o| o == Ordering::Greater),
        Filter::Gte(col, v) => ordered(scope, col, v, |o| o != Ordering::Less),
        Filter::In(col, values) => {
            let value = resolve(scope, col);
            values.iter().any(|v| loose_eq(&value, &v.to_json()))
        }
        Filter::NotIn(col, values) => {
            let value = resolve(scope, col);
            !value.is_null() && !values.iter().any(|v| loose_eq(&value, &v.to_json()))
        }
        Filter::Contains(col, v) => match (text(&resolve(scope, col)), text(&v.to_json())) {
            (Some(haystack), Some(needle)) => haystack.contains(&needle),
            _ => false,
        },
        Filter::IsNull(col) => resolve(scope, col).is_null(),
        Filter::IsNotNull(col) => !resolve(scope, col).is_null(),
        Filter::And(filters) => filters.iter().all(|f| matches(scope, f)),
        Filter::Or(filters) => filters.iter().any(|f| matches(scope, f)),
        Filter::Not(filter) => !matches(scope, filter),
    }
}

fn ordered(scope: &Scope, col: &str, v: &FilterValue, test: impl Fn(Ordering) -> bool) -> bool {
    let value = resolve(scope, col);
    if value.is_null() || v.is_null() {
        return false;
    }
    test(compare(&value, &v.to_json()))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// SQL-style equality: null equals nothing, numbers match their string form.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x == y;
    }
    text(a) == text(b)
}

/// Total order used for ORDER BY: nulls first, then numbers, then text.
fn compare(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => text(a).cmp(&text(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Join, Projection};
    use crate::row::row;
    use crate::types::{OrderBy, OrderByField};
    use serde_json::json;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_table(
            "authors",
            [ColumnInfo::new("id", "int").primary(), ColumnInfo::new("name", "varchar")],
        );
        store.create_table(
            "books",
            [
                ColumnInfo::new("id", "int").primary(),
                ColumnInfo::new("title", "varchar"),
                ColumnInfo::new("author_id", "int").nullable(),
            ],
        );
        store.insert_row("authors", row([("name", json!("N1"))])).unwrap();
        store.insert_row("authors", row([("name", json!("N2"))])).unwrap();
        store
            .insert_row("books", row([("id", json!(5)), ("title", json!("X")), ("author_id", json!(2))]))
            .unwrap();
        store
            .insert_row("books", row([("id", json!(6)), ("title", json!("Y")), ("author_id", json!(null))]))
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_insert_assigns_next_key() {
        let store = store();
        let key = store
            .insert(&InsertQuery {
                table: "authors".into(),
                values: row([("name", json!("N3"))]),
            })
            .await
            .unwrap();
        assert_eq!(key, Some(json!(3)));
        assert_eq!(store.rows("authors")[2], row([("id", json!(3)), ("name", json!("N3"))]));
    }

    #[tokio::test]
    async fn test_left_join_keeps_unmatched_rows() {
        let store = store();
        let mut query = SelectQuery::new("books");
        query.projections = vec![
            Projection::qualified("books", "id"),
            Projection::qualified("authors", "name"),
        ];
        query.joins.push(Join {
            kind: JoinKind::Left,
            table: "authors".into(),
            target: "authors".into(),
            alias: "authors".into(),
            left: "authors.id".into(),
            right: "books.author_id".into(),
        });
        query.order_by(OrderBy::from(OrderByField::asc("books.id")));

        let rows = store.select(&query).await.unwrap();
        assert_eq!(rows, vec![
            row([("id", json!(5)), ("name", json!("N2"))]),
            row([("id", json!(6)), ("name", json!(null))]),
        ]);
        assert_eq!(store.last_select().unwrap().joins, 1);
    }

    #[tokio::test]
    async fn test_loose_equality_and_null_handling() {
        let store = store();
        let mut query = SelectQuery::new("books");
        query.and_where(Filter::Equals("author_id".into(), "2".into()));
        assert_eq!(store.select(&query).await.unwrap().len(), 1);

        let mut query = SelectQuery::new("books");
        query.and_where(Filter::Equals("author_id".into(), FilterValue::Null));
        assert_eq!(store.select(&query).await.unwrap()[0]["id"], json!(6));

        let mut query = SelectQuery::new("books");
        query.and_where(Filter::NotIn("author_id".into(), vec![1.into()]));
        assert_eq!(store.select(&query).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_with_limit() {
        let store = store();
        let updated = store
            .update(&UpdateQuery {
                table: "books".into(),
                set: row([("title", json!("Z"))]),
                filter: Filter::None,
                limit: Some(1),
            })
            .await
            .unwrap();
        assert_eq!(updated, 1);
        assert_eq!(store.rows("books")[0]["title"], json!("Z"));
        assert_eq!(store.rows("books")[1]["title"], json!("Y"));

        let deleted = store
            .delete(&DeleteQuery {
                table: "books".into(),
                filter: Filter::Gt("id".into(), 5.into()),
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.rows("books").len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_column_is_a_database_error() {
        let store = store();
        let err = store
            .insert(&InsertQuery {
                table: "authors".into(),
                values: row([("ghost", json!(1))]),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::DatabaseError);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = store();
        store.fail_selects_on("books");
        assert!(store.select(&SelectQuery::new("books")).await.is_err());
        store.clear_failures();
        assert!(store.select(&SelectQuery::new("books")).await.is_ok());

        store.fail_metadata_on("books");
        assert!(store.table_exists("books").await.unwrap());
        let err = store.columns("books").await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::DatabaseError);
        store.clear_failures();
        assert!(store.columns("books").await.is_ok());
    }

    #[test]
    fn test_prefix_table() {
        let store = MemoryStore::new().with_prefix("app_");
        assert_eq!(store.prefix_table("authors"), "app_authors");
    }
}
