//! The data store collaborator.
//!
//! Everything that touches a database goes through [`DataStore`]. Query
//! execution, SQL dialects and connection handling live behind it; this crate
//! only composes statements and assembles their results.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::error::QueryResult;
use crate::query::{DeleteQuery, InsertQuery, SelectQuery, UpdateQuery};
use crate::row::Row;
use crate::schema::ColumnInfo;
use crate::sql;

/// A boxed future for async data store operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes statements and reports table metadata.
///
/// Errors returned here are surfaced to callers unchanged.
pub trait DataStore: Send + Sync {
    /// Whether `table` exists.
    fn table_exists<'a>(&'a self, table: &'a str) -> BoxFuture<'a, QueryResult<bool>>;

    /// Column metadata for `table`, in table order.
    fn columns<'a>(&'a self, table: &'a str) -> BoxFuture<'a, QueryResult<Vec<ColumnInfo>>>;

    /// Whether `table` has a column named `field`.
    fn field_exists<'a>(&'a self, table: &'a str, field: &'a str) -> BoxFuture<'a, QueryResult<bool>> {
        Box::pin(async move {
            let columns = self.columns(table).await?;
            Ok(columns.iter().any(|c| c.name == field))
        })
    }

    /// Prefix and quote a table name for safe interpolation into FROM and
    /// JOIN clauses.
    fn prefix_table(&self, table: &str) -> String {
        sql::prefix_table("", table)
    }

    /// Run a SELECT.
    fn select<'a>(&'a self, query: &'a SelectQuery) -> BoxFuture<'a, QueryResult<Vec<Row>>>;

    /// Run an INSERT, returning the generated key if any.
    fn insert<'a>(&'a self, query: &'a InsertQuery) -> BoxFuture<'a, QueryResult<Option<Value>>>;

    /// Run an UPDATE, returning the number of affected rows.
    fn update<'a>(&'a self, query: &'a UpdateQuery) -> BoxFuture<'a, QueryResult<u64>>;

    /// Run a DELETE, returning the number of affected rows.
    fn delete<'a>(&'a self, query: &'a DeleteQuery) -> BoxFuture<'a, QueryResult<u64>>;
}
