//! Structured statements handed to a [`DataStore`](crate::traits::DataStore).
//!
//! The composer and assembler manipulate these values rather than strings, so
//! a store may execute them directly or render them with `to_sql()`.

use crate::filter::{Filter, FilterValue};
use crate::row::Row;
use crate::sql::quote_identifier;
use crate::types::OrderBy;

/// One selected column, optionally table-qualified and renamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    /// Table name or join alias qualifying the column.
    pub table: Option<String>,
    /// Column name in its source table.
    pub column: String,
    /// Output name when renamed (`AS alias`).
    pub alias: Option<String>,
}

impl Projection {
    /// A table-qualified column.
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
            alias: None,
        }
    }

    /// Rename the column in the result set.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Name under which the column appears in returned rows.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }

    /// Render as a select-list item.
    pub fn to_sql(&self) -> String {
        let mut sql = match self.table {
            Some(ref table) => format!("{}.{}", table, self.column),
            None => self.column.clone(),
        };
        if let Some(ref alias) = self.alias {
            sql.push_str(" AS ");
            sql.push_str(alias);
        }
        sql
    }
}

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// LEFT JOIN: parent rows are kept when nothing matches.
    Left,
    /// INNER JOIN.
    Inner,
}

impl JoinKind {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Left => "LEFT JOIN",
            Self::Inner => "INNER JOIN",
        }
    }
}

/// A join onto a related table under an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Join type.
    pub kind: JoinKind,
    /// Related table name as known to the schema.
    pub table: String,
    /// Prefixed and quoted table identifier for interpolation.
    pub target: String,
    /// Alias the related table is visible under.
    pub alias: String,
    /// Left side of the ON equality, `alias.column`.
    pub left: String,
    /// Right side of the ON equality, `table.column`.
    pub right: String,
}

impl Join {
    /// Render the join clause.
    pub fn to_sql(&self) -> String {
        format!(
            "{} {} AS {} ON {} = {}",
            self.kind.as_sql(),
            self.target,
            self.alias,
            self.left,
            self.right
        )
    }
}

/// A SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// Base table name.
    pub table: String,
    /// Prefixed and quoted base table identifier.
    pub from: String,
    /// Select list; empty means every column of the base table.
    pub projections: Vec<Projection>,
    /// Joined tables, in order.
    pub joins: Vec<Join>,
    /// WHERE predicate.
    pub filter: Filter,
    /// ORDER BY.
    pub order_by: OrderBy,
    /// LIMIT.
    pub limit: Option<u64>,
    /// OFFSET.
    pub offset: Option<u64>,
}

impl SelectQuery {
    /// Select everything from `table`.
    pub fn new(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            from: quote_identifier(&table),
            table,
            projections: Vec::new(),
            joins: Vec::new(),
            filter: Filter::None,
            order_by: OrderBy::none(),
            limit: None,
            offset: None,
        }
    }

    /// Set the identifier used in the FROM clause.
    ///
    /// When it differs from the table name, the table name is kept visible as
    /// an alias so qualified columns still resolve.
    pub fn from_target(mut self, target: impl Into<String>) -> Self {
        self.from = target.into();
        self
    }

    /// AND another predicate onto the WHERE clause.
    pub fn and_where(&mut self, filter: Filter) -> &mut Self {
        let current = std::mem::take(&mut self.filter);
        self.filter = current.and_then(filter);
        self
    }

    /// Append ordering.
    pub fn order_by(&mut self, order: OrderBy) -> &mut Self {
        for field in order.fields() {
            self.order_by.push(field.clone());
        }
        self
    }

    /// Set limit and offset; zero means unbounded / no offset.
    pub fn limit(&mut self, limit: u64, offset: u64) -> &mut Self {
        self.limit = (limit > 0).then_some(limit);
        self.offset = (offset > 0).then_some(offset);
        self
    }

    /// Check whether the select list has a column with this output name.
    pub fn selects(&self, output_name: &str) -> bool {
        self.projections.iter().any(|p| p.output_name() == output_name)
    }

    /// Render the statement with `$n` placeholders.
    pub fn to_sql(&self) -> (String, Vec<FilterValue>) {
        let mut sql = String::from("SELECT ");

        if self.projections.is_empty() {
            sql.push('*');
        } else {
            let cols: Vec<_> = self.projections.iter().map(Projection::to_sql).collect();
            sql.push_str(&cols.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.from);
        if self.from != quote_identifier(&self.table) {
            sql.push_str(" AS ");
            sql.push_str(&quote_identifier(&self.table));
        }

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.to_sql());
        }

        let (where_sql, params) = self.filter.to_sql(0);
        if !self.filter.is_none() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.to_sql());
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        (sql, params)
    }
}

/// An INSERT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    /// Target table.
    pub table: String,
    /// Column values.
    pub values: Row,
}

impl InsertQuery {
    /// Render the statement with `$n` placeholders.
    pub fn to_sql(&self) -> (String, Vec<FilterValue>) {
        let columns: Vec<_> = self.values.keys().cloned().collect();
        let placeholders: Vec<_> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
        let params = self.values.values().map(FilterValue::from_json).collect();
        (
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table,
                columns.join(", "),
                placeholders.join(", ")
            ),
            params,
        )
    }
}

/// An UPDATE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    /// Target table.
    pub table: String,
    /// Assignments.
    pub set: Row,
    /// WHERE predicate.
    pub filter: Filter,
    /// Optional row limit.
    pub limit: Option<u64>,
}

impl UpdateQuery {
    /// Render the statement with `$n` placeholders.
    pub fn to_sql(&self) -> (String, Vec<FilterValue>) {
        let assignments: Vec<_> = self
            .set
            .keys()
            .enumerate()
            .map(|(i, col)| format!("{} = ${}", col, i + 1))
            .collect();
        let mut params: Vec<_> = self.set.values().map(FilterValue::from_json).collect();

        let mut sql = format!("UPDATE {} SET {}", self.table, assignments.join(", "));
        if !self.filter.is_none() {
            let (where_sql, where_params) = self.filter.to_sql(params.len());
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
            params.extend(where_params);
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        (sql, params)
    }
}

/// A DELETE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    /// Target table.
    pub table: String,
    /// WHERE predicate.
    pub filter: Filter,
    /// Optional row limit.
    pub limit: Option<u64>,
}

impl DeleteQuery {
    /// Render the statement with `$n` placeholders.
    pub fn to_sql(&self) -> (String, Vec<FilterValue>) {
        let mut sql = format!("DELETE FROM {}", self.table);
        let (where_sql, params) = self.filter.to_sql(0);
        if !self.filter.is_none() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        (sql, params)
    }
}
