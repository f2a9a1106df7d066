//! Write payload filtering.
//!
//! Every insert and update payload is filtered in a fixed order:
//!
//! 1. keys that are not columns of the table are dropped,
//! 2. keys in the protected set are dropped,
//! 3. keys outside the allow-list are dropped.
//!
//! Unknown keys never reach the later checks. Dropping a key is not an error;
//! dropped keys are only logged.

use indexmap::IndexSet;
use tracing::debug;

use crate::row::Row;
use crate::schema::TableSchema;

/// Allow/deny policy for write payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldGuard {
    /// Explicit allow-list; `None` allows every schema column.
    allowed: Option<IndexSet<String>>,
    protected: IndexSet<String>,
}

impl FieldGuard {
    /// A guard that allows every column and protects none.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`FieldGuard::set_allowed_fields`].
    pub fn allowed<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_allowed_fields(fields);
        self
    }

    /// Builder form of [`FieldGuard::set_protected_fields`].
    pub fn protected<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_protected_fields(fields);
        self
    }

    /// Replace the allow-list.
    pub fn set_allowed_fields<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(fields.into_iter().map(Into::into).collect());
    }

    /// Go back to allowing every schema column.
    pub fn clear_allowed_fields(&mut self) {
        self.allowed = None;
    }

    /// Replace the protected set.
    pub fn set_protected_fields<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected = fields.into_iter().map(Into::into).collect();
    }

    /// The effective allow-list for `schema`.
    pub fn allowed_fields<'a>(&'a self, schema: &'a TableSchema) -> Vec<&'a str> {
        match self.allowed {
            Some(ref allowed) => allowed.iter().map(String::as_str).collect(),
            None => schema.names().collect(),
        }
    }

    /// The protected set.
    pub fn protected_fields(&self) -> impl Iterator<Item = &str> {
        self.protected.iter().map(String::as_str)
    }

    /// Drop unknown keys, then protected keys.
    pub fn do_protect_fields(&self, schema: &TableSchema, data: Row) -> Row {
        data.into_iter()
            .filter(|(key, _)| {
                if !schema.contains(key) {
                    debug!(table = %schema.table(), field = %key, "dropped unknown field");
                    return false;
                }
                if self.protected.contains(key) {
                    debug!(table = %schema.table(), field = %key, "dropped protected field");
                    return false;
                }
                true
            })
            .collect()
    }

    /// Drop keys outside the allow-list.
    pub fn enforce_allowed(&self, schema: &TableSchema, data: Row) -> Row {
        let Some(ref allowed) = self.allowed else {
            return data;
        };
        data.into_iter()
            .filter(|(key, _)| {
                let keep = allowed.contains(key);
                if !keep {
                    debug!(table = %schema.table(), field = %key, "dropped field outside allow-list");
                }
                keep
            })
            .collect()
    }

    /// Run the full filter chain.
    pub fn guard(&self, schema: &TableSchema, data: Row) -> Row {
        let data = self.do_protect_fields(schema, data);
        self.enforce_allowed(schema, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::row;
    use crate::schema::ColumnInfo;
    use serde_json::json;

    fn users() -> TableSchema {
        TableSchema::new(
            "users",
            [
                ColumnInfo::new("id", "int").primary(),
                ColumnInfo::new("name", "varchar"),
                ColumnInfo::new("role", "varchar"),
                ColumnInfo::new("email", "varchar"),
            ],
        )
    }

    #[test]
    fn test_unknown_and_protected_are_dropped() {
        let guard = FieldGuard::new().protected(["role"]);
        let data = row([("x", json!(1)), ("role", json!("admin")), ("name", json!("Z"))]);
        let out = guard.do_protect_fields(&users(), data);
        assert_eq!(out, row([("name", json!("Z"))]));
    }

    #[test]
    fn test_unknown_key_is_dropped_even_if_allowed() {
        let guard = FieldGuard::new().allowed(["name", "ghost"]);
        let data = row([("ghost", json!(1)), ("name", json!("Z"))]);
        assert_eq!(guard.guard(&users(), data), row([("name", json!("Z"))]));
    }

    #[test]
    fn test_allow_list_defaults_to_every_column() {
        let guard = FieldGuard::new();
        assert_eq!(guard.allowed_fields(&users()), vec!["id", "name", "role", "email"]);

        let data = row([("name", json!("Z")), ("email", json!("z@example.com"))]);
        assert_eq!(guard.guard(&users(), data.clone()), data);
    }

    #[test]
    fn test_explicit_allow_list() {
        let guard = FieldGuard::new().allowed(["name"]);
        let data = row([("name", json!("Z")), ("email", json!("z@example.com"))]);
        assert_eq!(guard.guard(&users(), data), row([("name", json!("Z"))]));
    }
}
