//! Result rows and result shapes.
//!
//! Data stores hand back [`Row`]s: ordered column -> JSON value maps. A read
//! then converts them to the caller's chosen [`ReturnType`] and wraps them in
//! a [`FindResult`] whose variant is decided by the operation itself
//! (`find(id)` is one row, `find_all()` is many), never by inspecting field
//! names.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{QueryError, QueryResult};

/// An ordered mapping of column name to value.
pub type Row = IndexMap<String, Value>;

/// Shape in which reads return their records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnType {
    /// Associative mapping (`IndexMap`) preserving column order.
    #[default]
    Array,
    /// Object-like JSON record.
    Object,
}

/// One returned record in the shape requested for the call.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Associative mapping.
    Array(Row),
    /// Object-like record.
    Object(Map<String, Value>),
}

impl Record {
    /// Wrap a row in the given shape.
    pub fn from_row(row: Row, shape: ReturnType) -> Self {
        match shape {
            ReturnType::Array => Self::Array(row),
            ReturnType::Object => Self::Object(row.into_iter().collect()),
        }
    }

    /// Look up a field regardless of shape.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Self::Array(row) => row.get(field),
            Self::Object(obj) => obj.get(field),
        }
    }

    /// Check whether the record has `field`.
    pub fn contains_key(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Field names in record order.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::Array(row) => row.keys().map(String::as_str).collect(),
            Self::Object(obj) => obj.keys().map(String::as_str).collect(),
        }
    }

    /// Convert into a JSON object value.
    pub fn into_value(self) -> Value {
        match self {
            Self::Array(row) => Value::Object(row.into_iter().collect()),
            Self::Object(obj) => Value::Object(obj),
        }
    }

    /// Deserialize the record into a typed struct.
    pub fn deserialize<T: DeserializeOwned>(self) -> QueryResult<T> {
        serde_json::from_value(self.into_value()).map_err(|e| {
            QueryError::internal(format!("failed to deserialize record: {}", e)).with_source(e)
        })
    }
}

/// Result of a read, tagged by the operation that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum FindResult {
    /// A single-row read (`find(id)`, `find_one_by`, `first`, `last`).
    One(Option<Record>),
    /// A collection read (`find_all`, `find_many`, `find_by`).
    Many(Vec<Record>),
}

impl FindResult {
    /// Check whether the read returned nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::One(record) => record.is_none(),
            Self::Many(records) => records.is_empty(),
        }
    }

    /// Number of records returned.
    pub fn len(&self) -> usize {
        match self {
            Self::One(record) => usize::from(record.is_some()),
            Self::Many(records) => records.len(),
        }
    }

    /// Take the single record; for a collection, its first element.
    pub fn into_one(self) -> Option<Record> {
        match self {
            Self::One(record) => record,
            Self::Many(records) => records.into_iter().next(),
        }
    }

    /// Take all records as a list.
    pub fn into_many(self) -> Vec<Record> {
        match self {
            Self::One(record) => record.into_iter().collect(),
            Self::Many(records) => records,
        }
    }

    /// Convert into JSON: an object (or null) for one, an array for many.
    pub fn into_value(self) -> Value {
        match self {
            Self::One(record) => record.map(Record::into_value).unwrap_or(Value::Null),
            Self::Many(records) => Value::Array(records.into_iter().map(Record::into_value).collect()),
        }
    }
}

/// Render a row as a JSON object value.
pub fn row_to_value(row: Row) -> Value {
    Value::Object(row.into_iter().collect())
}

/// Build a row from `(column, value)` pairs.
pub fn row<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Row
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
