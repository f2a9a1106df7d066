//! Filter types for building WHERE clauses.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A filter value that can be used in comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    String(String),
    /// List of values (membership).
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Check if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert a JSON cell into a filter value.
    ///
    /// Arrays become lists; objects have no scalar meaning and map to their
    /// JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(_) => Self::String(value.to_string()),
        }
    }

    /// Convert back into a JSON cell.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Value> for FilterValue {
    fn from(v: Value) -> Self {
        Self::from_json(&v)
    }
}

impl From<&Value> for FilterValue {
    fn from(v: &Value) -> Self {
        Self::from_json(v)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// Column conditions: a scalar means equality, a list means membership.
///
/// Used by `find_by`, `update_by`, `delete_by` and relationship filters.
pub type Conditions = IndexMap<String, FilterValue>;

/// Build [`Conditions`] from `(column, value)` pairs.
pub fn conditions<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Conditions
where
    K: Into<String>,
    V: Into<FilterValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A complete filter that can be converted to SQL.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// No filter (always true).
    #[default]
    None,

    /// Equals comparison.
    Equals(String, FilterValue),
    /// Not equals comparison.
    NotEquals(String, FilterValue),

    /// Less than comparison.
    Lt(String, FilterValue),
    /// Less than or equal comparison.
    Lte(String, FilterValue),
    /// Greater than comparison.
    Gt(String, FilterValue),
    /// Greater than or equal comparison.
    Gte(String, FilterValue),

    /// In a list of values.
    In(String, Vec<FilterValue>),
    /// Not in a list of values.
    NotIn(String, Vec<FilterValue>),

    /// Contains (LIKE %value%).
    Contains(String, FilterValue),

    /// Is null check.
    IsNull(String),
    /// Is not null check.
    IsNotNull(String),

    /// Logical AND of multiple filters.
    And(Vec<Filter>),
    /// Logical OR of multiple filters.
    Or(Vec<Filter>),
    /// Logical NOT of a filter.
    Not(Box<Filter>),
}

impl Filter {
    /// Check if this filter is empty.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Create an AND filter.
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.remove(0),
            _ => Self::And(filters),
        }
    }

    /// Create an OR filter.
    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        let mut filters: Vec<_> = filters.into_iter().filter(|f| !f.is_none()).collect();
        match filters.len() {
            0 => Self::None,
            1 => filters.remove(0),
            _ => Self::Or(filters),
        }
    }

    /// Create a NOT filter.
    pub fn not(filter: Filter) -> Self {
        if filter.is_none() {
            return Self::None;
        }
        Self::Not(Box::new(filter))
    }

    /// Combine with another filter using AND.
    pub fn and_then(self, other: Filter) -> Self {
        if self.is_none() {
            return other;
        }
        if other.is_none() {
            return self;
        }
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            _ => Self::And(vec![self, other]),
        }
    }

    /// Build an equality or membership filter on `column`.
    ///
    /// A list value produces `IN`, anything else equality (`IS NULL` for null).
    pub fn condition(column: impl Into<String>, value: FilterValue) -> Self {
        let column = column.into();
        match value {
            FilterValue::List(values) => Self::In(column, values),
            value => Self::Equals(column, value),
        }
    }

    /// AND together one condition per entry, qualifying each column with
    /// `qualifier` when given.
    pub fn from_conditions(qualifier: Option<&str>, conditions: &Conditions) -> Self {
        Self::and(conditions.iter().map(|(column, value)| {
            let column = match qualifier {
                Some(q) => format!("{}.{}", q, column),
                None => column.clone(),
            };
            Self::condition(column, value.clone())
        }))
    }

    /// Generate SQL for this filter with `$n` placeholders numbered after
    /// `param_offset`. Returns (sql, params).
    pub fn to_sql(&self, param_offset: usize) -> (String, Vec<FilterValue>) {
        let mut params = Vec::new();
        let sql = self.write_sql(param_offset, &mut params);
        (sql, params)
    }

    fn write_sql(&self, offset: usize, params: &mut Vec<FilterValue>) -> String {
        let bind = |value: &FilterValue, params: &mut Vec<FilterValue>| {
            params.push(value.clone());
            format!("${}", offset + params.len())
        };

        match self {
            Self::None => "TRUE".to_string(),

            Self::Equals(col, val) if val.is_null() => format!("{} IS NULL", col),
            Self::Equals(col, val) => format!("{} = {}", col, bind(val, params)),
            Self::NotEquals(col, val) if val.is_null() => format!("{} IS NOT NULL", col),
            Self::NotEquals(col, val) => format!("{} != {}", col, bind(val, params)),

            Self::Lt(col, val) => format!("{} < {}", col, bind(val, params)),
            Self::Lte(col, val) => format!("{} <= {}", col, bind(val, params)),
            Self::Gt(col, val) => format!("{} > {}", col, bind(val, params)),
            Self::Gte(col, val) => format!("{} >= {}", col, bind(val, params)),

            Self::In(_, values) if values.is_empty() => "FALSE".to_string(),
            Self::In(col, values) => {
                let placeholders: Vec<_> = values.iter().map(|v| bind(v, params)).collect();
                format!("{} IN ({})", col, placeholders.join(", "))
            }
            Self::NotIn(_, values) if values.is_empty() => "TRUE".to_string(),
            Self::NotIn(col, values) => {
                let placeholders: Vec<_> = values.iter().map(|v| bind(v, params)).collect();
                format!("{} NOT IN ({})", col, placeholders.join(", "))
            }

            Self::Contains(col, val) => {
                let pattern = match val {
                    FilterValue::String(s) => FilterValue::String(format!("%{}%", s)),
                    other => other.clone(),
                };
                format!("{} LIKE {}", col, bind(&pattern, params))
            }

            Self::IsNull(col) => format!("{} IS NULL", col),
            Self::IsNotNull(col) => format!("{} IS NOT NULL", col),

            Self::And(filters) if filters.is_empty() => "TRUE".to_string(),
            Self::And(filters) => {
                let parts: Vec<_> = filters.iter().map(|f| f.write_sql(offset, params)).collect();
                format!("({})", parts.join(" AND "))
            }
            Self::Or(filters) if filters.is_empty() => "FALSE".to_string(),
            Self::Or(filters) => {
                let parts: Vec<_> = filters.iter().map(|f| f.write_sql(offset, params)).collect();
                format!("({})", parts.join(" OR "))
            }
            Self::Not(filter) => format!("NOT ({})", filter.write_sql(offset, params)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_value_from() {
        assert_eq!(FilterValue::from(42i32), FilterValue::Int(42));
        assert_eq!(FilterValue::from("hello"), FilterValue::String("hello".to_string()));
        assert_eq!(FilterValue::from(json!(2)), FilterValue::Int(2));
        assert_eq!(
            FilterValue::from(json!([1, "a"])),
            FilterValue::List(vec![FilterValue::Int(1), FilterValue::String("a".into())])
        );
    }

    #[test]
    fn test_condition_list_becomes_in() {
        let filter = Filter::condition("status", vec!["a", "b"].into());
        assert!(matches!(filter, Filter::In(_, ref v) if v.len() == 2));
    }

    #[test]
    fn test_from_conditions_qualifies_columns() {
        let conds = conditions([("active", FilterValue::Int(1)), ("kind", vec![1, 2].into())]);
        let (sql, params) = Filter::from_conditions(Some("books"), &conds).to_sql(0);
        assert_eq!(sql, "(books.active = $1 AND books.kind IN ($2, $3))");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_placeholders_continue_after_offset() {
        let filter = Filter::and([
            Filter::Equals("a".into(), 1.into()),
            Filter::Gt("b".into(), 2.into()),
        ]);
        let (sql, _) = filter.to_sql(3);
        assert_eq!(sql, "(a = $4 AND b > $5)");
    }

    #[test]
    fn test_null_equality_renders_is_null() {
        let (sql, params) = Filter::Equals("deleted_at".into(), FilterValue::Null).to_sql(0);
        assert_eq!(sql, "deleted_at IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_empty_in_is_false() {
        let (sql, _) = Filter::In("id".into(), vec![]).to_sql(0);
        assert_eq!(sql, "FALSE");
    }

    #[test]
    fn test_and_then_flattens() {
        let f = Filter::IsNull("a".into())
            .and_then(Filter::IsNull("b".into()))
            .and_then(Filter::IsNull("c".into()));
        assert!(matches!(f, Filter::And(ref v) if v.len() == 3));
        assert_eq!(Filter::None.and_then(Filter::IsNull("x".into())), Filter::IsNull("x".into()));
    }

    #[test]
    fn test_or_and_not_render() {
        let filter = Filter::or([
            Filter::Gte("views".into(), 100.into()),
            Filter::not(Filter::Contains("title".into(), "draft".into())),
        ]);
        let (sql, params) = filter.to_sql(0);
        assert_eq!(sql, "(views >= $1 OR NOT (title LIKE $2))");
        assert_eq!(params[1], FilterValue::String("%draft%".into()));

        assert_eq!(Filter::or([Filter::None, Filter::IsNull("a".into())]), Filter::IsNull("a".into()));
        assert!(Filter::not(Filter::None).is_none());
    }
}
