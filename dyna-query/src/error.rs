//! Error types for model construction, relationship composition and queries.
//!
//! Every failure is a [`QueryError`] carrying:
//! - an [`ErrorCode`] for programmatic handling
//! - a human readable message
//! - an [`ErrorContext`] naming the table, field and operation involved
//! - an optional source error reported by the data store
//!
//! # Error Codes
//!
//! Codes follow the pattern D{category}{number}:
//! - 1xxx: Model and relationship errors
//! - 5xxx: Data store errors
//! - 7xxx: Configuration errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use dyna_query::{ErrorCode, QueryError};
//!
//! let err = QueryError::table_not_found("categories");
//! assert_eq!(err.code, ErrorCode::TableNotFound);
//! assert!(err.to_string().contains("categories"));
//! ```

use std::fmt;
use thiserror::Error;

/// Result type for model and query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Model errors (1xxx)
    /// Table does not exist in the data store (D1001).
    TableNotFound = 1001,
    /// Column metadata could not be fetched (D1002).
    SchemaIntrospection = 1002,
    /// Table has no column flagged as primary key (D1003).
    PrimaryKeyMissing = 1003,
    /// Relationship alias is not declared (D1004).
    InvalidRelation = 1004,
    /// Record not found (D1005).
    RecordNotFound = 1005,

    // Write errors (3xxx)
    /// Bulk write without conditions (D3001).
    MissingConditions = 3001,

    // Data store errors (5xxx)
    /// General database error (D5001).
    DatabaseError = 5001,

    // Configuration errors (7xxx)
    /// Invalid model configuration (D7001).
    InvalidConfiguration = 7001,
    /// Configuration file could not be parsed (D7002).
    ConfigParse = 7002,

    // Internal errors (9xxx)
    /// Internal error (D9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "D1001").
    pub fn code(&self) -> String {
        format!("D{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::TableNotFound => "Table not found",
            Self::SchemaIntrospection => "Schema introspection failed",
            Self::PrimaryKeyMissing => "Primary key missing",
            Self::InvalidRelation => "Invalid relationship configuration",
            Self::RecordNotFound => "Record not found",
            Self::MissingConditions => "Write without conditions",
            Self::DatabaseError => "Database error",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::ConfigParse => "Configuration parse error",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The table involved.
    pub table: Option<String>,
    /// The field or relationship alias involved.
    pub field: Option<String>,
    /// The SQL statement (if available).
    pub sql: Option<String>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<String>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors that can occur while building models or running queries.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(suggestion.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the table.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.context.table = Some(table.into());
        self
    }

    /// Set the field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.context.field = Some(field.into());
        self
    }

    /// Set the SQL statement.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// The requested table does not exist.
    pub fn table_not_found(table: impl Into<String>) -> Self {
        let table = table.into();
        Self::new(
            ErrorCode::TableNotFound,
            format!("Table '{}' does not exist in the data store", table),
        )
        .with_table(&table)
        .with_suggestion("Check the table name and any configured table prefix")
    }

    /// Column metadata for a table could not be fetched.
    pub fn schema_introspection(table: impl Into<String>, message: impl Into<String>) -> Self {
        let table = table.into();
        Self::new(
            ErrorCode::SchemaIntrospection,
            format!("Failed to read column metadata for '{}': {}", table, message.into()),
        )
        .with_table(&table)
    }

    /// No column of the table is flagged as primary key.
    pub fn primary_key_missing(table: impl Into<String>) -> Self {
        let table = table.into();
        Self::new(
            ErrorCode::PrimaryKeyMissing,
            format!("Table '{}' has no primary key column", table),
        )
        .with_table(&table)
        .with_help("Configure the key explicitly with ModelConfig::primary_key")
    }

    /// A relationship alias was used without a matching declaration.
    pub fn invalid_relation(table: impl Into<String>, alias: impl Into<String>) -> Self {
        let table = table.into();
        let alias = alias.into();
        Self::new(
            ErrorCode::InvalidRelation,
            format!("No relationship '{}' is declared on '{}'", alias, table),
        )
        .with_table(&table)
        .with_field(&alias)
        .with_suggestion("Declare it first with belongs_to() or has_many()")
    }

    /// A required record was not found.
    pub fn not_found(table: impl Into<String>) -> Self {
        let table = table.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("No {} record found matching the query", table),
        )
        .with_table(&table)
    }

    /// A bulk update or delete was requested without any condition.
    pub fn missing_conditions(table: impl Into<String>, operation: impl Into<String>) -> Self {
        let table = table.into();
        let operation = operation.into();
        Self::new(
            ErrorCode::MissingConditions,
            format!("Refusing to {} every row of '{}' without conditions", operation, table),
        )
        .with_table(&table)
        .with_context(operation)
    }

    /// A configuration value is invalid.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }

    /// A configuration file could not be parsed.
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigParse, message)
    }

    /// A generic error reported by the data store.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// An internal invariant was broken.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    // ============== Error Checks ==============

    /// Check if this is a table-not-found error.
    pub fn is_table_not_found(&self) -> bool {
        self.code == ErrorCode::TableNotFound
    }

    /// Check if this is a relationship configuration error.
    pub fn is_invalid_relation(&self) -> bool {
        self.code == ErrorCode::InvalidRelation
    }

    /// Check if this is a configuration error.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::InvalidConfiguration | ErrorCode::ConfigParse
        )
    }

    /// Render a multi-line description including context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = format!("Error [{}]: {}\n", self.code.code(), self.message);

        if let Some(ref table) = self.context.table {
            output.push_str(&format!("  table: {}\n", table));
        }
        if let Some(ref field) = self.context.field {
            output.push_str(&format!("  field: {}\n", field));
        }
        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  operation: {}\n", op));
        }
        if let Some(ref sql) = self.context.sql {
            output.push_str(&format!("  sql: {}\n", sql));
        }
        for suggestion in &self.context.suggestions {
            output.push_str(&format!("  suggestion: {}\n", suggestion));
        }
        if let Some(ref help) = self.context.help {
            output.push_str(&format!("  help: {}\n", help));
        }

        output
    }
}

impl From<toml::de::Error> for QueryError {
    fn from(err: toml::de::Error) -> Self {
        QueryError::config_parse(err.to_string()).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::TableNotFound.code(), "D1001");
        assert_eq!(ErrorCode::InvalidConfiguration.code(), "D7001");
        assert_eq!(ErrorCode::Internal.to_string(), "D9001");
    }

    #[test]
    fn test_table_not_found() {
        let err = QueryError::table_not_found("categories");
        assert!(err.is_table_not_found());
        assert_eq!(err.context.table.as_deref(), Some("categories"));
        assert!(err.to_string().starts_with("[D1001]"));
    }

    #[test]
    fn test_invalid_relation_context() {
        let err = QueryError::invalid_relation("books", "publisher");
        assert!(err.is_invalid_relation());
        assert_eq!(err.context.field.as_deref(), Some("publisher"));
        assert!(!err.context.suggestions.is_empty());
    }

    #[test]
    fn test_display_full() {
        let err = QueryError::primary_key_missing("pivot")
            .with_context("belongs_to")
            .with_sql("SELECT 1");
        let full = err.display_full();
        assert!(full.contains("table: pivot"));
        assert!(full.contains("operation: belongs_to"));
        assert!(full.contains("sql: SELECT 1"));
        assert!(full.contains("help:"));
    }
}
