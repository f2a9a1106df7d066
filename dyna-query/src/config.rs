//! Model configuration and `dyna.toml` parsing.
//!
//! [`ModelConfig`] is the full set of per-model options. It is either built
//! in code or read from a `dyna.toml` file:
//!
//! ```toml
//! [defaults]
//! return_type = "object"
//! protected_fields = ["id"]
//!
//! [models.users]
//! use_soft_deletes = true
//! deleted_field = "deleted_at"
//! allowed_fields = ["name", "email"]
//!
//! [models.audit_log]
//! primary_key = "${AUDIT_KEY}"
//! ```
//!
//! Sections under `[models]` override `[defaults]` key by key.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{QueryError, QueryResult};
use crate::row::ReturnType;
use crate::schema::TableSchema;

/// Options for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Primary key override; `None` uses the first flagged column.
    pub primary_key: Option<String>,

    /// Columns writes may set; `None` allows every column.
    pub allowed_fields: Option<Vec<String>>,

    /// Columns writes may never set.
    pub protected_fields: Vec<String>,

    /// Default shape of returned records.
    pub return_type: ReturnType,

    /// Mark rows deleted instead of removing them, and hide marked rows.
    pub use_soft_deletes: bool,

    /// Column holding the deletion marker.
    pub deleted_field: String,

    /// Maintain created/updated timestamps on writes.
    pub use_timestamps: bool,

    /// Column set on insert.
    pub created_field: String,

    /// Column set on insert and update.
    pub updated_field: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            primary_key: None,
            allowed_fields: None,
            protected_fields: Vec::new(),
            return_type: ReturnType::Array,
            use_soft_deletes: false,
            deleted_field: "deleted_at".to_string(),
            use_timestamps: false,
            created_field: "created_at".to_string(),
            updated_field: "updated_at".to_string(),
        }
    }
}

impl ModelConfig {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the primary key.
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    /// Restrict writable columns.
    pub fn allowed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Protect columns from writes.
    pub fn protected_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the default record shape.
    pub fn return_type(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    /// Enable soft deletes on `field`.
    pub fn soft_deletes(mut self, field: impl Into<String>) -> Self {
        self.use_soft_deletes = true;
        self.deleted_field = field.into();
        self
    }

    /// Enable timestamps on the given columns.
    pub fn timestamps(mut self, created: impl Into<String>, updated: impl Into<String>) -> Self {
        self.use_timestamps = true;
        self.created_field = created.into();
        self.updated_field = updated.into();
        self
    }

    /// Check the options against the table they will be applied to.
    ///
    /// Columns the model reads or writes on its own must exist. Allow and
    /// protect lists naming unknown columns are only reported.
    pub fn validate(&self, schema: &TableSchema) -> QueryResult<()> {
        let table = schema.table();
        let require = |option: &str, column: &str| -> QueryResult<()> {
            if schema.contains(column) {
                Ok(())
            } else {
                Err(QueryError::invalid_configuration(format!(
                    "{} '{}' is not a column of '{}'",
                    option, column, table
                ))
                .with_table(table)
                .with_field(column))
            }
        };

        if let Some(ref pk) = self.primary_key {
            require("primary_key", pk)?;
        }
        if self.use_soft_deletes {
            require("deleted_field", &self.deleted_field)?;
        }
        if self.use_timestamps {
            require("created_field", &self.created_field)?;
            require("updated_field", &self.updated_field)?;
        }

        let listed = self
            .allowed_fields
            .iter()
            .flatten()
            .chain(self.protected_fields.iter());
        for field in listed.filter(|f| !schema.contains(f)) {
            warn!(table = %table, field = %field, "configured field is not a column");
        }
        Ok(())
    }
}

/// Contents of `dyna.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DynaConfig {
    /// Options shared by every model.
    #[serde(default)]
    pub defaults: toml::Table,

    /// Per-table overrides.
    #[serde(default)]
    pub models: IndexMap<String, toml::Table>,
}

impl DynaConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QueryError::config_parse(format!("failed to read '{}': {}", path.display(), e)).with_source(e)
        })?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// Every model section is checked eagerly, so a typo fails here rather
    /// than when the model is first built.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> QueryResult<Self> {
        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded)?;

        config.defaults()?;
        for table in config.models.keys() {
            config.model_config(table)?;
        }
        Ok(config)
    }

    /// The `[defaults]` options.
    pub fn defaults(&self) -> QueryResult<ModelConfig> {
        Ok(toml::Value::Table(self.defaults.clone()).try_into()?)
    }

    /// Options for `table`: its own section laid over `[defaults]`.
    pub fn model_config(&self, table: &str) -> QueryResult<ModelConfig> {
        let mut merged = self.defaults.clone();
        if let Some(section) = self.models.get(table) {
            for (key, value) in section {
                merged.insert(key.clone(), value.clone());
            }
        }
        toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| QueryError::from(e).with_table(table))
    }

    /// Check whether `table` has its own section.
    pub fn has_model(&self, table: &str) -> bool {
        self.models.contains_key(table)
    }
}

/// Replace `${VAR}` with the variable's value; unset variables are left as is.
fn expand_env_vars(content: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return content.to_string();
    };

    re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnInfo;

    fn users() -> TableSchema {
        TableSchema::new(
            "users",
            [
                ColumnInfo::new("id", "int").primary(),
                ColumnInfo::new("name", "varchar"),
                ColumnInfo::new("deleted_at", "datetime").nullable(),
                ColumnInfo::new("created_at", "datetime"),
                ColumnInfo::new("updated_at", "datetime"),
            ],
        )
    }

    #[test]
    fn test_default_model_config() {
        let config = ModelConfig::default();
        assert_eq!(config.deleted_field, "deleted_at");
        assert_eq!(config.return_type, ReturnType::Array);
        assert!(config.validate(&users()).is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_columns() {
        let err = ModelConfig::new().primary_key("uuid").validate(&users()).unwrap_err();
        assert!(err.is_configuration_error());
        assert_eq!(err.context.field.as_deref(), Some("uuid"));

        let err = ModelConfig::new().soft_deletes("removed").validate(&users()).unwrap_err();
        assert!(err.is_configuration_error());

        assert!(ModelConfig::new()
            .timestamps("created_at", "updated_at")
            .validate(&users())
            .is_ok());
    }

    #[test]
    fn test_unknown_allowed_fields_only_warn() {
        let config = ModelConfig::new().allowed_fields(["name", "ghost"]);
        assert!(config.validate(&users()).is_ok());
    }

    #[test]
    fn test_model_section_overrides_defaults() {
        let toml = r#"
            [defaults]
            return_type = "object"
            protected_fields = ["id"]

            [models.users]
            use_soft_deletes = true
            allowed_fields = ["name"]
        "#;

        let config = DynaConfig::from_str(toml).unwrap();
        let users = config.model_config("users").unwrap();
        assert_eq!(users.return_type, ReturnType::Object);
        assert_eq!(users.protected_fields, vec!["id"]);
        assert!(users.use_soft_deletes);
        assert_eq!(users.allowed_fields, Some(vec!["name".to_string()]));

        let other = config.model_config("books").unwrap();
        assert!(!other.use_soft_deletes);
        assert!(config.has_model("users"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = DynaConfig::from_str("[models.users]\nsoft_delete = true\n").unwrap_err();
        assert!(err.is_configuration_error());

        let err = DynaConfig::from_str("[database]\nurl = \"x\"\n").unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_env_var_expansion() {
        // SAFETY: test-only, variable name is unique to this test
        unsafe { std::env::set_var("DYNA_TEST_DELETED_FIELD", "removed_at") };
        let config = DynaConfig::from_str(
            "[models.users]\ndeleted_field = \"${DYNA_TEST_DELETED_FIELD}\"\n",
        )
        .unwrap();
        assert_eq!(config.model_config("users").unwrap().deleted_field, "removed_at");

        let kept = expand_env_vars("key = \"${DYNA_TEST_SURELY_UNSET}\"");
        assert_eq!(kept, "key = \"${DYNA_TEST_SURELY_UNSET}\"");
    }

    #[test]
    fn test_from_missing_file() {
        let err = DynaConfig::from_file("/nonexistent/dyna.toml").unwrap_err();
        assert!(err.is_configuration_error());
    }
}
