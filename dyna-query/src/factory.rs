//! Model construction by table name.
//!
//! [`DynamicModelFactory::table`] first consults its [`ModelRegistry`] for a
//! hand-written definition registered under the name. When there is none it
//! builds a generic [`DynaModel`] using the options `dyna.toml` gives for that
//! table.
//!
//! ```rust,ignore
//! let mut registry = ModelRegistry::new();
//! registry.register("users", |store: Arc<dyn DataStore>| -> BoxFuture<'static, QueryResult<DynaModel>> {
//!     Box::pin(async move {
//!         let mut users = DynaModel::new(store, "users").await?;
//!         users.set_protected_fields(["password_hash"]);
//!         Ok(users)
//!     })
//! });
//!
//! let factory = DynamicModelFactory::new(store).with_registry(registry);
//! let users = factory.table("users").await?;   // hand-written
//! let books = factory.table("books").await?;   // generic
//! ```

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::config::DynaConfig;
use crate::error::QueryResult;
use crate::model::DynaModel;
use crate::traits::{BoxFuture, DataStore};

/// A hand-written model for one table.
pub trait ModelDefinition: Send + Sync {
    /// Build the model. The factory returns it as is.
    fn build(&self, store: Arc<dyn DataStore>) -> BoxFuture<'static, QueryResult<DynaModel>>;
}

impl<F> ModelDefinition for F
where
    F: Fn(Arc<dyn DataStore>) -> BoxFuture<'static, QueryResult<DynaModel>> + Send + Sync,
{
    fn build(&self, store: Arc<dyn DataStore>) -> BoxFuture<'static, QueryResult<DynaModel>> {
        self(store)
    }
}

/// Table name -> hand-written model definition.
#[derive(Default, Clone)]
pub struct ModelRegistry {
    definitions: IndexMap<String, Arc<dyn ModelDefinition>>,
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `definition` for `table`, replacing any previous one.
    pub fn register<D>(&mut self, table: impl Into<String>, definition: D) -> &mut Self
    where
        D: ModelDefinition + 'static,
    {
        self.definitions.insert(table.into(), Arc::new(definition));
        self
    }

    /// Remove the definition for `table`.
    pub fn unregister(&mut self, table: &str) -> bool {
        self.definitions.shift_remove(table).is_some()
    }

    /// The definition for `table`.
    pub fn get(&self, table: &str) -> Option<&Arc<dyn ModelDefinition>> {
        self.definitions.get(table)
    }

    /// Check whether `table` has a definition.
    pub fn contains(&self, table: &str) -> bool {
        self.definitions.contains_key(table)
    }

    /// Registered table names.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Check whether no definition is registered.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Remove every definition.
    pub fn clear(&mut self) {
        self.definitions.clear();
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("tables", &self.tables().collect::<Vec<_>>())
            .finish()
    }
}

/// Builds models by table name.
pub struct DynamicModelFactory {
    store: Arc<dyn DataStore>,
    registry: ModelRegistry,
    config: DynaConfig,
}

impl DynamicModelFactory {
    /// A factory with no registered definitions and default options.
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            store,
            registry: ModelRegistry::new(),
            config: DynaConfig::default(),
        }
    }

    /// Use `registry` for hand-written models.
    pub fn with_registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use `config` for generic models.
    pub fn with_config(mut self, config: DynaConfig) -> Self {
        self.config = config;
        self
    }

    /// Load generic model options from a `dyna.toml` file.
    pub fn with_config_file(self, path: impl AsRef<Path>) -> QueryResult<Self> {
        let config = DynaConfig::from_file(path)?;
        Ok(self.with_config(config))
    }

    /// The registry.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The registry, for registering after construction.
    pub fn registry_mut(&mut self) -> &mut ModelRegistry {
        &mut self.registry
    }

    /// Options applied to generic models.
    pub fn config(&self) -> &DynaConfig {
        &self.config
    }

    /// A model for `table`.
    ///
    /// The table's existence is checked here, not on first query.
    pub async fn table(&self, table: &str) -> QueryResult<DynaModel> {
        if let Some(definition) = self.registry.get(table) {
            debug!(table = %table, "using registered model");
            return definition.build(self.store.clone()).await;
        }

        debug!(table = %table, "building generic model");
        let config = self.config.model_config(table)?;
        DynaModel::with_config(self.store.clone(), table, config).await
    }
}

impl std::fmt::Debug for DynamicModelFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicModelFactory")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::ReturnType;
    use crate::schema::ColumnInfo;
    use crate::store::memory::MemoryStore;

    fn store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.create_table(
            "users",
            [
                ColumnInfo::new("id", "int").primary(),
                ColumnInfo::new("name", "varchar"),
                ColumnInfo::new("password_hash", "varchar"),
            ],
        );
        Arc::new(store)
    }

    fn users_definition(store: Arc<dyn DataStore>) -> BoxFuture<'static, QueryResult<DynaModel>> {
        Box::pin(async move {
            let mut users = DynaModel::new(store, "users").await?;
            users.set_protected_fields(["password_hash"]);
            Ok(users)
        })
    }

    #[tokio::test]
    async fn test_generic_model() {
        let factory = DynamicModelFactory::new(store());
        let users = factory.table("users").await.unwrap();
        assert_eq!(users.table(), "users");
        assert_eq!(users.primary_key(), "id");
        assert_eq!(users.guard().allowed_fields(users.field_info()), vec!["id", "name", "password_hash"]);
    }

    #[tokio::test]
    async fn test_missing_table_fails_eagerly() {
        let store = store();
        let factory = DynamicModelFactory::new(store.clone());
        let err = factory.table("categories").await.unwrap_err();
        assert!(err.is_table_not_found());
        assert!(store.statements().is_empty());
    }

    #[tokio::test]
    async fn test_registered_definition_wins() {
        let mut registry = ModelRegistry::new();
        registry.register("users", users_definition);
        let factory = DynamicModelFactory::new(store()).with_registry(registry);

        let users = factory.table("users").await.unwrap();
        assert_eq!(users.guard().protected_fields().collect::<Vec<_>>(), vec!["password_hash"]);
    }

    #[tokio::test]
    async fn test_generic_model_uses_config() {
        let config = DynaConfig::from_str("[models.users]\nreturn_type = \"object\"\n").unwrap();
        let factory = DynamicModelFactory::new(store()).with_config(config);
        let users = factory.table("users").await.unwrap();
        assert_eq!(users.config().return_type, ReturnType::Object);
    }

    #[test]
    fn test_registry_teardown() {
        let mut registry = ModelRegistry::new();
        registry.register("users", users_definition);
        assert!(registry.contains("users"));
        assert!(registry.unregister("users"));
        registry.register("users", users_definition);
        registry.clear();
        assert!(registry.is_empty());
    }
}
