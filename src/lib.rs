//! # Dyna ORM
//!
//! Schema-driven dynamic models with relationship composition.
//!
//! Dyna provides:
//! - Models bound to a table name at runtime, with columns discovered from the store
//! - belongs-to relationships joined into the primary query
//! - has-many relationships loaded in one secondary query and attached per parent
//! - Guarded writes, soft deletes and timestamps
//! - A factory that prefers hand-written models and falls back to generic ones
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dyna_orm::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), dyna_orm::QueryError> {
//!     let store: Arc<dyn DataStore> = Arc::new(my_store());
//!     let factory = DynamicModelFactory::new(store).with_config_file("dyna.toml")?;
//!
//!     let mut authors = factory.table("authors").await?;
//!     authors.has_many("books", None, None, OrderBy::none()).await?;
//!
//!     let author = authors.with("books")?.find(2).await?;
//!     println!("{}", author.into_value());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Models, relationships and the data store seam.
pub mod query {
    pub use dyna_query::*;
}

/// Logging setup.
pub mod logging {
    pub use dyna_query::logging::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use dyna_query::prelude::*;
}

// Re-export key types at the crate root
pub use dyna_query::{
    DataStore, DynaConfig, DynaModel, DynamicModelFactory, FindResult, MemoryStore, ModelConfig,
    ModelRegistry, QueryError, QueryResult, Record, Row,
};
