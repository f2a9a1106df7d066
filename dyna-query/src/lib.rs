//! # dyna-query
//!
//! Relationship composition and result assembly for schema-driven models.
//!
//! A model is bound to a table name at runtime. Its columns are discovered
//! from the data store, and relationships between tables are declared on the
//! model and folded into its reads:
//!
//! - belongs-to relationships are joined into the primary query
//! - has-many relationships are loaded with one secondary query each and
//!   attached to their parent rows
//! - write payloads are filtered against the schema and a protected/allowed
//!   field policy
//!
//! ## Belongs-to
//!
//! ```rust,ignore
//! use dyna_query::prelude::*;
//!
//! let mut books = DynaModel::new(store.clone(), "books").await?;
//! books.belongs_to("authors", None, None).await?;
//!
//! // SELECT books.id, books.title, books.author_id, authors.name
//! // FROM books LEFT JOIN authors AS authors ON authors.id = books.author_id
//! // WHERE books.id = $1 LIMIT 1
//! let book = books.with("authors")?.find(5).await?;
//! ```
//!
//! ## Has-many
//!
//! ```rust,ignore
//! let mut authors = DynaModel::new(store.clone(), "authors").await?;
//! authors
//!     .has_many("books", None, None, OrderBy::from_pairs([("title", "asc")])?)
//!     .await?;
//!
//! // {id: 2, name: "N2", books: [{id: 5, title: "X", author_id: 2}]}
//! let author = authors.with("books")?.find(2).await?;
//! ```
//!
//! ## Filters
//!
//! ```rust
//! use dyna_query::{conditions, Filter, FilterValue};
//!
//! let filter = Filter::from_conditions(
//!     Some("books"),
//!     &conditions([("status", FilterValue::from("live")), ("author_id", vec![1, 2].into())]),
//! );
//! let (sql, params) = filter.to_sql(0);
//! assert_eq!(sql, "(books.status = $1 AND books.author_id IN ($2, $3))");
//! assert_eq!(params.len(), 3);
//! ```
//!
//! ## Activation is per read
//!
//! `with`, `where_relation`, `order_by`, `as_objects`, `with_deleted` and
//! `only_deleted` apply to the next read only. A later read on the same model
//! issues no join and no secondary query unless relationships are activated
//! again.

pub mod config;
pub mod error;
pub mod factory;
pub mod filter;
pub mod guard;
pub mod hooks;
pub mod inflector;
pub mod logging;
pub mod model;
pub mod query;
pub mod relations;
pub mod row;
pub mod schema;
pub mod sql;
pub mod store;
pub mod traits;
pub mod types;

pub use config::{DynaConfig, ModelConfig};
pub use error::{ErrorCode, ErrorContext, QueryError, QueryResult};
pub use factory::{DynamicModelFactory, ModelDefinition, ModelRegistry};
pub use filter::{conditions, Conditions, Filter, FilterValue};
pub use guard::FieldGuard;
pub use hooks::{Hook, HookEvent, HookPoint, LifecycleHooks, ReadContext, SharedHook};
pub use model::DynaModel;
pub use query::{DeleteQuery, InsertQuery, Join, JoinKind, Projection, SelectQuery, UpdateQuery};
pub use relations::{
    BelongsTo, HasMany, QueryComposer, RelationSpec, RelationshipRegistry, RelationshipSelection,
    ResultAssembler, WhereRelationFilter,
};
pub use row::{row, FindResult, Record, ReturnType, Row};
pub use schema::{ColumnInfo, SchemaCatalog, TableSchema};
pub use store::MemoryStore;
pub use traits::{BoxFuture, DataStore};
pub use types::{OrderBy, OrderByField, SortOrder};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{DynaConfig, ModelConfig};
    pub use crate::error::{QueryError, QueryResult};
    pub use crate::factory::{DynamicModelFactory, ModelDefinition, ModelRegistry};
    pub use crate::filter::{conditions, Conditions, Filter, FilterValue};
    pub use crate::model::DynaModel;
    pub use crate::row::{row, FindResult, Record, ReturnType, Row};
    pub use crate::schema::ColumnInfo;
    pub use crate::traits::{BoxFuture, DataStore};
    pub use crate::types::{OrderBy, SortOrder};
}
