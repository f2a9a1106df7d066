//! Relationship declaration and composition.
//!
//! - [`RelationshipRegistry`] stores declarations and per-call activation.
//! - [`QueryComposer`] joins active belongs-to relationships before a read.
//! - [`ResultAssembler`] loads and attaches active has-many relationships
//!   after a read.

pub mod assembler;
pub mod composer;
pub mod definition;
pub mod registry;

pub use assembler::ResultAssembler;
pub use composer::QueryComposer;
pub use definition::{default_foreign_key, BelongsTo, HasMany, RelationSpec};
pub use registry::{RelationshipRegistry, RelationshipSelection, WhereRelationFilter};
