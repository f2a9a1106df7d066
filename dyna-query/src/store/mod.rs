//! Bundled [`DataStore`](crate::traits::DataStore) implementations.

pub mod memory;

pub use memory::{ExecutedStatement, MemoryStore, StatementKind};
