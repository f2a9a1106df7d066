//! Read lifecycle hooks.
//!
//! A model keeps two ordered hook lists: one run before its primary query
//! executes and one run after. Hooks are shared objects added and removed by
//! reference, so adding the same hook twice is a no-op.
//!
//! ```rust,ignore
//! use dyna_query::hooks::{Hook, HookEvent};
//! use dyna_query::traits::BoxFuture;
//! use dyna_query::QueryResult;
//!
//! struct LimitEverything;
//!
//! impl Hook for LimitEverything {
//!     fn invoke<'a>(&'a self, event: &'a mut HookEvent<'_>) -> BoxFuture<'a, QueryResult<()>> {
//!         Box::pin(async move {
//!             if let HookEvent::BeforeFind { query, .. } = event {
//!                 query.limit(100, 0);
//!             }
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use std::sync::Arc;

use crate::error::QueryResult;
use crate::query::SelectQuery;
use crate::relations::RelationshipRegistry;
use crate::row::Row;
use crate::schema::TableSchema;
use crate::traits::{BoxFuture, DataStore};

/// What a hook can see of the model running the read.
#[derive(Clone, Copy)]
pub struct ReadContext<'a> {
    /// Store executing the read.
    pub store: &'a dyn DataStore,
    /// Cached schema of the model's table.
    pub schema: &'a TableSchema,
    /// Primary key column of the model's table.
    pub primary_key: &'a str,
    /// Declared relationships and their activation state.
    pub registry: &'a RelationshipRegistry,
}

impl std::fmt::Debug for ReadContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadContext")
            .field("table", &self.schema.table())
            .field("primary_key", &self.primary_key)
            .finish()
    }
}

/// The point in a read at which a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Before the primary query executes.
    BeforeFind,
    /// After the primary query returned its rows.
    AfterFind,
}

/// Payload handed to a hook.
#[derive(Debug)]
pub enum HookEvent<'a> {
    /// The primary query, open for modification.
    BeforeFind {
        /// Model state.
        ctx: ReadContext<'a>,
        /// Query about to execute.
        query: &'a mut SelectQuery,
    },
    /// The rows returned by the primary query, open for modification.
    AfterFind {
        /// Model state.
        ctx: ReadContext<'a>,
        /// Parent rows in result order.
        rows: &'a mut Vec<Row>,
    },
}

impl HookEvent<'_> {
    /// The point this event belongs to.
    pub fn point(&self) -> HookPoint {
        match self {
            Self::BeforeFind { .. } => HookPoint::BeforeFind,
            Self::AfterFind { .. } => HookPoint::AfterFind,
        }
    }
}

/// A unit of logic run at a fixed point of a read.
pub trait Hook: Send + Sync {
    /// Run the hook.
    fn invoke<'a>(&'a self, event: &'a mut HookEvent<'_>) -> BoxFuture<'a, QueryResult<()>>;

    /// Name of this hook (for debugging/logging).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A hook that can be shared across threads.
pub type SharedHook = Arc<dyn Hook>;

/// Ordered before/after hook lists.
#[derive(Default, Clone)]
pub struct LifecycleHooks {
    before: Vec<SharedHook>,
    after: Vec<SharedHook>,
}

impl LifecycleHooks {
    /// Empty hook lists.
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, point: HookPoint) -> &Vec<SharedHook> {
        match point {
            HookPoint::BeforeFind => &self.before,
            HookPoint::AfterFind => &self.after,
        }
    }

    fn list_mut(&mut self, point: HookPoint) -> &mut Vec<SharedHook> {
        match point {
            HookPoint::BeforeFind => &mut self.before,
            HookPoint::AfterFind => &mut self.after,
        }
    }

    /// Append `hook` at `point` unless that exact hook is already there.
    ///
    /// Returns whether it was added.
    pub fn add(&mut self, point: HookPoint, hook: SharedHook) -> bool {
        if self.contains(point, &hook) {
            return false;
        }
        self.list_mut(point).push(hook);
        true
    }

    /// Remove `hook` from `point`. Returns whether it was present.
    pub fn remove(&mut self, point: HookPoint, hook: &SharedHook) -> bool {
        let list = self.list_mut(point);
        let before = list.len();
        list.retain(|h| !Arc::ptr_eq(h, hook));
        list.len() != before
    }

    /// Check whether that exact hook is registered at `point`.
    pub fn contains(&self, point: HookPoint, hook: &SharedHook) -> bool {
        self.list(point).iter().any(|h| Arc::ptr_eq(h, hook))
    }

    /// Number of hooks at `point`.
    pub fn len(&self, point: HookPoint) -> usize {
        self.list(point).len()
    }

    /// Check whether no hooks are registered at all.
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    /// Invoke every hook registered for the event's point, in order.
    ///
    /// Stops at the first error.
    pub async fn run(&self, event: &mut HookEvent<'_>) -> QueryResult<()> {
        for hook in self.list(event.point()) {
            tracing::trace!(hook = hook.name(), point = ?event.point(), "invoking hook");
            hook.invoke(event).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("before", &self.before.iter().map(|h| h.name()).collect::<Vec<_>>())
            .field("after", &self.after.iter().map(|h| h.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnInfo;
    use crate::store::memory::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl Hook for Counter {
        fn invoke<'a>(&'a self, event: &'a mut HookEvent<'_>) -> BoxFuture<'a, QueryResult<()>> {
            Box::pin(async move {
                self.0.fetch_add(1, Ordering::SeqCst);
                if let HookEvent::BeforeFind { query, .. } = event {
                    query.limit(1, 0);
                }
                Ok(())
            })
        }
    }

    #[test]
    fn test_add_is_idempotent_by_reference() {
        let mut hooks = LifecycleHooks::new();
        let hook: SharedHook = Arc::new(Counter(AtomicUsize::new(0)));
        let other: SharedHook = Arc::new(Counter(AtomicUsize::new(0)));

        assert!(hooks.add(HookPoint::BeforeFind, hook.clone()));
        assert!(!hooks.add(HookPoint::BeforeFind, hook.clone()));
        assert!(hooks.add(HookPoint::BeforeFind, other.clone()));
        assert_eq!(hooks.len(HookPoint::BeforeFind), 2);
        assert_eq!(hooks.len(HookPoint::AfterFind), 0);

        assert!(hooks.remove(HookPoint::BeforeFind, &hook));
        assert!(!hooks.remove(HookPoint::BeforeFind, &hook));
        assert!(hooks.contains(HookPoint::BeforeFind, &other));
    }

    #[tokio::test]
    async fn test_run_only_invokes_matching_point() {
        let store = MemoryStore::new();
        store.create_table("books", [ColumnInfo::new("id", "int").primary()]);
        let schema = TableSchema::new("books", [ColumnInfo::new("id", "int").primary()]);
        let registry = RelationshipRegistry::new("books");
        let ctx = ReadContext {
            store: &store,
            schema: &schema,
            primary_key: "id",
            registry: &registry,
        };

        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let mut hooks = LifecycleHooks::new();
        hooks.add(HookPoint::BeforeFind, counter.clone());

        let mut query = SelectQuery::new("books");
        hooks
            .run(&mut HookEvent::BeforeFind { ctx, query: &mut query })
            .await
            .unwrap();
        assert_eq!(query.limit, Some(1));

        let mut rows = Vec::new();
        hooks
            .run(&mut HookEvent::AfterFind { ctx, rows: &mut rows })
            .await
            .unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
