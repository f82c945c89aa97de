//! Backing-store abstraction.
//!
//! The coordinator never talks to a concrete database client; it goes through
//! the [`ChangeStore`] trait so production code can plug in the real realtime
//! store while tests drive the coordinator with a scripted double.
//!
//! A store exposes two primitives:
//! - [`ChangeStore::subscribe`]: open a live query and receive an initial
//!   snapshot followed by incremental snapshots as matching documents change.
//! - [`ChangeStore::count`]: a cheap aggregate count estimate, no document
//!   payloads.

mod error;
mod types;

use std::sync::Arc;

use async_trait::async_trait;

pub use error::StoreError;
pub use types::{
    CollectionQuery, DocChange, DocChangeKind, Document, FieldFilter, FilterOp, LiveQuery,
    OrderBy, QuerySnapshot, SortDirection,
};

/// Client-side handle to a realtime document store.
///
/// Implementations must deliver snapshots for one subscription in the order
/// the store emitted them. No ordering is required across subscriptions.
#[async_trait]
pub trait ChangeStore: Send + Sync + 'static {
    /// Open a live query. The first snapshot reports every currently matching
    /// document as an [`DocChangeKind::Added`] change.
    async fn subscribe(&self, query: CollectionQuery) -> Result<LiveQuery, StoreError>;

    /// Aggregate count estimate for a collection, optionally filtered.
    async fn count(&self, collection: &str, filters: Vec<FieldFilter>)
        -> Result<u64, StoreError>;
}

/// Shared store handle, as held by the coordinator.
pub type StoreHandle = Arc<dyn ChangeStore>;
