//! Query and snapshot types for the backing store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::StoreError;

/// Comparison operator for a server-side filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equal,
    GreaterThan,
    LessThan,
}

/// One server-side filter clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

/// A live-query request: collection, filters, ordering, result cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionQuery {
    pub collection: String,
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u32>,
}

/// A document as delivered by the store. `created_at` is the server-side
/// creation timestamp; everything else rides in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub fields: serde_json::Value,
}

impl Document {
    /// Creation timestamp rendered as ISO-8601.
    pub fn created_at_iso(&self) -> String {
        self.created_at.to_rfc3339()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocChangeKind {
    Added,
    Modified,
    Removed,
}

/// One delta relative to the previous snapshot of the same query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocChange {
    pub kind: DocChangeKind,
    pub doc: Document,
}

/// One emission of a live query: the full current result set plus the deltas
/// since the previous snapshot. The first snapshot of a subscription reports
/// every matching document as `Added`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySnapshot {
    pub docs: Vec<Document>,
    pub changes: Vec<DocChange>,
}

impl QuerySnapshot {
    /// Build a snapshot in which every document is an `Added` change, as a
    /// store emits on first attach.
    pub fn initial(docs: Vec<Document>) -> Self {
        let changes = docs
            .iter()
            .cloned()
            .map(|doc| DocChange {
                kind: DocChangeKind::Added,
                doc,
            })
            .collect();
        Self { docs, changes }
    }
}

/// Consumer half of a live query.
///
/// Events arrive on an mpsc channel in the store's emission order. Dropping
/// the handle (or calling [`LiveQuery::close`]) fires the cancel handle; the
/// producer side must stop emitting once it observes the cancellation, so no
/// callback fires for a closed handle.
pub struct LiveQuery {
    events: mpsc::Receiver<Result<QuerySnapshot, StoreError>>,
    cancel: Option<oneshot::Sender<()>>,
}

impl LiveQuery {
    pub fn new(
        events: mpsc::Receiver<Result<QuerySnapshot, StoreError>>,
        cancel: oneshot::Sender<()>,
    ) -> Self {
        Self {
            events,
            cancel: Some(cancel),
        }
    }

    /// Next snapshot or stream error. `None` once the producer side is gone.
    pub async fn next(&mut self) -> Option<Result<QuerySnapshot, StoreError>> {
        self.events.recv().await
    }

    /// Cancel the subscription. Safe to call multiple times.
    pub fn close(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.events.close();
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn live_query_close_is_idempotent() {
        let (_tx, rx) = mpsc::channel(1);
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let mut live = LiveQuery::new(rx, cancel_tx);

        live.close();
        live.close();
        assert!(matches!(cancel_rx.try_recv(), Ok(())));
    }

    #[tokio::test]
    async fn dropping_live_query_fires_cancel() {
        let (_tx, rx) = mpsc::channel(1);
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let live = LiveQuery::new(rx, cancel_tx);

        drop(live);
        assert!(matches!(cancel_rx.try_recv(), Ok(())));
    }

    #[test]
    fn initial_snapshot_marks_every_doc_added() {
        let doc = Document {
            id: "t-1".to_string(),
            created_at: Utc::now(),
            fields: serde_json::json!({ "status": "open" }),
        };
        let snapshot = QuerySnapshot::initial(vec![doc.clone(), doc]);
        assert_eq!(snapshot.changes.len(), 2);
        assert!(snapshot
            .changes
            .iter()
            .all(|change| change.kind == DocChangeKind::Added));
    }
}
