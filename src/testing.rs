//! Test support: a scripted backing store and event-capture helpers.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::bus::{BusEvent, EventKind};
use crate::coordinator::RealtimeCoordinator;
use crate::store::{
    ChangeStore, CollectionQuery, Document, FieldFilter, LiveQuery, QuerySnapshot, StoreError,
};

/// Scripted [`ChangeStore`]: initial snapshots per collection, queued
/// subscribe failures, live pushes into attached streams, fixed count
/// values, and per-collection attempt counters.
#[derive(Default)]
pub(crate) struct MockStore {
    inner: Mutex<MockInner>,
}

#[derive(Default)]
struct MockInner {
    initial: HashMap<String, Vec<Document>>,
    subscribe_failures: HashMap<String, VecDeque<StoreError>>,
    counts: HashMap<String, u64>,
    filtered_counts: HashMap<String, u64>,
    count_failures: VecDeque<StoreError>,
    attempts: HashMap<String, u32>,
    taps: HashMap<String, mpsc::Sender<Result<QuerySnapshot, StoreError>>>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockInner> {
        self.inner.lock().expect("mock store mutex poisoned")
    }

    /// Documents delivered as the first snapshot of every subscription to
    /// `collection`.
    pub fn set_initial(&self, collection: &str, docs: Vec<Document>) {
        self.lock().initial.insert(collection.to_string(), docs);
    }

    /// Queue errors returned by the next subscribe calls for `collection`,
    /// one per attempt, before attaches succeed again.
    pub fn fail_subscribes(&self, collection: &str, errors: Vec<StoreError>) {
        self.lock()
            .subscribe_failures
            .insert(collection.to_string(), errors.into_iter().collect());
    }

    pub fn set_count(&self, collection: &str, value: u64) {
        self.lock().counts.insert(collection.to_string(), value);
    }

    /// Count returned for filtered count queries against `collection`
    /// (e.g. the new-users-in-window query).
    pub fn set_filtered_count(&self, collection: &str, value: u64) {
        self.lock()
            .filtered_counts
            .insert(collection.to_string(), value);
    }

    /// Queue an error for the next count call, whatever the collection.
    pub fn fail_next_count(&self, error: StoreError) {
        self.lock().count_failures.push_back(error);
    }

    pub fn subscribe_attempts(&self, collection: &str) -> u32 {
        self.lock().attempts.get(collection).copied().unwrap_or(0)
    }

    /// Push a live snapshot into the currently attached stream for
    /// `collection`. Panics if nothing is attached.
    pub async fn push_snapshot(&self, collection: &str, snapshot: QuerySnapshot) {
        let tap = self
            .lock()
            .taps
            .get(collection)
            .cloned()
            .unwrap_or_else(|| panic!("no live subscription for {collection}"));
        tap.send(Ok(snapshot)).await.expect("stream receiver gone");
    }

    /// Push an asynchronous stream error into the attached stream for
    /// `collection`.
    pub async fn push_stream_error(&self, collection: &str, error: StoreError) {
        let tap = self
            .lock()
            .taps
            .get(collection)
            .cloned()
            .unwrap_or_else(|| panic!("no live subscription for {collection}"));
        tap.send(Err(error)).await.expect("stream receiver gone");
    }
}

#[async_trait]
impl ChangeStore for MockStore {
    async fn subscribe(&self, query: CollectionQuery) -> Result<LiveQuery, StoreError> {
        let (tx, rx) = mpsc::channel(32);
        {
            let mut inner = self.lock();
            *inner.attempts.entry(query.collection.clone()).or_insert(0) += 1;

            if let Some(queue) = inner.subscribe_failures.get_mut(&query.collection) {
                if let Some(error) = queue.pop_front() {
                    return Err(error);
                }
            }

            if let Some(docs) = inner.initial.get(&query.collection) {
                let _ = tx.try_send(Ok(QuerySnapshot::initial(docs.clone())));
            }
            inner.taps.insert(query.collection.clone(), tx);
        }

        let (cancel_tx, _cancel_rx) = oneshot::channel();
        Ok(LiveQuery::new(rx, cancel_tx))
    }

    async fn count(
        &self,
        collection: &str,
        filters: Vec<FieldFilter>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        if let Some(error) = inner.count_failures.pop_front() {
            return Err(error);
        }
        let counts = if filters.is_empty() {
            &inner.counts
        } else {
            &inner.filtered_counts
        };
        Ok(counts.get(collection).copied().unwrap_or(0))
    }
}

/// Route coordinator logs to the test output; `RUST_LOG` overrides the
/// default filter.
pub(crate) fn init_test_logging() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "dashpulse=debug".parse().expect("valid env filter")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A document created `age` ago.
pub(crate) fn doc_created_ago(id: &str, age: ChronoDuration, fields: serde_json::Value) -> Document {
    Document {
        id: id.to_string(),
        created_at: Utc::now() - age,
        fields,
    }
}

pub(crate) fn ticket_doc(id: &str, status: &str) -> Document {
    doc_created_ago(id, ChronoDuration::hours(2), serde_json::json!({ "status": status }))
}

/// Capture every event of `kind` on an unbounded channel.
pub(crate) fn capture_events(
    coordinator: &RealtimeCoordinator,
    kind: EventKind,
) -> mpsc::UnboundedReceiver<BusEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    coordinator.subscribe(kind, move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

/// Drain everything currently buffered on a capture channel.
pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<BusEvent>) -> Vec<BusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Let spawned coordinator tasks run until they are all parked on timers or
/// channels. Does not advance the (possibly paused) clock.
pub(crate) async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}
