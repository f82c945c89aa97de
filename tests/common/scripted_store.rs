//! Scripted backing store for integration tests, built against the public
//! crate API only.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{mpsc, oneshot};

use dashpulse::{
    ChangeStore, CollectionQuery, Document, FieldFilter, LiveQuery, QuerySnapshot, StoreError,
};

/// A backing store driven entirely by the test: seeded initial snapshots,
/// queued subscribe failures, live pushes, and count values.
#[derive(Default)]
pub struct ScriptedStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    initial: HashMap<String, Vec<Document>>,
    subscribe_failures: HashMap<String, VecDeque<StoreError>>,
    counts: HashMap<String, u64>,
    filtered_counts: HashMap<String, u64>,
    attempts: HashMap<String, u32>,
    taps: HashMap<String, mpsc::Sender<Result<QuerySnapshot, StoreError>>>,
}

impl ScriptedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("scripted store mutex poisoned")
    }

    pub fn set_initial(&self, collection: &str, docs: Vec<Document>) {
        self.lock().initial.insert(collection.to_string(), docs);
    }

    pub fn fail_subscribes(&self, collection: &str, errors: Vec<StoreError>) {
        self.lock()
            .subscribe_failures
            .insert(collection.to_string(), errors.into_iter().collect());
    }

    pub fn set_count(&self, collection: &str, value: u64) {
        self.lock().counts.insert(collection.to_string(), value);
    }

    pub fn set_filtered_count(&self, collection: &str, value: u64) {
        self.lock()
            .filtered_counts
            .insert(collection.to_string(), value);
    }

    pub fn subscribe_attempts(&self, collection: &str) -> u32 {
        self.lock().attempts.get(collection).copied().unwrap_or(0)
    }

    pub async fn push_snapshot(&self, collection: &str, snapshot: QuerySnapshot) {
        let tap = self
            .lock()
            .taps
            .get(collection)
            .cloned()
            .unwrap_or_else(|| panic!("no live subscription for {collection}"));
        tap.send(Ok(snapshot)).await.expect("stream receiver gone");
    }

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
impl ChangeStore for ScriptedStore {
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
        let inner = self.lock();
        let counts = if filters.is_empty() {
            &inner.counts
        } else {
            &inner.filtered_counts
        };
        Ok(counts.get(collection).copied().unwrap_or(0))
    }
}

/// A document created `age` ago.
pub fn doc_created_ago(id: &str, age: ChronoDuration, fields: serde_json::Value) -> Document {
    Document {
        id: id.to_string(),
        created_at: Utc::now() - age,
        fields,
    }
}
