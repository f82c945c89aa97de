//! Stream attachment and the per-subscription retry state machine.
//!
//! Each stream key runs one owning task: attach, read until the stream
//! errors or closes, then either back off and re-attach (transient) or park
//! the stream as failed (permanent / retry budget exhausted). Because the
//! backoff sleep lives inside the task, aborting the task on pause or
//! teardown also cancels any in-flight retry wait.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::store::{
    CollectionQuery, FieldFilter, FilterOp, OrderBy, SortDirection, StoreError, StoreHandle,
};

use super::RealtimeCoordinator;

/// Stable identifier of one live stream registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKey {
    Tickets,
    RecentUsers,
    RecentOrders,
}

impl StreamKey {
    pub const ALL: [StreamKey; 3] = [
        StreamKey::Tickets,
        StreamKey::RecentUsers,
        StreamKey::RecentOrders,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKey::Tickets => "ticket-stream",
            StreamKey::RecentUsers => "recent-user-stream",
            StreamKey::RecentOrders => "recent-order-stream",
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged per-subscription state.
///
/// `Failed` is terminal for the session; only a full teardown/initialize
/// cycle recovers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Uninitialized,
    Attaching,
    Active,
    Retrying { attempt: u32 },
    Failed,
}

/// Exponential backoff: `base * 2^attempt`, saturating.
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

impl RealtimeCoordinator {
    /// Owning task for one stream key. Returns when the coordinator moved on
    /// (generation mismatch), the stream failed permanently, or the retry
    /// budget ran out.
    pub(crate) async fn run_stream(self, key: StreamKey, store: StoreHandle, generation: u64) {
        loop {
            if !self.still_live(generation) {
                return;
            }
            self.set_stream_state(generation, key, StreamState::Attaching);

            let error = match store.subscribe(self.query_for(key)).await {
                Ok(mut live) => {
                    if !self.still_live(generation) {
                        return;
                    }
                    self.mark_stream_attached(generation, key);
                    tracing::debug!(key = %key, "stream attached");

                    let error = loop {
                        match live.next().await {
                            Some(Ok(snapshot)) => self.handle_snapshot(generation, key, snapshot),
                            Some(Err(error)) => break error,
                            None => break StoreError::StreamClosed,
                        }
                    };
                    live.close();
                    error
                }
                Err(error) => error,
            };

            if !self.back_off(generation, key, &error).await {
                return;
            }
        }
    }

    /// Classify `error` and update the state machine. Returns `true` when the
    /// caller should re-attach after the backoff wait that already happened.
    async fn back_off(&self, generation: u64, key: StreamKey, error: &StoreError) -> bool {
        if !self.still_live(generation) {
            return false;
        }

        if error.is_permanent() {
            tracing::error!(key = %key, %error, "permanent stream error, not retrying");
            self.set_stream_state(generation, key, StreamState::Failed);
            return false;
        }

        let attempt = {
            let mut shared = self.lock_shared();
            if self.generation.load(std::sync::atomic::Ordering::SeqCst) != generation {
                return false;
            }
            let count = shared.retries.entry(key).or_insert(0);
            let attempt = *count;
            if attempt >= self.config.max_stream_retries {
                shared.streams.insert(key, StreamState::Failed);
                tracing::warn!(key = %key, attempt, "retry budget exhausted, stream failed");
                return false;
            }
            *count += 1;
            shared.streams.insert(key, StreamState::Retrying { attempt });
            attempt
        };

        let delay = backoff_delay(self.config.retry_base_delay, attempt);
        tracing::warn!(
            key = %key,
            %error,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "transient stream error, re-attaching after backoff"
        );
        tokio::time::sleep(delay).await;
        self.still_live(generation)
    }

    fn mark_stream_attached(&self, generation: u64, key: StreamKey) {
        let mut shared = self.lock_shared();
        if self.generation.load(std::sync::atomic::Ordering::SeqCst) != generation {
            return;
        }
        shared.streams.insert(key, StreamState::Active);
        shared.retries.insert(key, 0);
    }

    fn set_stream_state(&self, generation: u64, key: StreamKey, state: StreamState) {
        let mut shared = self.lock_shared();
        if self.generation.load(std::sync::atomic::Ordering::SeqCst) != generation {
            return;
        }
        shared.streams.insert(key, state);
    }

    fn query_for(&self, key: StreamKey) -> CollectionQuery {
        let collections = &self.config.collections;
        match key {
            StreamKey::Tickets => CollectionQuery {
                collection: collections.tickets.clone(),
                filters: Vec::new(),
                order_by: Some(OrderBy {
                    field: "updated_at".to_string(),
                    direction: SortDirection::Descending,
                }),
                limit: None,
            },
            StreamKey::RecentUsers => self.recent_query(&collections.users),
            StreamKey::RecentOrders => self.recent_query(&collections.orders),
        }
    }

    /// Recent-entity query: server-side time window plus a small result cap,
    /// newest first.
    fn recent_query(&self, collection: &str) -> CollectionQuery {
        let window = chrono::Duration::from_std(self.config.recent_window)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        let cutoff = Utc::now() - window;
        CollectionQuery {
            collection: collection.to_string(),
            filters: vec![FieldFilter {
                field: "created_at".to_string(),
                op: FilterOp::GreaterThan,
                value: serde_json::json!(cutoff.to_rfc3339()),
            }],
            order_by: Some(OrderBy {
                field: "created_at".to_string(),
                direction: SortDirection::Descending,
            }),
            limit: Some(self.config.recent_result_limit),
        }
    }
}
