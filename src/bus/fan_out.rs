//! Per-kind handler registry with panic-isolated dispatch.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::event_types::{BusEvent, EventKind, EventPayload};

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync + 'static>;

struct HandlerEntry {
    id: u64,
    handler: Handler,
}

struct FanOutInner {
    handlers: DashMap<EventKind, Vec<HandlerEntry>>,
    next_handler_id: AtomicU64,
    seq: AtomicI64,
}

/// Fan-out registry. Cheap to clone; all clones share one handler table.
#[derive(Clone)]
pub struct FanOut {
    inner: Arc<FanOutInner>,
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new()
    }
}

impl FanOut {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FanOutInner {
                handlers: DashMap::new(),
                next_handler_id: AtomicU64::new(0),
                seq: AtomicI64::new(0),
            }),
        }
    }

    /// Register a handler for one event kind. Handlers for the same kind run
    /// in registration order, but callers must not rely on it.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> HandlerGuard
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.inner.handlers.entry(kind).or_default().push(HandlerEntry {
            id,
            handler: Arc::new(handler),
        });
        HandlerGuard {
            inner: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Build the envelope and deliver it to every handler of `kind`.
    pub fn emit(&self, kind: EventKind, payload: EventPayload) -> BusEvent {
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let event = BusEvent {
            id: Uuid::new_v4().to_string(),
            seq,
            kind,
            payload,
            created_at: Utc::now().to_rfc3339(),
        };
        self.dispatch(&event);
        event
    }

    fn dispatch(&self, event: &BusEvent) {
        // Snapshot the handler list so a handler may subscribe/unsubscribe
        // without deadlocking against the dispatch.
        let handlers: Vec<Handler> = match self.inner.handlers.get(&event.kind) {
            Some(entries) => entries.iter().map(|entry| entry.handler.clone()).collect(),
            None => return,
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(
                    kind = %event.kind,
                    "event handler panicked, continuing with remaining handlers"
                );
            }
        }
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.inner
            .handlers
            .get(&kind)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Drop every registered handler.
    pub fn clear(&self) {
        self.inner.handlers.clear();
    }
}

/// Removes the handler it was returned for. `unsubscribe` is idempotent;
/// dropping the guard without calling it leaves the handler registered until
/// the registry is cleared.
pub struct HandlerGuard {
    inner: Weak<FanOutInner>,
    kind: EventKind,
    id: u64,
}

impl HandlerGuard {
    pub fn unsubscribe(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if let Some(mut entries) = inner.handlers.get_mut(&self.kind) {
            entries.retain(|entry| entry.id != self.id);
        };
    }
}
