//! Realtime change-notification coordinator.
//!
//! The coordinator is the one stateful component of the crate:
//! - Owns the live subscriptions to the ticket, recent-user, and
//!   recent-order change streams, plus the periodic stats poller
//! - Normalizes inbound snapshots and suppresses duplicate/initial-load
//!   noise before fanning events out to local consumers
//! - Pauses all backing-store traffic while the UI is hidden and resumes it
//!   without re-reporting already seen entities
//! - Retries transient stream failures with exponential backoff and parks
//!   permanently failed streams until the next teardown/initialize cycle
//!
//! # Sub-modules
//!
//! - `stream`: per-key attach/read/retry task and the stream state machine
//! - `filter`: seen-ID sets and change-detection rules
//! - `stats`: aggregate-stats poller with content-based de-dup
//!
//! # Usage
//!
//! The application entry point constructs one coordinator and hands it to
//! consumers:
//!
//! ```ignore
//! let coordinator = RealtimeCoordinator::new(Some(store), CoordinatorConfig::from_env());
//! coordinator.initialize();
//! let guard = coordinator.subscribe(EventKind::TicketUpdate, |event| { /* ... */ });
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::{BusEvent, EventKind, FanOut, HandlerGuard};
use crate::config::CoordinatorConfig;
use crate::store::StoreHandle;
use crate::visibility::Visibility;

use filter::SeenIds;

mod filter;
mod stats;
mod stream;


pub use stream::{StreamKey, StreamState};

/// Coordinator-level lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorPhase {
    Uninitialized,
    Active,
    Paused,
}

/// Mutable coordinator state. One mutex, short critical sections only.
struct Shared {
    phase: CoordinatorPhase,
    streams: HashMap<StreamKey, StreamState>,
    /// Consecutive-failure count per stream key; survives pause/resume.
    retries: HashMap<StreamKey, u32>,
    seen: SeenIds,
    /// Whether the initial ticket list has been delivered this session.
    ticket_list_delivered: bool,
    /// Serialized counts of the last emitted stats snapshot.
    last_stats_digest: Option<String>,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            phase: CoordinatorPhase::Uninitialized,
            streams: HashMap::new(),
            retries: HashMap::new(),
            seen: SeenIds::default(),
            ticket_list_delivered: false,
            last_stats_digest: None,
        }
    }
}

#[derive(Default)]
struct TaskSet {
    streams: HashMap<StreamKey, JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
    visibility: Option<JoinHandle<()>>,
}

impl TaskSet {
    /// Abort every stream task and the poller; the visibility watcher is
    /// left alone (it is torn down separately).
    fn abort_subscriptions(&mut self) {
        for (_, handle) in self.streams.drain() {
            handle.abort();
        }
        if let Some(handle) = self.poller.take() {
            handle.abort();
        }
    }
}

/// Coordinates the live streams, the stats poller, and the local fan-out.
///
/// Clone-able handle; all clones share the same state. Intended usage is one
/// instance per process, constructed by the application entry point.
#[derive(Clone)]
pub struct RealtimeCoordinator {
    store: Option<StoreHandle>,
    config: Arc<CoordinatorConfig>,
    fan_out: FanOut,
    shared: Arc<Mutex<Shared>>,
    /// Bumped on every pause/teardown; tasks carry the value current at
    /// spawn time and stand down when it no longer matches.
    generation: Arc<AtomicU64>,
    tasks: Arc<Mutex<TaskSet>>,
}

impl RealtimeCoordinator {
    /// `store = None` models a backing-store handle that could not be
    /// obtained; `initialize` then reports failure instead of panicking.
    pub fn new(store: Option<StoreHandle>, config: CoordinatorConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            fan_out: FanOut::new(),
            shared: Arc::new(Mutex::new(Shared::default())),
            generation: Arc::new(AtomicU64::new(0)),
            tasks: Arc::new(Mutex::new(TaskSet::default())),
        }
    }

    /// Attach all entity streams and start the stats poller.
    ///
    /// Idempotent: returns `true` without side effects when already
    /// initialized (or paused). Returns `false`, without panicking, when the
    /// backing-store handle is unavailable. Must be called from within a
    /// tokio runtime.
    pub fn initialize(&self) -> bool {
        let Some(store) = self.store.clone() else {
            tracing::warn!("backing store handle unavailable, coordinator stays offline");
            return false;
        };

        {
            let mut shared = self.lock_shared();
            if shared.phase != CoordinatorPhase::Uninitialized {
                tracing::debug!("initialize called on a running coordinator, ignoring");
                return true;
            }
            shared.phase = CoordinatorPhase::Active;
        }

        self.attach_all(store);
        tracing::info!("realtime coordinator initialized");
        true
    }

    /// Cancel every subscription and timer, clear all de-dup state, release
    /// all registered consumers, and reset to uninitialized. Safe to call
    /// repeatedly and from any state.
    pub fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut tasks = self.lock_tasks();
            tasks.abort_subscriptions();
            if let Some(handle) = tasks.visibility.take() {
                handle.abort();
            }
        }
        self.fan_out.clear();
        *self.lock_shared() = Shared::default();
        tracing::info!("realtime coordinator torn down");
    }

    /// Suspend all backing-store traffic, keeping seen-ID sets and the retry
    /// ledger so resuming does not re-report known entities. Permanently
    /// failed streams stay failed; only a teardown/initialize cycle recovers
    /// them. No-op unless active.
    pub fn pause(&self) {
        {
            let mut shared = self.lock_shared();
            if shared.phase != CoordinatorPhase::Active {
                return;
            }
            // Bumped under the lock so a stream task that already passed its
            // liveness check cannot write stale state afterwards.
            self.generation.fetch_add(1, Ordering::SeqCst);
            shared.phase = CoordinatorPhase::Paused;
            for state in shared.streams.values_mut() {
                if *state != StreamState::Failed {
                    *state = StreamState::Uninitialized;
                }
            }
        }
        self.lock_tasks().abort_subscriptions();
        tracing::debug!("coordinator paused, subscriptions cancelled");
    }

    /// Re-attach all streams and restart the poller, leaving permanently
    /// failed streams parked. No-op unless paused.
    pub fn resume(&self) {
        let Some(store) = self.store.clone() else {
            return;
        };
        {
            let mut shared = self.lock_shared();
            if shared.phase != CoordinatorPhase::Paused {
                return;
            }
            shared.phase = CoordinatorPhase::Active;
        }
        self.attach_all(store);
        tracing::debug!("coordinator resumed");
    }

    /// `Hidden` suspends, `Visible` resumes.
    pub fn handle_visibility(&self, visibility: Visibility) {
        match visibility {
            Visibility::Hidden => self.pause(),
            Visibility::Visible => self.resume(),
        }
    }

    /// Drive pause/resume from an environment visibility signal. The watcher
    /// task reacts to transitions and is cancelled by `teardown`.
    pub fn bind_visibility(&self, mut signal: watch::Receiver<Visibility>) {
        let coordinator = self.clone();
        let handle = tokio::spawn(async move {
            while signal.changed().await.is_ok() {
                let visibility = *signal.borrow_and_update();
                coordinator.handle_visibility(visibility);
            }
        });
        if let Some(previous) = self.lock_tasks().visibility.replace(handle) {
            previous.abort();
        }
    }

    /// Register a consumer for one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> HandlerGuard
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.fan_out.subscribe(kind, handler)
    }

    /// Force a stats fetch outside the timer cadence. Skipped while paused
    /// or uninitialized; failures are logged like any poll failure.
    pub async fn refresh_stats_now(&self) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let generation = self.generation.load(Ordering::SeqCst);
        if !self.still_live(generation) {
            tracing::debug!("stats refresh requested while inactive, skipping");
            return;
        }
        self.poll_stats_once(&store, generation).await;
    }

    /// Whether the coordinator currently holds live subscriptions.
    pub fn is_active(&self) -> bool {
        self.lock_shared().phase == CoordinatorPhase::Active
    }

    /// Current state of one stream, for staleness reporting.
    pub fn stream_state(&self, key: StreamKey) -> StreamState {
        self.lock_shared()
            .streams
            .get(&key)
            .copied()
            .unwrap_or(StreamState::Uninitialized)
    }

    fn attach_all(&self, store: StoreHandle) {
        let generation = self.generation.load(Ordering::SeqCst);
        let parked: Vec<StreamKey> = {
            let shared = self.lock_shared();
            StreamKey::ALL
                .into_iter()
                .filter(|key| shared.streams.get(key) == Some(&StreamState::Failed))
                .collect()
        };
        let mut tasks = self.lock_tasks();
        for key in StreamKey::ALL {
            if parked.contains(&key) {
                continue;
            }
            let coordinator = self.clone();
            let store = store.clone();
            tasks.streams.insert(
                key,
                tokio::spawn(async move { coordinator.run_stream(key, store, generation).await }),
            );
        }
        let coordinator = self.clone();
        tasks.poller = Some(tokio::spawn(async move {
            coordinator.run_stats_poller(store, generation).await;
        }));
    }

    /// Whether work spawned under `generation` may still touch state. False
    /// once the coordinator paused or tore down after the work began.
    fn still_live(&self, generation: u64) -> bool {
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        self.lock_shared().phase == CoordinatorPhase::Active
    }

    fn lock_shared(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().expect("coordinator state mutex poisoned")
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, TaskSet> {
        self.tasks.lock().expect("coordinator task mutex poisoned")
    }
}
