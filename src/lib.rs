//! Realtime change-notification coordinator for the admin dashboard.
//!
//! The dashboard needs to know about new support tickets, fresh user and
//! order signups, and aggregate-stat movement without hammering the backing
//! store. This crate owns that plumbing:
//! - Live subscriptions to the ticket, recent-user, and recent-order change
//!   streams, plus a periodically polled stats source
//! - Duplicate and initial-load suppression, so consumers only hear about
//!   genuinely new records
//! - Visibility-driven pause/resume (no backing-store traffic while the UI
//!   is hidden) and exponential-backoff retry for transient stream failures
//! - A local fan-out registry delivering normalized, typed events to
//!   in-process consumers
//!
//! # Architecture
//!
//! - `coordinator`: lifecycle, stream state machines, change detection,
//!   stats polling; the one stateful component
//! - `bus`: event envelope, event kinds, fan-out registry
//! - `store`: backing-store trait seam and error taxonomy
//! - `config`: tunables with sensible defaults and environment overrides
//! - `visibility`: the environment's visible/hidden signal surface
//!
//! The application entry point constructs one [`RealtimeCoordinator`] and
//! injects it wherever events are consumed; no global mutable instance
//! exists.

mod bus;
mod config;
mod coordinator;
mod store;
mod visibility;

#[cfg(test)]
mod testing;

pub use bus::{
    BusEvent, EventKind, EventPayload, HandlerGuard, StatsCounts, StatsSnapshot, TicketStats,
};
pub use config::{CollectionNames, CoordinatorConfig};
pub use coordinator::{CoordinatorPhase, RealtimeCoordinator, StreamKey, StreamState};
pub use store::{
    ChangeStore, CollectionQuery, DocChange, DocChangeKind, Document, FieldFilter, FilterOp,
    LiveQuery, OrderBy, QuerySnapshot, SortDirection, StoreError, StoreHandle,
};
pub use visibility::{visibility_channel, Visibility};
