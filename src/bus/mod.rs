//! Event envelope and local fan-out.
//!
//! Normalized events flow from the coordinator through [`FanOut`] to
//! registered in-process consumers:
//! - `event_types`: the fixed event-kind set and typed payloads, the single
//!   source of truth for what consumers can receive.
//! - `fan_out`: per-kind handler registry with exact-handler unsubscribe and
//!   panic isolation, so one misbehaving consumer cannot starve the rest.

mod event_types;
mod fan_out;

pub use event_types::{BusEvent, EventKind, EventPayload, StatsCounts, StatsSnapshot, TicketStats};
pub use fan_out::{FanOut, HandlerGuard};
