//! Event kinds and typed payloads.

use serde::{Deserialize, Serialize};

use crate::store::Document;

/// The fixed set of events the coordinator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TicketUpdate,
    UserCreated,
    OrderCreated,
    StatsUpdate,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TicketUpdate => "ticket-update",
            EventKind::UserCreated => "user-created",
            EventKind::OrderCreated => "order-created",
            EventKind::StatsUpdate => "stats-update",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket counts by status, computed from the full current ticket list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketStats {
    pub total: u64,
    pub open: u64,
    pub in_progress: u64,
    pub resolved: u64,
}

/// Aggregate counters fetched by the stats poller. Field order is the
/// serialization order, which is what the change digest compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsCounts {
    pub total_users: u64,
    pub active_profiles: u64,
    pub notifications_sent: u64,
    pub new_users_24h: u64,
}

/// The last successfully fetched counters plus their fetch time. Only
/// `counts` participates in change detection; `fetched_at` is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub counts: StatsCounts,
    pub fetched_at: String,
}

/// Typed payloads, read-only copies for consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    TicketUpdate {
        tickets: Vec<Document>,
        stats: TicketStats,
    },
    UserCreated {
        user: Document,
    },
    OrderCreated {
        order: Document,
    },
    StatsUpdate {
        stats: StatsSnapshot,
    },
}

/// Envelope delivered to handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub id: String,
    pub seq: i64,
    pub kind: EventKind,
    pub payload: EventPayload,
    pub created_at: String,
}
