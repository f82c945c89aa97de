//! Change detection and notification filtering.
//!
//! Subscribing to a live query returns every currently matching document as
//! an initial batch of "added" deltas, so a naive listener would report N
//! pre-existing records as N arrivals on every attach. Two filters prevent
//! that: a per-entity-kind seen-ID set (an id is inserted before any
//! notification referencing it is emitted, so a record notifies at most once
//! per session) and a freshness window (records created more than a minute
//! before observation are treated as backfill, not news).

use std::collections::HashSet;

use chrono::Utc;

use crate::bus::{EventKind, EventPayload, TicketStats};
use crate::store::{DocChangeKind, Document, QuerySnapshot};

use super::{RealtimeCoordinator, StreamKey};

/// Previously observed entity identifiers, one set per entity kind. Grows
/// monotonically during a session; cleared only by teardown.
#[derive(Default)]
pub(super) struct SeenIds {
    pub(super) users: HashSet<String>,
    pub(super) orders: HashSet<String>,
    pub(super) tickets: HashSet<String>,
}

#[derive(Clone, Copy)]
enum RecentKind {
    User,
    Order,
}

/// Status counts over the full current ticket list. Unknown statuses count
/// toward the total only.
pub(super) fn ticket_stats(docs: &[Document]) -> TicketStats {
    let mut stats = TicketStats {
        total: docs.len() as u64,
        ..TicketStats::default()
    };
    for doc in docs {
        match doc.fields.get("status").and_then(|value| value.as_str()) {
            Some("open") => stats.open += 1,
            Some("in_progress") => stats.in_progress += 1,
            Some("resolved") | Some("closed") => stats.resolved += 1,
            _ => {}
        }
    }
    stats
}

impl RealtimeCoordinator {
    pub(super) fn handle_snapshot(
        &self,
        generation: u64,
        key: StreamKey,
        snapshot: QuerySnapshot,
    ) {
        match key {
            StreamKey::Tickets => self.handle_ticket_snapshot(generation, snapshot),
            StreamKey::RecentUsers => {
                self.handle_recent_snapshot(generation, RecentKind::User, snapshot)
            }
            StreamKey::RecentOrders => {
                self.handle_recent_snapshot(generation, RecentKind::Order, snapshot)
            }
        }
    }

    /// The ticket stream reports the whole current list every time. Notify
    /// when any ticket id is newly seen, and always once for the first
    /// snapshot of the session so consumers receive the initial list.
    fn handle_ticket_snapshot(&self, generation: u64, snapshot: QuerySnapshot) {
        let notify = {
            let mut shared = self.lock_shared();
            if shared.phase != super::CoordinatorPhase::Active
                || self.generation.load(std::sync::atomic::Ordering::SeqCst) != generation
            {
                return;
            }
            let mut newly_seen = false;
            for doc in &snapshot.docs {
                newly_seen |= shared.seen.tickets.insert(doc.id.clone());
            }
            let first_delivery = !shared.ticket_list_delivered;
            shared.ticket_list_delivered = true;
            newly_seen || first_delivery
        };

        if notify {
            let stats = ticket_stats(&snapshot.docs);
            tracing::debug!(total = stats.total, "ticket list changed, notifying");
            self.fan_out.emit(
                EventKind::TicketUpdate,
                EventPayload::TicketUpdate {
                    tickets: snapshot.docs,
                    stats,
                },
            );
        }
    }

    /// Recent-entity streams notify per added record: unseen and younger
    /// than the freshness window. Stale records are still marked seen so
    /// later snapshots do not re-evaluate them.
    fn handle_recent_snapshot(
        &self,
        generation: u64,
        kind: RecentKind,
        snapshot: QuerySnapshot,
    ) {
        let now = Utc::now();
        let window = chrono::Duration::from_std(self.config.freshness_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));

        let mut fresh: Vec<Document> = Vec::new();
        {
            let mut shared = self.lock_shared();
            if shared.phase != super::CoordinatorPhase::Active
                || self.generation.load(std::sync::atomic::Ordering::SeqCst) != generation
            {
                return;
            }
            let seen = match kind {
                RecentKind::User => &mut shared.seen.users,
                RecentKind::Order => &mut shared.seen.orders,
            };
            for change in &snapshot.changes {
                if change.kind != DocChangeKind::Added {
                    continue;
                }
                if !seen.insert(change.doc.id.clone()) {
                    continue;
                }
                let age = now.signed_duration_since(change.doc.created_at);
                if age < window {
                    fresh.push(change.doc.clone());
                }
            }
        }

        for doc in fresh {
            match kind {
                RecentKind::User => {
                    tracing::debug!(id = %doc.id, "new user observed");
                    self.fan_out
                        .emit(EventKind::UserCreated, EventPayload::UserCreated { user: doc });
                }
                RecentKind::Order => {
                    tracing::debug!(id = %doc.id, "new order observed");
                    self.fan_out.emit(
                        EventKind::OrderCreated,
                        EventPayload::OrderCreated { order: doc },
                    );
                }
            }
        }
    }
}
