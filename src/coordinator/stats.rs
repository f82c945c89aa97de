//! Aggregate-stats poller.
//!
//! Runs once immediately on activation and then on a fixed interval. The
//! poller is an independent failure domain from the streams: a failed fetch
//! is logged and the next tick retries unconditionally, with no backoff and
//! no effect on subscription state.

use chrono::Utc;
use tokio::time::MissedTickBehavior;

use crate::bus::{EventKind, EventPayload, StatsCounts, StatsSnapshot};
use crate::store::{FieldFilter, FilterOp, StoreError, StoreHandle};

use super::{CoordinatorPhase, RealtimeCoordinator};

impl RealtimeCoordinator {
    pub(crate) async fn run_stats_poller(self, store: StoreHandle, generation: u64) {
        let mut interval = tokio::time::interval(self.config.stats_poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if !self.still_live(generation) {
                return;
            }
            self.poll_stats_once(&store, generation).await;
        }
    }

    /// One fetch/compare/emit cycle. Emits a `StatsUpdate` only when the
    /// serialized counts differ from the last emitted snapshot.
    pub(super) async fn poll_stats_once(&self, store: &StoreHandle, generation: u64) {
        let counts = match self.fetch_counts(store).await {
            Ok(counts) => counts,
            Err(error) => {
                tracing::warn!(%error, "stats poll failed, keeping previous snapshot");
                return;
            }
        };
        let digest = match serde_json::to_string(&counts) {
            Ok(digest) => digest,
            Err(error) => {
                tracing::warn!(%error, "stats snapshot serialization failed");
                return;
            }
        };

        let changed = {
            let mut shared = self.lock_shared();
            if shared.phase != CoordinatorPhase::Active
                || self.generation.load(std::sync::atomic::Ordering::SeqCst) != generation
            {
                return;
            }
            if shared.last_stats_digest.as_deref() == Some(digest.as_str()) {
                false
            } else {
                shared.last_stats_digest = Some(digest);
                true
            }
        };

        if changed {
            tracing::debug!(?counts, "stats changed, notifying");
            self.fan_out.emit(
                EventKind::StatsUpdate,
                EventPayload::StatsUpdate {
                    stats: StatsSnapshot {
                        counts,
                        fetched_at: Utc::now().to_rfc3339(),
                    },
                },
            );
        }
    }

    async fn fetch_counts(&self, store: &StoreHandle) -> Result<StatsCounts, StoreError> {
        let collections = &self.config.collections;
        let total_users = store.count(&collections.users, Vec::new()).await?;
        let active_profiles = store.count(&collections.profiles, Vec::new()).await?;
        let notifications_sent = store.count(&collections.notifications, Vec::new()).await?;

        let window = chrono::Duration::from_std(self.config.recent_window)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        let cutoff = Utc::now() - window;
        let new_users_24h = store
            .count(
                &collections.users,
                vec![FieldFilter {
                    field: "created_at".to_string(),
                    op: FilterOp::GreaterThan,
                    value: serde_json::json!(cutoff.to_rfc3339()),
                }],
            )
            .await?;

        Ok(StatsCounts {
            total_users,
            active_profiles,
            notifications_sent,
            new_users_24h,
        })
    }
}
