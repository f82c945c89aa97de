//! Coordinator configuration.

use std::time::Duration;

const DEFAULT_MAX_STREAM_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_STATS_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 60;
const DEFAULT_RECENT_WINDOW_HOURS: u64 = 24;
const DEFAULT_RECENT_RESULT_LIMIT: u32 = 20;

/// Backing-store collection names, overridable for multi-tenant deployments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNames {
    pub tickets: String,
    pub users: String,
    pub orders: String,
    pub profiles: String,
    pub notifications: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            tickets: "support_tickets".to_string(),
            users: "users".to_string(),
            orders: "orders".to_string(),
            profiles: "profiles".to_string(),
            notifications: "notifications".to_string(),
        }
    }
}

/// Tunables for stream retry, change detection, and stats polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Consecutive transient failures tolerated per stream before it is
    /// marked failed for the session.
    pub max_stream_retries: u32,
    /// Backoff base; attempt N waits `retry_base_delay * 2^N`.
    pub retry_base_delay: Duration,
    pub stats_poll_interval: Duration,
    /// Records older than this at observation time are treated as initial
    /// snapshot backfill, not new arrivals.
    pub freshness_window: Duration,
    /// Server-side time window for the recent-user/recent-order queries.
    pub recent_window: Duration,
    /// Server-side result cap for the recent-entity queries.
    pub recent_result_limit: u32,
    pub collections: CollectionNames,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_stream_retries: DEFAULT_MAX_STREAM_RETRIES,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            stats_poll_interval: Duration::from_secs(DEFAULT_STATS_POLL_INTERVAL_SECS),
            freshness_window: Duration::from_secs(DEFAULT_FRESHNESS_WINDOW_SECS),
            recent_window: Duration::from_secs(DEFAULT_RECENT_WINDOW_HOURS * 3600),
            recent_result_limit: DEFAULT_RECENT_RESULT_LIMIT,
            collections: CollectionNames::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Defaults with environment overrides applied. Unset, empty, or
    /// unparsable values fall back to the default.
    ///
    /// - `DASHPULSE_STATS_POLL_SECS`: stats poll interval in seconds.
    /// - `DASHPULSE_RETRY_BASE_MS`: backoff base delay in milliseconds.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = env_u64("DASHPULSE_STATS_POLL_SECS") {
            config.stats_poll_interval = Duration::from_secs(secs);
        }
        if let Some(millis) = env_u64("DASHPULSE_RETRY_BASE_MS") {
            config.retry_base_delay = Duration::from_millis(millis);
        }
        config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse().ok()
}
