//! Visibility signal from the hosting environment.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Whether the UI surface observing the coordinator is currently visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Channel pair for forwarding visibility transitions into the coordinator.
/// The application entry point keeps the sender and feeds it from its page or
/// window visibility signal.
pub fn visibility_channel(
    initial: Visibility,
) -> (watch::Sender<Visibility>, watch::Receiver<Visibility>) {
    watch::channel(initial)
}
