//! Store error taxonomy and permanent/transient classification.

use thiserror::Error;

/// Errors surfaced by a [`ChangeStore`](super::ChangeStore) implementation,
/// either synchronously from a call or asynchronously on a live stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),
    #[error("stream closed by store")]
    StreamClosed,
    #[error("store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Whether retrying can ever help.
    ///
    /// Authorization and schema errors will not self-resolve, so they are
    /// terminal for the subscription. Structured variants are the primary
    /// classification; matching "requires an index" inside `Internal` is a
    /// fallback for stores that only report missing server-side indexes
    /// through the message text.
    pub fn is_permanent(&self) -> bool {
        match self {
            StoreError::PermissionDenied(_)
            | StoreError::FailedPrecondition(_)
            | StoreError::InvalidArgument(_) => true,
            StoreError::Internal(message) => message.contains("requires an index"),
            StoreError::Unavailable(_)
            | StoreError::DeadlineExceeded(_)
            | StoreError::StreamClosed => false,
        }
    }
}
