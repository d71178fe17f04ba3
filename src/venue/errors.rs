//! Venue error taxonomy

use thiserror::Error;

/// Errors reported by the venue collaborator.
///
/// The engine cares about three categories: recoverable errors (retried by
/// [`crate::retry::RetryPolicy`]), the benign "nothing resting to cancel"
/// no-op, and everything else (propagated, aborting the cycle).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VenueError {
    /// Rate limit or transient rejection; safe to retry.
    #[error("recoverable venue error: {0}")]
    Recoverable(String),

    /// Cancel-all with no resting orders. Callers treat this as success.
    #[error("no open orders to cancel")]
    NoOpenOrders,

    /// The venue refused the request outright.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// The isolated pair's pool cannot cover the requested loan.
    #[error("insufficient margin: {0}")]
    InsufficientMargin(String),

    /// Connection-level failure talking to the venue.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl VenueError {
    /// Whether the retry wrapper should re-attempt the operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VenueError::Recoverable(_) | VenueError::Transport(_)
        )
    }

    /// Whether a cancel-all failure just means there was nothing to cancel.
    pub fn is_benign_cancel(&self) -> bool {
        matches!(self, VenueError::NoOpenOrders)
    }
}

/// Result type for venue operations
pub type VenueResult<T> = std::result::Result<T, VenueError>;
