//! Crate-level error types

use thiserror::Error;

use crate::numeric::NumericError;
use crate::venue::VenueError;

/// Errors surfaced by the engine and its collaborators
#[derive(Debug, Error)]
pub enum BotError {
    #[error("venue error: {0}")]
    Venue(#[from] VenueError),

    #[error("venue operation '{op}' failed after {attempts} attempts: {last}")]
    AttemptsExhausted {
        op: String,
        attempts: u32,
        last: VenueError,
    },

    #[error(transparent)]
    Numeric(#[from] NumericError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("credentials error: {0}")]
    Credentials(String),
}

/// Result type for engine operations
pub type BotResult<T> = std::result::Result<T, BotError>;
