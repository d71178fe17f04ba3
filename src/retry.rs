//! Bounded retry for fallible venue operations.
//!
//! Every individual venue call made by the engine runs through
//! [`RetryPolicy::run`]. Only the recoverable error category is retried;
//! anything else propagates on the first attempt. Retried operations may
//! have partial effects on the venue (an order can land even though the
//! confirming response errored), so callers correlate by order tag and
//! tolerate duplicates rather than assuming the wrapper is transactional.

use std::future::Future;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::errors::{BotError, BotResult};
use crate::venue::{VenueError, VenueResult};

/// Retry budget for a single venue operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up
    pub max_attempts: u32,
    /// Fixed delay between attempts, in milliseconds
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 40,
            delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Invoke `body` until it succeeds, a non-recoverable error occurs, or
    /// the attempt budget runs out.
    ///
    /// The closure is called once per attempt and must produce a fresh
    /// future each time, owning whatever it needs (clone cheap handles
    /// inside the closure).
    pub async fn run<T, F, Fut>(&self, op: &str, body: F) -> BotResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = VenueResult<T>>,
    {
        let mut last: Option<VenueError> = None;

        for attempt in 1..=self.max_attempts {
            match body().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_recoverable() => {
                    warn!(
                        "{}: recoverable venue error (attempt {}/{}): {}",
                        op, attempt, self.max_attempts, e
                    );
                    last = Some(e);
                    sleep(self.delay()).await;
                }
                Err(e) => return Err(BotError::Venue(e)),
            }
        }

        Err(BotError::AttemptsExhausted {
            op: op.to_string(),
            attempts: self.max_attempts,
            last: last.unwrap_or_else(|| VenueError::Transport("no attempt made".into())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, 1)
    }

    #[tokio::test]
    async fn succeeds_after_k_recoverable_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = fast_policy(40);

        let result = policy
            .run("op", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(VenueError::Recoverable("rate limit".into()))
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhausts_budget_and_stops() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = fast_policy(5);

        let err = policy
            .run("op", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(VenueError::Recoverable("rate limit".into()))
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BotError::AttemptsExhausted { attempts: 5, .. }
        ));
        // No further attempt after the budget is spent.
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn non_recoverable_error_propagates_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = fast_policy(40);

        let err = policy
            .run("op", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(VenueError::Rejected("bad lot size".into()))
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BotError::Venue(VenueError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
