//! Last-known best-price cell.
//!
//! Single writer (the quote feed supervisor), many readers (the engine
//! loop and the stop-loss monitor). Readers must tolerate the unpopulated
//! startup state by waiting, not by inspecting a sentinel.

use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::sleep;

use crate::venue::Quote;

/// Shared cell holding the most recent [`Quote`]
pub struct QuoteCell {
    inner: RwLock<Option<Quote>>,
    poll_interval: Duration,
}

impl QuoteCell {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            inner: RwLock::new(None),
            poll_interval,
        }
    }

    /// Overwrite the cell with a fresh tick.
    pub async fn publish(&self, quote: Quote) {
        *self.inner.write().await = Some(quote);
    }

    /// Latest quote, or `None` before the first tick arrives.
    pub async fn latest(&self) -> Option<Quote> {
        self.inner.read().await.clone()
    }

    /// Wait until the cell is populated, then return the latest quote.
    pub async fn wait(&self) -> Quote {
        loop {
            if let Some(quote) = self.latest().await {
                return quote;
            }
            sleep(self.poll_interval).await;
        }
    }
}
