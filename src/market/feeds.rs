//! Market-data feed supervisors.
//!
//! Three independent receive loops, one per feed. Each subscribes, drains
//! events until the stream ends or errors, then resubscribes immediately:
//! market-data continuity is worth more than politeness here, so there is
//! no backoff and no attempt ceiling. Execution reports are forwarded to
//! the handler one at a time, awaiting each before receiving the next.

use std::future::Future;
use std::sync::Arc;

use log::warn;

use crate::venue::{ExecutionReport, MarginVenue, TradingPair};

use super::indicator::IndicatorBuffer;
use super::quote::QuoteCell;

/// Consume best bid/ask ticks into the shared quote cell. Never returns.
pub async fn run_quote_feed<V: MarginVenue>(
    venue: Arc<V>,
    pair: TradingPair,
    quotes: Arc<QuoteCell>,
) {
    loop {
        match venue.subscribe_quotes(&pair).await {
            Ok(mut rx) => {
                while let Some(quote) = rx.recv().await {
                    quotes.publish(quote).await;
                }
                warn!("quote feed for {pair} disconnected, resubscribing");
            }
            Err(e) => warn!("quote feed subscription for {pair} failed: {e}, retrying"),
        }
    }
}

/// Consume candle updates into the indicator buffer. Never returns.
pub async fn run_candle_feed<V: MarginVenue>(
    venue: Arc<V>,
    pair: TradingPair,
    interval: String,
    indicator: Arc<IndicatorBuffer>,
) {
    loop {
        match venue.subscribe_candles(&pair, &interval).await {
            Ok(mut rx) => {
                while let Some(candle) = rx.recv().await {
                    indicator.push(candle).await;
                }
                warn!("candle feed for {pair} disconnected, resubscribing");
            }
            Err(e) => warn!("candle feed subscription for {pair} failed: {e}, retrying"),
        }
    }
}

/// Forward execution reports to `handler`, serialized per event. Never
/// returns.
pub async fn run_execution_feed<V, H, Fut>(venue: Arc<V>, pair: TradingPair, handler: H)
where
    V: MarginVenue,
    H: Fn(ExecutionReport) -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        match venue.subscribe_executions(&pair).await {
            Ok(mut rx) => {
                while let Some(report) = rx.recv().await {
                    handler(report).await;
                }
                warn!("execution feed for {pair} disconnected, resubscribing");
            }
            Err(e) => warn!("execution feed subscription for {pair} failed: {e}, retrying"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::mock::MockVenue;
    use crate::venue::{Candle, Quote};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn quote_feed_publishes_ticks() {
        let venue = Arc::new(MockVenue::new("100"));
        let pair = TradingPair::new("BTC", "USDT");
        let quotes = Arc::new(QuoteCell::new(Duration::from_millis(1)));

        let _feed = tokio::spawn(run_quote_feed(
            Arc::clone(&venue),
            pair.clone(),
            Arc::clone(&quotes),
        ));

        // Wait for the subscription to register before pushing.
        sleep(Duration::from_millis(20)).await;
        venue.push_quote(Quote::new("100.1", "100.0")).await;

        let quote = timeout(Duration::from_secs(2), quotes.wait()).await.unwrap();
        assert_eq!(quote.ask, "100.1");
    }

    #[tokio::test]
    async fn candle_feed_fills_indicator() {
        let venue = Arc::new(MockVenue::new("100"));
        let pair = TradingPair::new("BTC", "USDT");
        let indicator = Arc::new(IndicatorBuffer::new(8, Duration::from_millis(1)));

        let _feed = tokio::spawn(run_candle_feed(
            Arc::clone(&venue),
            pair.clone(),
            "1s".into(),
            Arc::clone(&indicator),
        ));

        sleep(Duration::from_millis(20)).await;
        venue.push_candle(Candle::new(1, "100", "101")).await;

        timeout(Duration::from_secs(2), async {
            while indicator.is_empty().await {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
