//! Top-level wiring: shared market state, feed supervisors and the engine
//! loop, assembled around any [`MarginVenue`] implementation.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::errors::BotResult;
use crate::grid::{EngineConfig, GridEngine};
use crate::market::{self, IndicatorBuffer, QuoteCell};
use crate::venue::MarginVenue;

/// Run the bot against `venue` until the engine fails terminally.
///
/// Spawns the three feed supervisors, seeds the indicator from historical
/// candles and then drives the cycle loop on the calling task.
pub async fn run<V>(venue: Arc<V>, config: EngineConfig) -> BotResult<()>
where
    V: MarginVenue + 'static,
{
    config.validate()?;
    let poll = Duration::from_millis(config.poll_interval_ms);
    let quotes = Arc::new(QuoteCell::new(poll));
    let indicator = Arc::new(IndicatorBuffer::new(config.window, poll));

    let seed = venue
        .recent_candles(&config.pair, &config.candle_interval)
        .await?;
    info!("seeding indicator with {} historical candles", seed.len());
    indicator.seed(seed).await;

    let engine = Arc::new(GridEngine::new(
        Arc::clone(&venue),
        config.clone(),
        Arc::clone(&quotes),
        Arc::clone(&indicator),
    ));

    let quote_feed = tokio::spawn(market::run_quote_feed(
        Arc::clone(&venue),
        config.pair.clone(),
        Arc::clone(&quotes),
    ));
    let candle_feed = tokio::spawn(market::run_candle_feed(
        Arc::clone(&venue),
        config.pair.clone(),
        config.candle_interval.clone(),
        Arc::clone(&indicator),
    ));
    let execution_feed = {
        let engine = Arc::clone(&engine);
        let venue = Arc::clone(&venue);
        let pair = config.pair.clone();
        tokio::spawn(async move {
            market::run_execution_feed(venue, pair, move |report| {
                let engine = Arc::clone(&engine);
                async move { engine.handle_execution(report).await }
            })
            .await
        })
    };

    let result = engine.run().await;
    quote_feed.abort();
    candle_feed.abort();
    execution_feed.abort();
    result
}
