//! Cycle state machine.
//!
//! One engine instance trades one isolated-margin pair through repeated
//! cycles: normalize the pools, pick a direction from the candle window,
//! borrow, enter at market, bracket the position with a re-entry ladder
//! and a take-profit, then wait for whichever exit fires first. Execution
//! reports arriving from the venue drive the ladder escalation; a polling
//! monitor backstops the position with a market close once price moves
//! too far against it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use rust_decimal::Decimal;
use tokio::sync::{watch, Mutex};
use tokio::time::sleep;

use crate::errors::{BotError, BotResult};
use crate::grid::config::EngineConfig;
use crate::grid::pool::PoolNormalizer;
use crate::grid::types::{CycleOutcome, CycleState, Direction, OrderLock, PoolSnapshot};
use crate::market::{IndicatorBuffer, IndicatorSnapshot, QuoteCell};
use crate::numeric;
use crate::venue::{
    cancel_resting, ExecutionReport, MarginVenue, MarketFill, OrderKind, OrderRole, OrderSide,
    OrderStatus, OrderTag, Quote,
};

/// Direction implied by the indicator window, if any.
///
/// Price that opened above the average and has since closed below it is
/// treated as stretched downward, so the engine buys the dip; the mirror
/// shape sells the rip. Anything else is no signal.
fn trend_direction(snap: &IndicatorSnapshot) -> Option<Direction> {
    if snap.ref_open > snap.sma_open && snap.sma_open > snap.last_close {
        Some(Direction::Long)
    } else if snap.ref_open < snap.sma_open && snap.sma_open < snap.last_close {
        Some(Direction::Short)
    } else {
        None
    }
}

pub struct GridEngine<V> {
    venue: Arc<V>,
    config: EngineConfig,
    quotes: Arc<QuoteCell>,
    indicator: Arc<IndicatorBuffer>,
    normalizer: PoolNormalizer<V>,
    /// The single order-mutation lock; `None` between cycles.
    cycle: OrderLock,
    cycle_counter: AtomicU64,
}

impl<V: MarginVenue> GridEngine<V> {
    pub fn new(
        venue: Arc<V>,
        config: EngineConfig,
        quotes: Arc<QuoteCell>,
        indicator: Arc<IndicatorBuffer>,
    ) -> Self {
        let cycle: OrderLock = Arc::new(Mutex::new(None));
        let normalizer = PoolNormalizer::new(Arc::clone(&venue), &config, Arc::clone(&cycle));
        Self {
            venue,
            config,
            quotes,
            indicator,
            normalizer,
            cycle,
            cycle_counter: AtomicU64::new(0),
        }
    }

    /// Run cycles indefinitely. Venue-class failures (rejections, exhausted
    /// retry budgets) abort the current cycle and the loop renormalizes and
    /// starts the next one; only unclassified errors propagate out.
    pub async fn run(&self) -> BotResult<()> {
        loop {
            self.normalizer.normalize().await?;
            let cycle = self.cycle_counter.fetch_add(1, Ordering::SeqCst) + 1;
            info!("starting cycle {cycle} on {}", self.config.pair);
            match self.run_cycle(cycle).await {
                Ok(Some(CycleOutcome::TakeProfit)) => {
                    info!("cycle {cycle} closed at take-profit")
                }
                Ok(Some(CycleOutcome::StopLoss)) => warn!("cycle {cycle} closed at stop-loss"),
                Ok(Some(CycleOutcome::Aborted)) => warn!("cycle {cycle} aborted, renormalizing"),
                Ok(None) => warn!("cycle {cycle} skipped: no funds borrowed"),
                Err(e) if matches!(e, BotError::AttemptsExhausted { .. } | BotError::Venue(_)) => {
                    warn!("cycle {cycle} failed: {e}, renormalizing");
                    *self.cycle.lock().await = None;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One full cycle. `Ok(None)` means the cycle was skipped before any
    /// position was opened.
    async fn run_cycle(&self, cycle: u64) -> BotResult<Option<CycleOutcome>> {
        let direction = self.choose_direction().await?;
        if !self.try_borrow(direction).await? {
            return Ok(None);
        }
        let pools = self.normalizer.refresh().await?;
        let quote = self.quotes.wait().await;
        let quantity = self.entry_quantity(direction, pools, &quote)?;
        if quantity <= Decimal::ZERO {
            warn!("cycle {cycle}: borrowed pool sizes to a zero lot, skipping");
            return Ok(None);
        }
        let quantity = quantity.to_string();

        let mut guard = self.cycle.lock().await;
        let (mut state, done_rx) = CycleState::new(cycle, direction);
        let setup = async {
            let fill = self.place_market(direction.entry_side(), &quantity).await?;
            state.filled_price = numeric::parse(&fill.price)?;
            state.pitch = state.filled_price * self.config.spacing_fraction;
            state.add_quantity(&fill.quantity)?;
            info!(
                "cycle {cycle}: entered {direction} {} at {}, pitch {}",
                fill.quantity, fill.price, state.pitch
            );
            tokio::try_join!(
                self.place_limit(
                    direction.entry_side(),
                    &fill.quantity,
                    state.reentry_price(1),
                    OrderTag::new(OrderRole::ReentryLot1, cycle),
                ),
                self.place_limit(
                    direction.exit_side(),
                    &state.total_quantity,
                    state.take_profit_price(state.filled_price),
                    OrderTag::new(OrderRole::TakeProfit, cycle),
                ),
            )?;
            Ok::<(), BotError>(())
        };
        match setup.await {
            Ok(()) => {
                let stop = state.stop_price(self.config.stop_loss_pitches);
                *guard = Some(state);
                drop(guard);
                let outcome = self.monitor(cycle, done_rx, direction, stop).await?;
                *self.cycle.lock().await = None;
                Ok(Some(outcome))
            }
            Err(e) => {
                drop(guard);
                if let Err(cancel_err) = cancel_resting(&*self.venue, &self.config.pair).await {
                    warn!("cycle {cycle}: teardown cancel failed: {cancel_err}");
                }
                Err(e)
            }
        }
    }

    /// Poll the indicator until it shows a tradeable shape.
    async fn choose_direction(&self) -> BotResult<Direction> {
        loop {
            let snap = self.indicator.snapshot().await?;
            if let Some(direction) = trend_direction(&snap) {
                info!(
                    "direction {direction}: ref open {} vs sma {} vs close {}",
                    snap.ref_open, snap.sma_open, snap.last_close
                );
                return Ok(direction);
            }
            sleep(self.poll_interval()).await;
        }
    }

    /// Borrow this cycle's working capital against the isolated account.
    /// Longs borrow quote, shorts borrow base. Returns `false` when every
    /// attempt is refused; the cycle is then skipped rather than failed.
    async fn try_borrow(&self, direction: Direction) -> BotResult<bool> {
        let (equity, price) = self.account_equity().await?;
        let budget = equity * self.config.leverage * self.config.borrow_safety;
        let (asset, amount) = match direction {
            Direction::Long => (
                self.config.pair.quote.as_str(),
                numeric::truncate(budget, self.config.price_decimals).normalize(),
            ),
            Direction::Short => {
                if price <= Decimal::ZERO {
                    warn!("average price {price} unusable for borrow sizing, skipping");
                    return Ok(false);
                }
                (
                    self.config.pair.base.as_str(),
                    numeric::truncate(budget / price, self.config.quantity_decimals).normalize(),
                )
            }
        };
        if amount <= Decimal::ZERO {
            warn!("equity {equity} sizes to a zero borrow, skipping");
            return Ok(false);
        }
        let amount = amount.to_string();

        for attempt in 1..=self.config.borrow_attempts {
            match self
                .venue
                .create_loan(asset, &self.config.pair, &amount)
                .await
            {
                Ok(()) => {
                    info!("borrowed {amount} {asset}");
                    return Ok(true);
                }
                Err(e) => {
                    warn!(
                        "borrow of {amount} {asset} refused (attempt {attempt}/{}): {e}",
                        self.config.borrow_attempts
                    );
                    if attempt < self.config.borrow_attempts {
                        sleep(Duration::from_secs(
                            self.config.borrow_delay_secs * u64::from(attempt),
                        ))
                        .await;
                    }
                }
            }
        }
        Ok(false)
    }

    /// Net account value in quote terms, plus the price used to value the
    /// base leg.
    async fn account_equity(&self) -> BotResult<(Decimal, Decimal)> {
        let snapshot = self
            .config
            .retry
            .run("margin snapshot", || {
                let venue = Arc::clone(&self.venue);
                let pair = self.config.pair.clone();
                async move { venue.margin_snapshot(&pair).await }
            })
            .await?;
        let price = self
            .config
            .retry
            .run("average price", || {
                let venue = Arc::clone(&self.venue);
                let pair = self.config.pair.clone();
                async move { venue.average_price(&pair).await }
            })
            .await?;
        let price = numeric::parse(&price)?;
        let base_net = numeric::parse(&snapshot.base_total)? - numeric::parse(&snapshot.base_borrowed)?;
        let quote_net =
            numeric::parse(&snapshot.quote_total)? - numeric::parse(&snapshot.quote_borrowed)?;
        Ok((base_net * price + quote_net, price))
    }

    /// Lot size for the cycle's market entry: a fixed fraction of the
    /// borrowed pool, priced at the current touch for longs.
    fn entry_quantity(
        &self,
        direction: Direction,
        pools: PoolSnapshot,
        quote: &Quote,
    ) -> BotResult<Decimal> {
        let quantity = match direction {
            Direction::Long => {
                let bid = numeric::parse(&quote.bid)?;
                if bid <= Decimal::ZERO {
                    return Ok(Decimal::ZERO);
                }
                pools.quote_borrowed / bid / self.config.lot_divisor
            }
            Direction::Short => pools.base_borrowed / self.config.lot_divisor,
        };
        Ok(numeric::truncate(quantity, self.config.quantity_decimals).normalize())
    }

    /// Watch quotes until the cycle finishes or the stop threshold is
    /// crossed, whichever comes first.
    async fn monitor(
        &self,
        cycle: u64,
        done: watch::Receiver<Option<CycleOutcome>>,
        direction: Direction,
        stop: Decimal,
    ) -> BotResult<CycleOutcome> {
        loop {
            if let Some(outcome) = *done.borrow() {
                return Ok(outcome);
            }
            if let Some(quote) = self.quotes.latest().await {
                let touch = match direction {
                    Direction::Long => numeric::parse(&quote.bid)?,
                    Direction::Short => numeric::parse(&quote.ask)?,
                };
                let breached = match direction {
                    Direction::Long => touch <= stop,
                    Direction::Short => touch >= stop,
                };
                if breached {
                    self.close_at_stop(cycle).await?;
                    continue;
                }
            }
            sleep(self.poll_interval()).await;
        }
    }

    /// Market-close the whole position under the order lock. A cycle that
    /// finished while this call waited for the lock is left alone.
    async fn close_at_stop(&self, cycle: u64) -> BotResult<()> {
        let guard = self.cycle.lock().await;
        let Some(state) = guard.as_ref() else {
            return Ok(());
        };
        if state.cycle != cycle || state.is_finished() {
            return Ok(());
        }
        warn!(
            "cycle {cycle}: stop threshold crossed, closing {} at market",
            state.total_quantity
        );
        cancel_resting(&*self.venue, &self.config.pair).await?;
        let quantity = state.total_quantity.clone();
        self.place_market(state.direction.exit_side(), &quantity)
            .await?;
        state.finish(CycleOutcome::StopLoss);
        Ok(())
    }

    /// Entry point for the execution feed supervisor.
    pub async fn handle_execution(&self, report: ExecutionReport) {
        if let Err(e) = self.process_execution(&report).await {
            warn!("execution report handling failed: {e}");
        }
    }

    async fn process_execution(&self, report: &ExecutionReport) -> BotResult<()> {
        if report.symbol != self.config.pair.symbol()
            || report.status != OrderStatus::Filled
            || report.kind != OrderKind::Limit
        {
            return Ok(());
        }
        let Some(tag) = report.tag else {
            return Ok(());
        };

        let mut guard = self.cycle.lock().await;
        let Some(state) = guard.as_mut() else {
            debug!("dropping fill {tag}: no cycle in flight");
            return Ok(());
        };
        if tag.cycle != state.cycle || state.is_finished() {
            debug!("dropping stale fill {tag} during cycle {}", state.cycle);
            return Ok(());
        }

        match tag.role {
            OrderRole::TakeProfit => {
                info!(
                    "cycle {}: take-profit filled {} at {}",
                    state.cycle, report.quantity, report.price
                );
                state.finish(CycleOutcome::TakeProfit);
                Ok(())
            }
            OrderRole::ReentryLot1 => self.escalate(state, report, true).await,
            OrderRole::ReentryLot2 => self.escalate(state, report, false).await,
            // Entries are market orders; a limit fill with this role is
            // not ours.
            OrderRole::Entry => Ok(()),
        }
    }

    /// A re-entry lot filled: fold it into the position, tear down the old
    /// bracket and re-issue the take-profit around the new fill, plus the
    /// next ladder rung after the first escalation. Any failure here
    /// leaves the bracket in an unknown shape, so the cycle is marked
    /// aborted for the normalizer to clean up.
    async fn escalate(
        &self,
        state: &mut CycleState,
        report: &ExecutionReport,
        place_next_lot: bool,
    ) -> BotResult<()> {
        state.add_quantity(&report.quantity)?;
        info!(
            "cycle {}: re-entry filled {} at {}, position now {}",
            state.cycle, report.quantity, report.price, state.total_quantity
        );

        let cycle = state.cycle;
        let direction = state.direction;
        let result = async {
            cancel_resting(&*self.venue, &self.config.pair).await?;
            let fill_price = numeric::parse(&report.price)?;
            let take_profit = self.place_limit(
                direction.exit_side(),
                &state.total_quantity,
                state.take_profit_price(fill_price),
                OrderTag::new(OrderRole::TakeProfit, cycle),
            );
            if place_next_lot {
                tokio::try_join!(
                    take_profit,
                    // Next rung doubles down with the whole position size.
                    self.place_limit(
                        direction.entry_side(),
                        &state.total_quantity,
                        state.reentry_price(2),
                        OrderTag::new(OrderRole::ReentryLot2, cycle),
                    ),
                )?;
            } else {
                take_profit.await?;
            }
            Ok::<(), BotError>(())
        }
        .await;

        if result.is_err() {
            state.finish(CycleOutcome::Aborted);
        }
        result
    }

    async fn place_market(&self, side: OrderSide, quantity: &str) -> BotResult<MarketFill> {
        self.config
            .retry
            .run("market order", || {
                let venue = Arc::clone(&self.venue);
                let pair = self.config.pair.clone();
                let quantity = quantity.to_string();
                async move { venue.place_market_order(&pair, side, &quantity).await }
            })
            .await
    }

    async fn place_limit(
        &self,
        side: OrderSide,
        quantity: &str,
        price: Decimal,
        tag: OrderTag,
    ) -> BotResult<()> {
        let price = numeric::truncate(price, self.config.price_decimals)
            .normalize()
            .to_string();
        self.config
            .retry
            .run("limit order", || {
                let venue = Arc::clone(&self.venue);
                let pair = self.config.pair.clone();
                let quantity = quantity.to_string();
                let price = price.clone();
                async move {
                    venue
                        .place_limit_order(&pair, side, &quantity, &price, tag)
                        .await
                }
            })
            .await
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::venue::mock::MockVenue;
    use crate::venue::{Candle, MarginSnapshot};
    use rust_decimal_macros::dec;
    use tokio::time::timeout;

    fn snapshot_from(sma: f64, reference: f64, close: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            sma_open: sma,
            ref_open: reference,
            last_close: close,
        }
    }

    #[test]
    fn direction_from_indicator_shape() {
        assert_eq!(
            trend_direction(&snapshot_from(95.0, 100.0, 90.0)),
            Some(Direction::Long)
        );
        assert_eq!(
            trend_direction(&snapshot_from(95.0, 90.0, 100.0)),
            Some(Direction::Short)
        );
        assert_eq!(trend_direction(&snapshot_from(95.0, 95.0, 95.0)), None);
        assert_eq!(trend_direction(&snapshot_from(95.0, 100.0, 96.0)), None);
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            spacing_fraction: dec!(0.01),
            poll_interval_ms: 1,
            retry: RetryPolicy::new(3, 1),
            ..EngineConfig::default()
        }
    }

    fn engine_with(venue: Arc<MockVenue>, config: EngineConfig) -> Arc<GridEngine<MockVenue>> {
        let quotes = Arc::new(QuoteCell::new(Duration::from_millis(1)));
        let indicator = Arc::new(IndicatorBuffer::new(config.window, Duration::from_millis(1)));
        Arc::new(GridEngine::new(venue, config, quotes, indicator))
    }

    /// Margin account worth 1000 quote with 820 quote already borrowed.
    async fn fund(venue: &MockVenue) {
        let mut snapshot = MarginSnapshot::zeroed();
        snapshot.quote_total = "1820".into();
        snapshot.quote_borrowed = "820".into();
        venue.set_snapshot(snapshot).await;
    }

    /// Downtrend window: opens 100, 95, 90, closing at 90.
    async fn seed_long_signal(engine: &GridEngine<MockVenue>) {
        engine
            .indicator
            .seed(vec![
                Candle::new(1, "100", "98"),
                Candle::new(2, "95", "93"),
                Candle::new(3, "90", "90"),
            ])
            .await;
    }

    fn filled_limit(tag: OrderTag, price: &str, quantity: &str) -> ExecutionReport {
        ExecutionReport {
            symbol: "BTCUSDT".into(),
            status: OrderStatus::Filled,
            kind: OrderKind::Limit,
            tag: Some(tag),
            price: price.into(),
            quantity: quantity.into(),
        }
    }

    async fn wait_until<F, Fut>(probe: F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        timeout(Duration::from_secs(60), async {
            while !probe().await {
                sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_enters_brackets_and_stops_out() {
        let venue = Arc::new(MockVenue::new("100"));
        fund(&venue).await;
        let engine = engine_with(Arc::clone(&venue), test_config());
        seed_long_signal(&engine).await;
        engine.quotes.publish(Quote::new("100.1", "100")).await;

        let task = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run_cycle(1).await })
        };

        // Entry: 820 quote borrowed / 100 bid / 4.1 lot divisor = 2 base.
        wait_until(|| {
            let venue = Arc::clone(&venue);
            async move { venue.limit_orders.lock().await.len() == 2 }
        })
        .await;
        {
            let market = venue.market_orders.lock().await;
            assert_eq!(market.len(), 1);
            assert_eq!(market[0].side, OrderSide::Buy);
            assert_eq!(market[0].quantity, "2");

            let limits = venue.limit_orders.lock().await;
            let lot1 = limits
                .iter()
                .find(|o| o.tag == OrderTag::new(OrderRole::ReentryLot1, 1))
                .unwrap();
            assert_eq!((lot1.side, lot1.price.as_str()), (OrderSide::Buy, "99"));
            let tp = limits
                .iter()
                .find(|o| o.tag == OrderTag::new(OrderRole::TakeProfit, 1))
                .unwrap();
            assert_eq!((tp.side, tp.price.as_str()), (OrderSide::Sell, "101"));

            assert_eq!(venue.loans.lock().await.as_slice(), &[(
                "USDT".to_string(),
                "9400".to_string()
            )]);
        }

        // Bid through the 3-pitch stop at 97 forces a market close.
        engine.quotes.publish(Quote::new("97", "96.9")).await;
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, Some(CycleOutcome::StopLoss));

        let market = venue.market_orders.lock().await;
        assert_eq!(market.len(), 2);
        assert_eq!(market[1].side, OrderSide::Sell);
        assert_eq!(market[1].quantity, "2");
    }

    #[tokio::test(start_paused = true)]
    async fn take_profit_fill_finishes_the_cycle() {
        let venue = Arc::new(MockVenue::new("100"));
        fund(&venue).await;
        let engine = engine_with(Arc::clone(&venue), test_config());
        seed_long_signal(&engine).await;
        engine.quotes.publish(Quote::new("100.1", "100")).await;

        let task = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run_cycle(1).await })
        };
        wait_until(|| {
            let venue = Arc::clone(&venue);
            async move { venue.limit_orders.lock().await.len() == 2 }
        })
        .await;

        engine
            .handle_execution(filled_limit(
                OrderTag::new(OrderRole::TakeProfit, 1),
                "101",
                "2",
            ))
            .await;

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, Some(CycleOutcome::TakeProfit));
        // No stop-loss close happened.
        assert_eq!(venue.market_orders.lock().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reentry_fill_escalates_the_bracket() {
        let venue = Arc::new(MockVenue::new("100"));
        fund(&venue).await;
        let engine = engine_with(Arc::clone(&venue), test_config());
        seed_long_signal(&engine).await;
        engine.quotes.publish(Quote::new("100.1", "100")).await;

        let task = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run_cycle(1).await })
        };
        wait_until(|| {
            let venue = Arc::clone(&venue);
            async move { venue.limit_orders.lock().await.len() == 2 }
        })
        .await;
        let cancels_before = venue.cancel_count.load(Ordering::SeqCst);

        engine
            .handle_execution(filled_limit(
                OrderTag::new(OrderRole::ReentryLot1, 1),
                "99",
                "2",
            ))
            .await;

        // Old bracket cancelled, take-profit re-priced around the new
        // fill, next ladder rung placed.
        assert_eq!(venue.cancel_count.load(Ordering::SeqCst), cancels_before + 1);
        {
            let limits = venue.limit_orders.lock().await;
            let tp = limits
                .iter()
                .rev()
                .find(|o| o.tag == OrderTag::new(OrderRole::TakeProfit, 1))
                .unwrap();
            assert_eq!((tp.price.as_str(), tp.quantity.as_str()), ("100", "4"));
            let lot2 = limits
                .iter()
                .find(|o| o.tag == OrderTag::new(OrderRole::ReentryLot2, 1))
                .unwrap();
            assert_eq!((lot2.price.as_str(), lot2.quantity.as_str()), ("98", "4"));
        }

        engine
            .handle_execution(filled_limit(
                OrderTag::new(OrderRole::TakeProfit, 1),
                "100",
                "4",
            ))
            .await;
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, Some(CycleOutcome::TakeProfit));
    }

    #[tokio::test(start_paused = true)]
    async fn venue_failure_restarts_the_cycle_instead_of_exiting() {
        let venue = Arc::new(MockVenue::new("100"));
        fund(&venue).await;
        // Every bracket placement exhausts its retry budget.
        venue.fail_limit_orders.store(true, Ordering::SeqCst);
        let engine = engine_with(Arc::clone(&venue), test_config());
        seed_long_signal(&engine).await;
        engine.quotes.publish(Quote::new("100.1", "100")).await;

        let task = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run().await })
        };

        // A second borrow means the loop survived the first cycle's
        // failed placements and went around again.
        wait_until(|| {
            let venue = Arc::clone(&venue);
            async move { venue.loans.lock().await.len() >= 2 }
        })
        .await;
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn fills_without_a_cycle_are_dropped() {
        let venue = Arc::new(MockVenue::new("100"));
        let engine = engine_with(Arc::clone(&venue), test_config());

        engine
            .handle_execution(filled_limit(
                OrderTag::new(OrderRole::ReentryLot1, 7),
                "99",
                "2",
            ))
            .await;

        assert!(venue.limit_orders.lock().await.is_empty());
        assert_eq!(venue.cancel_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_cycle_fills_are_dropped() {
        let venue = Arc::new(MockVenue::new("100"));
        let engine = engine_with(Arc::clone(&venue), test_config());

        let (mut state, _rx) = CycleState::new(2, Direction::Long);
        state.filled_price = dec!(100);
        state.pitch = dec!(1);
        state.add_quantity("2").unwrap();
        *engine.cycle.lock().await = Some(state);

        // Tagged for cycle 1 while cycle 2 is in flight.
        engine
            .handle_execution(filled_limit(
                OrderTag::new(OrderRole::ReentryLot1, 1),
                "99",
                "2",
            ))
            .await;

        assert!(venue.limit_orders.lock().await.is_empty());
        let guard = engine.cycle.lock().await;
        assert_eq!(guard.as_ref().unwrap().total_quantity, "2");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_exit_paths_close_at_most_once() {
        let venue = Arc::new(MockVenue::new("100"));
        let engine = engine_with(Arc::clone(&venue), test_config());

        let (mut state, rx) = CycleState::new(1, Direction::Long);
        state.filled_price = dec!(100);
        state.pitch = dec!(1);
        state.add_quantity("2").unwrap();
        *engine.cycle.lock().await = Some(state);

        let stop_path = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.close_at_stop(1).await })
        };
        let tp_path = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .handle_execution(filled_limit(
                        OrderTag::new(OrderRole::TakeProfit, 1),
                        "101",
                        "2",
                    ))
                    .await
            })
        };
        stop_path.await.unwrap().unwrap();
        tp_path.await.unwrap();

        // Whichever path won recorded the outcome; the loser backed off.
        let outcome = *rx.borrow();
        let closes = venue.market_orders.lock().await.len();
        match outcome.unwrap() {
            CycleOutcome::StopLoss => assert_eq!(closes, 1),
            CycleOutcome::TakeProfit => assert_eq!(closes, 0),
            CycleOutcome::Aborted => panic!("no abort path was exercised"),
        }
    }
}
