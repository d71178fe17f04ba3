//! Simulated venue for paper trading.
//!
//! Runs a random-walk price process entirely in memory: market orders fill
//! at the current touch, resting limit orders fill when the walk crosses
//! their price (emitting tagged execution reports), and loans move amounts
//! between the pair's borrowed and free pools. No real money, no network.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

use crate::numeric;

use super::errors::{VenueError, VenueResult};
use super::types::{
    Candle, ExecutionReport, MarginSnapshot, MarketFill, OrderKind, OrderSide, OrderStatus,
    OrderTag, Quote, TradingPair,
};
use super::MarginVenue;

/// Simulated venue parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimVenueConfig {
    /// Starting mid price of the walk
    pub start_price: Decimal,
    /// Initial free quote balance
    pub quote_balance: Decimal,
    /// Wall-clock interval between walk steps
    pub tick_interval_ms: u64,
    /// Half-spread applied around the mid, in basis points
    pub half_spread_bps: u32,
    /// Maximum per-step drift, in basis points
    pub step_bps: u32,
    /// Walk steps per emitted candle
    pub candle_ticks: u32,
    /// Decimal places for published prices
    pub price_decimals: u32,
}

impl Default for SimVenueConfig {
    fn default() -> Self {
        Self {
            start_price: Decimal::new(100, 0),
            quote_balance: Decimal::new(10_000, 0),
            tick_interval_ms: 100,
            half_spread_bps: 1,
            step_bps: 5,
            candle_ticks: 10,
            price_decimals: 2,
        }
    }
}

#[derive(Debug)]
struct RestingOrder {
    id: Uuid,
    side: OrderSide,
    quantity: Decimal,
    price: Decimal,
    tag: OrderTag,
}

#[derive(Debug)]
struct SimState {
    mid: Decimal,
    base_free: Decimal,
    base_borrowed: Decimal,
    quote_free: Decimal,
    quote_borrowed: Decimal,
    resting: Vec<RestingOrder>,
    candle_open: Decimal,
    candle_open_time: i64,
    ticks_in_candle: u32,
    quote_subs: Vec<UnboundedSender<Quote>>,
    candle_subs: Vec<UnboundedSender<Candle>>,
    exec_subs: Vec<UnboundedSender<ExecutionReport>>,
}

/// In-process paper-trading venue
#[derive(Clone)]
pub struct SimVenue {
    config: SimVenueConfig,
    state: Arc<Mutex<SimState>>,
}

impl SimVenue {
    pub fn new(config: SimVenueConfig) -> Self {
        let state = SimState {
            mid: config.start_price,
            base_free: Decimal::ZERO,
            base_borrowed: Decimal::ZERO,
            quote_free: config.quote_balance,
            quote_borrowed: Decimal::ZERO,
            resting: Vec::new(),
            candle_open: config.start_price,
            candle_open_time: Utc::now().timestamp_millis(),
            ticks_in_candle: 0,
            quote_subs: Vec::new(),
            candle_subs: Vec::new(),
            exec_subs: Vec::new(),
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Start the price process; runs until the handle is dropped/aborted.
    pub fn start(&self, pair: TradingPair) -> JoinHandle<()> {
        let venue = self.clone();
        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            info!(
                "sim venue started for {} at {}",
                pair, venue.config.start_price
            );
            loop {
                sleep(Duration::from_millis(venue.config.tick_interval_ms)).await;
                let drift: f64 =
                    rng.gen_range(-1.0..=1.0) * venue.config.step_bps as f64 / 10_000.0;
                let factor = Decimal::from_f64(1.0 + drift).unwrap_or(Decimal::ONE);
                let mid = {
                    let state = venue.state.lock().await;
                    state.mid * factor
                };
                venue.advance_to(&pair, mid).await;
            }
        })
    }

    /// Move the walk to `mid`, broadcasting a quote, rolling candles and
    /// filling any resting order the move crossed. Public so tests can
    /// drive the price deterministically.
    pub async fn advance_to(&self, pair: &TradingPair, mid: Decimal) {
        let mut state = self.state.lock().await;
        state.mid = mid;

        let half_spread =
            mid * Decimal::from(self.config.half_spread_bps) / Decimal::from(10_000u32);
        let quote = Quote::new(
            numeric::truncate(mid + half_spread, self.config.price_decimals).to_string(),
            numeric::truncate(mid - half_spread, self.config.price_decimals).to_string(),
        );
        state.quote_subs.retain(|tx| tx.send(quote.clone()).is_ok());

        state.ticks_in_candle += 1;
        if state.ticks_in_candle >= self.config.candle_ticks {
            let candle = Candle::new(
                state.candle_open_time,
                state.candle_open.to_string(),
                numeric::truncate(mid, self.config.price_decimals).to_string(),
            );
            state.candle_subs.retain(|tx| tx.send(candle.clone()).is_ok());
            state.candle_open = mid;
            state.candle_open_time = Utc::now().timestamp_millis();
            state.ticks_in_candle = 0;
        }

        // Fill resting orders the move crossed.
        let crossed: Vec<RestingOrder> = {
            let mid = state.mid;
            let (crossed, still_resting) = state.resting.drain(..).partition(|o| match o.side {
                OrderSide::Buy => mid <= o.price,
                OrderSide::Sell => mid >= o.price,
            });
            state.resting = still_resting;
            crossed
        };
        for order in crossed {
            debug!("sim fill: {} {} @ {} ({})", order.side, order.quantity, order.price, order.id);
            Self::apply_fill(&mut state, order.side, order.quantity, order.price);
            let report = ExecutionReport {
                symbol: pair.symbol(),
                status: OrderStatus::Filled,
                kind: OrderKind::Limit,
                tag: Some(order.tag),
                price: order.price.to_string(),
                quantity: order.quantity.to_string(),
            };
            state.exec_subs.retain(|tx| tx.send(report.clone()).is_ok());
        }
    }

    fn apply_fill(state: &mut SimState, side: OrderSide, quantity: Decimal, price: Decimal) {
        match side {
            OrderSide::Buy => {
                state.base_free += quantity;
                state.quote_free -= quantity * price;
            }
            OrderSide::Sell => {
                state.base_free -= quantity;
                state.quote_free += quantity * price;
            }
        }
    }

    fn touch(&self, state: &SimState, side: OrderSide) -> Decimal {
        let half_spread =
            state.mid * Decimal::from(self.config.half_spread_bps) / Decimal::from(10_000u32);
        let touch = match side {
            OrderSide::Buy => state.mid + half_spread,
            OrderSide::Sell => state.mid - half_spread,
        };
        numeric::truncate(touch, self.config.price_decimals)
    }

    fn parse_amount(value: &str) -> VenueResult<Decimal> {
        let amount =
            numeric::parse(value).map_err(|e| VenueError::Rejected(e.to_string()))?;
        if amount <= Decimal::ZERO {
            return Err(VenueError::Rejected(format!("non-positive amount {value}")));
        }
        Ok(amount)
    }
}

#[async_trait]
impl MarginVenue for SimVenue {
    async fn recent_candles(
        &self,
        _pair: &TradingPair,
        _interval: &str,
    ) -> VenueResult<Vec<Candle>> {
        // Flat synthetic history; the indicator abstains until the live
        // walk produces a trend.
        let state = self.state.lock().await;
        let price = numeric::truncate(state.mid, self.config.price_decimals).to_string();
        let now = Utc::now().timestamp_millis();
        Ok((0..5)
            .map(|i| Candle::new(now - 1_000 * (5 - i), price.clone(), price.clone()))
            .collect())
    }

    async fn subscribe_quotes(&self, _pair: &TradingPair) -> VenueResult<UnboundedReceiver<Quote>> {
        let (tx, rx) = unbounded_channel();
        self.state.lock().await.quote_subs.push(tx);
        Ok(rx)
    }

    async fn subscribe_candles(
        &self,
        _pair: &TradingPair,
        _interval: &str,
    ) -> VenueResult<UnboundedReceiver<Candle>> {
        let (tx, rx) = unbounded_channel();
        self.state.lock().await.candle_subs.push(tx);
        Ok(rx)
    }

    async fn subscribe_executions(
        &self,
        _pair: &TradingPair,
    ) -> VenueResult<UnboundedReceiver<ExecutionReport>> {
        let (tx, rx) = unbounded_channel();
        self.state.lock().await.exec_subs.push(tx);
        Ok(rx)
    }

    async fn place_market_order(
        &self,
        _pair: &TradingPair,
        side: OrderSide,
        quantity: &str,
    ) -> VenueResult<MarketFill> {
        let quantity = Self::parse_amount(quantity)?;
        let mut state = self.state.lock().await;
        let price = self.touch(&state, side);
        Self::apply_fill(&mut state, side, quantity, price);
        Ok(MarketFill {
            price: price.to_string(),
            quantity: quantity.to_string(),
        })
    }

    async fn place_limit_order(
        &self,
        _pair: &TradingPair,
        side: OrderSide,
        quantity: &str,
        price: &str,
        tag: OrderTag,
    ) -> VenueResult<()> {
        let quantity = Self::parse_amount(quantity)?;
        let price = Self::parse_amount(price)?;
        let mut state = self.state.lock().await;
        state.resting.push(RestingOrder {
            id: Uuid::new_v4(),
            side,
            quantity,
            price,
            tag,
        });
        Ok(())
    }

    async fn cancel_all_orders(&self, _pair: &TradingPair) -> VenueResult<()> {
        let mut state = self.state.lock().await;
        if state.resting.is_empty() {
            return Err(VenueError::NoOpenOrders);
        }
        state.resting.clear();
        Ok(())
    }

    async fn margin_snapshot(&self, _pair: &TradingPair) -> VenueResult<MarginSnapshot> {
        let state = self.state.lock().await;
        Ok(MarginSnapshot {
            base_borrowed: state.base_borrowed.to_string(),
            base_free: state.base_free.to_string(),
            base_total: state.base_free.to_string(),
            quote_borrowed: state.quote_borrowed.to_string(),
            quote_free: state.quote_free.to_string(),
            quote_total: state.quote_free.to_string(),
        })
    }

    async fn average_price(&self, _pair: &TradingPair) -> VenueResult<String> {
        let state = self.state.lock().await;
        Ok(numeric::truncate(state.mid, self.config.price_decimals).to_string())
    }

    async fn create_loan(&self, asset: &str, pair: &TradingPair, amount: &str) -> VenueResult<()> {
        let amount = Self::parse_amount(amount)?;
        let mut state = self.state.lock().await;
        if asset == pair.base {
            state.base_borrowed += amount;
            state.base_free += amount;
        } else if asset == pair.quote {
            state.quote_borrowed += amount;
            state.quote_free += amount;
        } else {
            return Err(VenueError::Rejected(format!(
                "asset {asset} not part of {pair}"
            )));
        }
        Ok(())
    }

    async fn repay_loan(&self, asset: &str, pair: &TradingPair, amount: &str) -> VenueResult<()> {
        let amount = Self::parse_amount(amount)?;
        let mut state = self.state.lock().await;
        let state = &mut *state;
        let (borrowed, free) = if asset == pair.base {
            (&mut state.base_borrowed, &mut state.base_free)
        } else if asset == pair.quote {
            (&mut state.quote_borrowed, &mut state.quote_free)
        } else {
            return Err(VenueError::Rejected(format!(
                "asset {asset} not part of {pair}"
            )));
        };
        if amount > *borrowed {
            return Err(VenueError::Rejected(format!(
                "repay {amount} exceeds borrowed {borrowed}"
            )));
        }
        if amount > *free {
            return Err(VenueError::InsufficientMargin(format!(
                "repay {amount} exceeds free balance {free}"
            )));
        }
        *borrowed -= amount;
        *free -= amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::types::OrderRole;
    use rust_decimal_macros::dec;

    fn pair() -> TradingPair {
        TradingPair::new("BTC", "USDT")
    }

    fn venue() -> SimVenue {
        SimVenue::new(SimVenueConfig {
            start_price: dec!(100),
            quote_balance: dec!(10_000),
            ..SimVenueConfig::default()
        })
    }

    #[tokio::test]
    async fn market_buy_moves_balances() {
        let venue = venue();
        let fill = venue
            .place_market_order(&pair(), OrderSide::Buy, "2")
            .await
            .unwrap();

        // Touch is mid plus half a spread (1 bp on 100 = 0.01).
        assert_eq!(fill.price, "100.01");
        let snap = venue.margin_snapshot(&pair()).await.unwrap();
        assert_eq!(snap.base_free, "2");
        assert_eq!(numeric::sub(&snap.quote_free, "9799.98").unwrap(), "0.00");
    }

    #[tokio::test]
    async fn limit_order_fills_when_walk_crosses() {
        let venue = venue();
        let mut reports = venue.subscribe_executions(&pair()).await.unwrap();
        let tag = OrderTag::new(OrderRole::ReentryLot1, 1);
        venue
            .place_limit_order(&pair(), OrderSide::Buy, "1", "99", tag)
            .await
            .unwrap();

        venue.advance_to(&pair(), dec!(99.5)).await;
        assert!(reports.try_recv().is_err());

        venue.advance_to(&pair(), dec!(98.7)).await;
        let report = reports.try_recv().unwrap();
        assert_eq!(report.tag, Some(tag));
        assert_eq!(report.price, "99");
        assert_eq!(report.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn loans_round_trip_through_pools() {
        let venue = venue();
        venue.create_loan("USDT", &pair(), "500").await.unwrap();
        let snap = venue.margin_snapshot(&pair()).await.unwrap();
        assert_eq!(snap.quote_borrowed, "500");
        assert_eq!(snap.quote_free, "10500");

        venue.repay_loan("USDT", &pair(), "500").await.unwrap();
        let snap = venue.margin_snapshot(&pair()).await.unwrap();
        assert_eq!(snap.quote_borrowed, "0");

        let err = venue.repay_loan("USDT", &pair(), "1").await.unwrap_err();
        assert!(matches!(err, VenueError::Rejected(_)));
    }

    #[tokio::test]
    async fn cancel_all_reports_no_orders_when_empty() {
        let venue = venue();
        let err = venue.cancel_all_orders(&pair()).await.unwrap_err();
        assert!(err.is_benign_cancel());
    }
}
