//! Venue collaborator seam.
//!
//! The engine never speaks a wire protocol itself; it depends on the
//! [`MarginVenue`] trait for authenticated order placement, margin account
//! queries and push-based market/execution feeds. Live adapters implement
//! this trait out of tree; [`mock::MockVenue`] backs the test suite and
//! [`sim::SimVenue`] backs paper trading.

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

pub mod errors;
pub mod mock;
pub mod sim;
pub mod types;

pub use errors::{VenueError, VenueResult};
pub use sim::{SimVenue, SimVenueConfig};
pub use types::{
    Candle, ExecutionReport, MarginSnapshot, MarketFill, OrderKind, OrderRole, OrderSide,
    OrderStatus, OrderTag, ParseTagError, Quote, TradingPair,
};

/// Abstract contract the engine depends on, for one isolated-margin pair.
///
/// Subscriptions hand back a receiver; the sender side closing models a
/// feed disconnect, after which the supervisors resubscribe. Quantities,
/// prices and amounts are decimal strings throughout (see
/// [`crate::numeric`]).
#[async_trait]
pub trait MarginVenue: Send + Sync {
    /// Historical candles for seeding the indicator, oldest first.
    async fn recent_candles(&self, pair: &TradingPair, interval: &str)
        -> VenueResult<Vec<Candle>>;

    /// Stream of best bid/ask ticks.
    async fn subscribe_quotes(&self, pair: &TradingPair) -> VenueResult<UnboundedReceiver<Quote>>;

    /// Stream of candle updates.
    async fn subscribe_candles(
        &self,
        pair: &TradingPair,
        interval: &str,
    ) -> VenueResult<UnboundedReceiver<Candle>>;

    /// Stream of execution reports for the pair.
    async fn subscribe_executions(
        &self,
        pair: &TradingPair,
    ) -> VenueResult<UnboundedReceiver<ExecutionReport>>;

    /// Place a market order; returns the fill.
    async fn place_market_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        quantity: &str,
    ) -> VenueResult<MarketFill>;

    /// Place a GTC limit order carrying `tag` as its client order id.
    async fn place_limit_order(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        quantity: &str,
        price: &str,
        tag: OrderTag,
    ) -> VenueResult<()>;

    /// Cancel every resting order for the pair.
    ///
    /// Fails with [`VenueError::NoOpenOrders`] when nothing is resting;
    /// callers treat that as success.
    async fn cancel_all_orders(&self, pair: &TradingPair) -> VenueResult<()>;

    /// Borrowed/held amounts for both legs of the isolated pair.
    async fn margin_snapshot(&self, pair: &TradingPair) -> VenueResult<MarginSnapshot>;

    /// Venue's current average price for the pair.
    async fn average_price(&self, pair: &TradingPair) -> VenueResult<String>;

    /// Borrow `amount` of `asset` against the isolated pair's collateral.
    async fn create_loan(&self, asset: &str, pair: &TradingPair, amount: &str) -> VenueResult<()>;

    /// Repay `amount` of an outstanding `asset` loan.
    async fn repay_loan(&self, asset: &str, pair: &TradingPair, amount: &str) -> VenueResult<()>;
}

/// Cancel all resting orders, treating "nothing to cancel" as success.
pub async fn cancel_resting<V: MarginVenue + ?Sized>(
    venue: &V,
    pair: &TradingPair,
) -> VenueResult<()> {
    match venue.cancel_all_orders(pair).await {
        Err(e) if e.is_benign_cancel() => Ok(()),
        other => other,
    }
}
