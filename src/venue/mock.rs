//! Instrumented in-memory venue for tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use super::errors::{VenueError, VenueResult};
use super::types::{
    Candle, ExecutionReport, MarginSnapshot, MarketFill, OrderSide, OrderTag, Quote, TradingPair,
};
use super::MarginVenue;

/// Recorded market order
#[derive(Debug, Clone)]
pub struct MarketOrderRecord {
    pub side: OrderSide,
    pub quantity: String,
}

/// Recorded limit order
#[derive(Debug, Clone)]
pub struct LimitOrderRecord {
    pub side: OrderSide,
    pub quantity: String,
    pub price: String,
    pub tag: OrderTag,
}

/// Test double recording every mutation and replaying scripted responses.
pub struct MockVenue {
    pub market_orders: Mutex<Vec<MarketOrderRecord>>,
    pub limit_orders: Mutex<Vec<LimitOrderRecord>>,
    pub loans: Mutex<Vec<(String, String)>>,
    pub repayments: Mutex<Vec<(String, String)>>,
    pub cancel_count: AtomicU32,

    /// Snapshot returned by `margin_snapshot`
    pub snapshot: Mutex<MarginSnapshot>,
    /// Price returned by `average_price`
    pub avg_price: Mutex<String>,
    /// Fill price returned by `place_market_order`
    pub market_fill_price: Mutex<String>,
    /// Candles returned by `recent_candles`
    pub candles: Mutex<Vec<Candle>>,

    /// When set, `create_loan` and `repay_loan` fail with `InsufficientMargin`
    pub fail_loans: AtomicBool,
    /// When set, `place_limit_order` fails with `Recoverable`
    pub fail_limit_orders: AtomicBool,
    /// When set, `cancel_all_orders` reports `NoOpenOrders`
    pub nothing_to_cancel: AtomicBool,

    quote_subs: Mutex<Vec<UnboundedSender<Quote>>>,
    candle_subs: Mutex<Vec<UnboundedSender<Candle>>>,
    exec_subs: Mutex<Vec<UnboundedSender<ExecutionReport>>>,
}

impl MockVenue {
    /// Mock priced flat at `price` with a zeroed margin account.
    pub fn new(price: &str) -> Self {
        Self {
            market_orders: Mutex::new(Vec::new()),
            limit_orders: Mutex::new(Vec::new()),
            loans: Mutex::new(Vec::new()),
            repayments: Mutex::new(Vec::new()),
            cancel_count: AtomicU32::new(0),
            snapshot: Mutex::new(MarginSnapshot::zeroed()),
            avg_price: Mutex::new(price.to_string()),
            market_fill_price: Mutex::new(price.to_string()),
            candles: Mutex::new(Vec::new()),
            fail_loans: AtomicBool::new(false),
            fail_limit_orders: AtomicBool::new(false),
            nothing_to_cancel: AtomicBool::new(false),
            quote_subs: Mutex::new(Vec::new()),
            candle_subs: Mutex::new(Vec::new()),
            exec_subs: Mutex::new(Vec::new()),
        }
    }

    pub async fn set_snapshot(&self, snapshot: MarginSnapshot) {
        *self.snapshot.lock().await = snapshot;
    }

    pub async fn push_quote(&self, quote: Quote) {
        self.quote_subs
            .lock()
            .await
            .retain(|tx| tx.send(quote.clone()).is_ok());
    }

    pub async fn push_candle(&self, candle: Candle) {
        self.candle_subs
            .lock()
            .await
            .retain(|tx| tx.send(candle.clone()).is_ok());
    }

    pub async fn push_execution(&self, report: ExecutionReport) {
        self.exec_subs
            .lock()
            .await
            .retain(|tx| tx.send(report.clone()).is_ok());
    }

    pub async fn limit_order_tags(&self) -> Vec<OrderTag> {
        self.limit_orders.lock().await.iter().map(|o| o.tag).collect()
    }
}

#[async_trait]
impl MarginVenue for MockVenue {
    async fn recent_candles(
        &self,
        _pair: &TradingPair,
        _interval: &str,
    ) -> VenueResult<Vec<Candle>> {
        Ok(self.candles.lock().await.clone())
    }

    async fn subscribe_quotes(&self, _pair: &TradingPair) -> VenueResult<UnboundedReceiver<Quote>> {
        let (tx, rx) = unbounded_channel();
        self.quote_subs.lock().await.push(tx);
        Ok(rx)
    }

    async fn subscribe_candles(
        &self,
        _pair: &TradingPair,
        _interval: &str,
    ) -> VenueResult<UnboundedReceiver<Candle>> {
        let (tx, rx) = unbounded_channel();
        self.candle_subs.lock().await.push(tx);
        Ok(rx)
    }

    async fn subscribe_executions(
        &self,
        _pair: &TradingPair,
    ) -> VenueResult<UnboundedReceiver<ExecutionReport>> {
        let (tx, rx) = unbounded_channel();
        self.exec_subs.lock().await.push(tx);
        Ok(rx)
    }

    async fn place_market_order(
        &self,
        _pair: &TradingPair,
        side: OrderSide,
        quantity: &str,
    ) -> VenueResult<MarketFill> {
        self.market_orders.lock().await.push(MarketOrderRecord {
            side,
            quantity: quantity.to_string(),
        });
        Ok(MarketFill {
            price: self.market_fill_price.lock().await.clone(),
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
        if self.fail_limit_orders.load(Ordering::SeqCst) {
            return Err(VenueError::Recoverable("order gateway busy".into()));
        }
        self.limit_orders.lock().await.push(LimitOrderRecord {
            side,
            quantity: quantity.to_string(),
            price: price.to_string(),
            tag,
        });
        Ok(())
    }

    async fn cancel_all_orders(&self, _pair: &TradingPair) -> VenueResult<()> {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
        if self.nothing_to_cancel.load(Ordering::SeqCst) {
            return Err(VenueError::NoOpenOrders);
        }
        Ok(())
    }

    async fn margin_snapshot(&self, _pair: &TradingPair) -> VenueResult<MarginSnapshot> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn average_price(&self, _pair: &TradingPair) -> VenueResult<String> {
        Ok(self.avg_price.lock().await.clone())
    }

    async fn create_loan(
        &self,
        asset: &str,
        _pair: &TradingPair,
        amount: &str,
    ) -> VenueResult<()> {
        if self.fail_loans.load(Ordering::SeqCst) {
            return Err(VenueError::InsufficientMargin(format!(
                "loan of {amount} {asset} refused"
            )));
        }
        self.loans
            .lock()
            .await
            .push((asset.to_string(), amount.to_string()));
        Ok(())
    }

    async fn repay_loan(&self, asset: &str, _pair: &TradingPair, amount: &str) -> VenueResult<()> {
        if self.fail_loans.load(Ordering::SeqCst) {
            return Err(VenueError::InsufficientMargin(format!(
                "repay of {amount} {asset} refused"
            )));
        }
        self.repayments
            .lock()
            .await
            .push((asset.to_string(), amount.to_string()));
        Ok(())
    }
}
