//! Wire-level types shared with the venue collaborator.
//!
//! Prices and quantities stay decimal strings at this boundary, exactly as
//! venues deliver them; the engine converts through [`crate::numeric`]
//! when it needs to do arithmetic.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An isolated-margin trading pair, e.g. BTC/USDT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingPair {
    /// Base asset (the coin being traded, e.g. "BTC")
    pub base: String,
    /// Quote asset (the pricing currency, e.g. "USDT")
    pub quote: String,
}

impl TradingPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Venue symbol form, e.g. "BTCUSDT".
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Order execution kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Market,
    Limit,
}

/// Execution status carried on a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
}

/// Which step of the grid cascade an order belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRole {
    /// Market entry, lot 0
    Entry,
    /// First limit re-entry, one pitch adverse of the entry fill
    ReentryLot1,
    /// Second limit re-entry, two pitches adverse of the entry fill
    ReentryLot2,
    /// Limit exit one pitch in the favorable direction
    TakeProfit,
}

impl OrderRole {
    fn as_str(&self) -> &'static str {
        match self {
            OrderRole::Entry => "lot0",
            OrderRole::ReentryLot1 => "lot1",
            OrderRole::ReentryLot2 => "lot2",
            OrderRole::TakeProfit => "tp",
        }
    }
}

/// Synthetic order identifier correlating execution reports with cascade
/// steps. Matched by structural equality on (role, cycle), never by raw
/// exchange order ids; the string form exists only to ride in the venue's
/// client-order-id field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTag {
    pub role: OrderRole,
    pub cycle: u64,
}

impl OrderTag {
    pub fn new(role: OrderRole, cycle: u64) -> Self {
        Self { role, cycle }
    }
}

impl fmt::Display for OrderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.role.as_str(), self.cycle)
    }
}

/// Error parsing an order tag from its client-order-id form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized order tag '{0}'")]
pub struct ParseTagError(pub String);

impl FromStr for OrderTag {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (role, cycle) = s.rsplit_once('-').ok_or_else(|| ParseTagError(s.into()))?;
        let role = match role {
            "lot0" => OrderRole::Entry,
            "lot1" => OrderRole::ReentryLot1,
            "lot2" => OrderRole::ReentryLot2,
            "tp" => OrderRole::TakeProfit,
            _ => return Err(ParseTagError(s.into())),
        };
        let cycle = cycle.parse().map_err(|_| ParseTagError(s.into()))?;
        Ok(Self { role, cycle })
    }
}

/// Last-known best prices for a pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub ask: String,
    pub bid: String,
}

impl Quote {
    pub fn new(ask: impl Into<String>, bid: impl Into<String>) -> Self {
        Self {
            ask: ask.into(),
            bid: bid.into(),
        }
    }
}

/// One candle sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candle {
    /// Candle open time, milliseconds since epoch
    pub open_time: i64,
    pub open: String,
    pub close: String,
}

impl Candle {
    pub fn new(open_time: i64, open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open_time,
            open: open.into(),
            close: close.into(),
        }
    }
}

/// Result of a market order
#[derive(Debug, Clone)]
pub struct MarketFill {
    pub price: String,
    pub quantity: String,
}

/// Push-based execution report for the pair
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Venue symbol, e.g. "BTCUSDT"
    pub symbol: String,
    pub status: OrderStatus,
    pub kind: OrderKind,
    /// Parsed client-order-id tag, if the order carried one
    pub tag: Option<OrderTag>,
    pub price: String,
    pub quantity: String,
}

/// Borrowed and held amounts for both legs of an isolated pair
#[derive(Debug, Clone)]
pub struct MarginSnapshot {
    pub base_borrowed: String,
    pub base_free: String,
    pub base_total: String,
    pub quote_borrowed: String,
    pub quote_free: String,
    pub quote_total: String,
}

impl MarginSnapshot {
    /// Snapshot with every field zero, for tests and fresh accounts.
    pub fn zeroed() -> Self {
        Self {
            base_borrowed: "0".into(),
            base_free: "0".into(),
            base_total: "0".into(),
            quote_borrowed: "0".into(),
            quote_free: "0".into(),
            quote_total: "0".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_display_and_parse_round_trip() {
        let tag = OrderTag::new(OrderRole::ReentryLot1, 17);
        assert_eq!(tag.to_string(), "lot1-17");
        assert_eq!("lot1-17".parse::<OrderTag>().unwrap(), tag);

        let tp = OrderTag::new(OrderRole::TakeProfit, 3);
        assert_eq!(tp.to_string(), "tp-3");
        assert_eq!("tp-3".parse::<OrderTag>().unwrap(), tp);
    }

    #[test]
    fn tag_matching_is_structural() {
        let a = OrderTag::new(OrderRole::ReentryLot2, 5);
        let b = OrderTag::new(OrderRole::ReentryLot2, 6);
        assert_ne!(a, b);
        assert_eq!(a, OrderTag::new(OrderRole::ReentryLot2, 5));
    }

    #[test]
    fn tag_parse_rejects_unknown_roles() {
        assert!("sl1-4".parse::<OrderTag>().is_err());
        assert!("lot1".parse::<OrderTag>().is_err());
        assert!("lot1-x".parse::<OrderTag>().is_err());
    }

    #[test]
    fn pair_symbol() {
        let pair = TradingPair::new("BTC", "USDT");
        assert_eq!(pair.symbol(), "BTCUSDT");
        assert_eq!(pair.to_string(), "BTC/USDT");
    }
}
