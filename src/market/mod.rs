//! Shared market-data state and feed supervision.

pub mod feeds;
pub mod indicator;
pub mod quote;

pub use feeds::{run_candle_feed, run_execution_feed, run_quote_feed};
pub use indicator::{IndicatorBuffer, IndicatorSnapshot};
pub use quote::QuoteCell;
