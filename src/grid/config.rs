//! Engine tuning parameters.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::errors::{BotError, BotResult};
use crate::retry::RetryPolicy;
use crate::venue::TradingPair;

/// All knobs for one engine instance. Every field has a default so a
/// config file only needs to name the pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Instrument to trade
    pub pair: TradingPair,
    /// Margin leverage used when sizing the borrow
    pub leverage: Decimal,
    /// Pitch as a fraction of the entry fill price
    pub spacing_fraction: Decimal,
    /// Candle interval requested from the venue
    pub candle_interval: String,
    /// Indicator window length in candles
    pub window: usize,
    /// Polling cadence for quote and indicator waits
    pub poll_interval_ms: u64,
    /// Fraction of theoretical borrow capacity actually requested
    pub borrow_safety: Decimal,
    /// Divisor applied to the borrowed pool when sizing the entry lot
    pub lot_divisor: Decimal,
    /// Stop-loss distance in pitches from the entry fill
    pub stop_loss_pitches: u32,
    /// Borrow attempts before a cycle is skipped
    pub borrow_attempts: u32,
    /// Base delay between borrow attempts, scaled by attempt number
    pub borrow_delay_secs: u64,
    /// Normalization passes before giving up on a residual imbalance
    pub normalize_passes: u32,
    /// Base-asset imbalance below which the pools count as flat
    pub min_imbalance: Decimal,
    /// Retry policy for venue calls
    pub retry: RetryPolicy,
    /// Decimal places for limit prices
    pub price_decimals: u32,
    /// Decimal places for order quantities
    pub quantity_decimals: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pair: TradingPair::new("BTC", "USDT"),
            leverage: dec!(10),
            spacing_fraction: dec!(0.0006),
            candle_interval: "1s".into(),
            window: 80,
            poll_interval_ms: 100,
            borrow_safety: dec!(0.94),
            lot_divisor: dec!(4.1),
            stop_loss_pitches: 3,
            borrow_attempts: 4,
            borrow_delay_secs: 4,
            normalize_passes: 4,
            min_imbalance: dec!(0.001),
            retry: RetryPolicy::default(),
            price_decimals: 2,
            quantity_decimals: 5,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> BotResult<()> {
        if self.leverage <= Decimal::ZERO {
            return Err(BotError::Config("leverage must be positive".into()));
        }
        if self.spacing_fraction <= Decimal::ZERO {
            return Err(BotError::Config("spacing_fraction must be positive".into()));
        }
        if self.window < 3 {
            return Err(BotError::Config(
                "window must hold at least 3 candles".into(),
            ));
        }
        if self.lot_divisor <= Decimal::ONE {
            return Err(BotError::Config("lot_divisor must exceed 1".into()));
        }
        if self.stop_loss_pitches == 0 {
            return Err(BotError::Config("stop_loss_pitches must be positive".into()));
        }
        if self.borrow_attempts == 0 {
            return Err(BotError::Config("borrow_attempts must be positive".into()));
        }
        if self.min_imbalance <= Decimal::ZERO {
            return Err(BotError::Config("min_imbalance must be positive".into()));
        }
        Ok(())
    }
}
