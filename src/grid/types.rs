//! Cycle-level types for the grid engine.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};

use crate::numeric::{self, NumericError};
use crate::venue::OrderSide;

/// Trade direction for a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Side that opens or escalates the position.
    pub fn entry_side(&self) -> OrderSide {
        match self {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        }
    }

    /// Side that reduces or closes the position.
    pub fn exit_side(&self) -> OrderSide {
        self.entry_side().opposite()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Take-profit limit filled
    TakeProfit,
    /// Monitoring loop closed the position at market
    StopLoss,
    /// A placement sequence failed; position state is suspect
    Aborted,
}

/// Borrowed amounts for both legs of the isolated pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub base_borrowed: Decimal,
    pub quote_borrowed: Decimal,
}

/// Per-cycle mutable record, created at cycle start and discarded at cycle
/// end. Lives inside the shared order lock: holding the guard is holding
/// the engine's one mutation token.
#[derive(Debug)]
pub struct CycleState {
    pub cycle: u64,
    pub direction: Direction,
    /// Accumulated position size, a decimal string like the venue reports
    pub total_quantity: String,
    pub filled_price: Decimal,
    /// Grid spacing: entry fill price times the spacing fraction
    pub pitch: Decimal,
    done: watch::Sender<Option<CycleOutcome>>,
}

impl CycleState {
    pub fn new(cycle: u64, direction: Direction) -> (Self, watch::Receiver<Option<CycleOutcome>>) {
        let (done, done_rx) = watch::channel(None);
        (
            Self {
                cycle,
                direction,
                total_quantity: "0".into(),
                filled_price: Decimal::ZERO,
                pitch: Decimal::ZERO,
                done,
            },
            done_rx,
        )
    }

    /// Add a fill to the accumulated position.
    pub fn add_quantity(&mut self, quantity: &str) -> Result<(), NumericError> {
        self.total_quantity = numeric::add(&self.total_quantity, quantity)?;
        Ok(())
    }

    /// Re-entry price `lots` pitches beyond the entry fill, adverse side.
    pub fn reentry_price(&self, lots: u32) -> Decimal {
        let offset = self.pitch * Decimal::from(lots);
        match self.direction {
            Direction::Long => self.filled_price - offset,
            Direction::Short => self.filled_price + offset,
        }
    }

    /// Take-profit price one pitch favorable of `from`.
    pub fn take_profit_price(&self, from: Decimal) -> Decimal {
        match self.direction {
            Direction::Long => from + self.pitch,
            Direction::Short => from - self.pitch,
        }
    }

    /// Hard-exit threshold `pitches` pitches adverse of the entry fill.
    pub fn stop_price(&self, pitches: u32) -> Decimal {
        self.reentry_price(pitches)
    }

    /// Record the cycle's outcome, waking the monitoring loop.
    pub fn finish(&self, outcome: CycleOutcome) {
        self.done.send_replace(Some(outcome));
    }

    /// Whether an outcome has already been recorded.
    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }
}

/// The engine's single mutual-exclusion lock. Every sequence that mutates
/// order or position state (entry, brackets, escalation, stop-loss close,
/// the normalizer's corrective trade) holds this guard for its duration.
/// `None` between cycles.
pub type OrderLock = Arc<Mutex<Option<CycleState>>>;
