//! Margin pool normalization.
//!
//! Between cycles the isolated account should hold no net base position:
//! free base equal to borrowed base, everything else in quote. Fills that
//! land after a cycle is torn down, partial stop-loss closes and failed
//! bracket placements all leave a residue; the normalizer trades it away
//! before the next cycle sizes its entry.

use std::sync::Arc;

use log::{info, warn};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};

use crate::errors::BotResult;
use crate::grid::config::EngineConfig;
use crate::grid::types::{OrderLock, PoolSnapshot};
use crate::numeric;
use crate::retry::RetryPolicy;
use crate::venue::{cancel_resting, MarginSnapshot, MarginVenue, OrderSide, TradingPair};

/// Delay before re-reading the margin snapshot, giving the venue time to
/// settle transfers and fills it has already acknowledged.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, PartialEq, Eq)]
enum Correction {
    Balanced,
    Corrected,
}

/// Drives the account back to a flat base position between cycles and
/// caches the last-read borrowed pools for entry sizing.
pub struct PoolNormalizer<V> {
    venue: Arc<V>,
    pair: TradingPair,
    lock: OrderLock,
    pools: RwLock<PoolSnapshot>,
    passes: u32,
    min_imbalance: Decimal,
    retry: RetryPolicy,
    quantity_decimals: u32,
}

impl<V: MarginVenue> PoolNormalizer<V> {
    pub fn new(venue: Arc<V>, config: &EngineConfig, lock: OrderLock) -> Self {
        Self {
            venue,
            pair: config.pair.clone(),
            lock,
            pools: RwLock::new(PoolSnapshot::default()),
            passes: config.normalize_passes,
            min_imbalance: config.min_imbalance,
            retry: config.retry,
            quantity_decimals: config.quantity_decimals,
        }
    }

    /// Last-read borrowed pools. Stale until [`refresh`](Self::refresh) or
    /// [`normalize`](Self::normalize) has run at least once.
    pub async fn pools(&self) -> PoolSnapshot {
        *self.pools.read().await
    }

    /// Re-read the margin snapshot after a settle delay and update the
    /// cached pools.
    pub async fn refresh(&self) -> BotResult<PoolSnapshot> {
        sleep(SETTLE_DELAY).await;
        let snapshot = self.read_snapshot().await?;
        let pools = self.cache_pools(&snapshot).await?;
        Ok(pools)
    }

    /// Full inter-cycle reset: cancel resting orders, repay what loans the
    /// free balances cover, then trade away any base imbalance in bounded
    /// passes. A residue that survives every pass is logged and tolerated;
    /// the next cycle runs regardless.
    pub async fn normalize(&self) -> BotResult<()> {
        cancel_resting(&*self.venue, &self.pair).await?;
        self.repay_loans().await?;

        for pass in 1..=self.passes {
            match self.correct_imbalance().await {
                Ok(Correction::Balanced) => return Ok(()),
                Ok(Correction::Corrected) => {
                    info!("pool normalization pass {}/{} traded", pass, self.passes);
                }
                Err(e) => {
                    warn!(
                        "pool normalization pass {}/{} failed: {}",
                        pass, self.passes, e
                    );
                }
            }
        }
        warn!(
            "pool imbalance persists after {} passes; continuing",
            self.passes
        );
        Ok(())
    }

    /// Repay each leg's loan up to what the free balance covers. Repay
    /// failures are logged and skipped; the imbalance correction still
    /// runs on whatever remains.
    async fn repay_loans(&self) -> BotResult<()> {
        sleep(SETTLE_DELAY).await;
        let snapshot = self.read_snapshot().await?;
        self.cache_pools(&snapshot).await?;

        let legs = [
            (
                self.pair.base.as_str(),
                &snapshot.base_borrowed,
                &snapshot.base_free,
            ),
            (
                self.pair.quote.as_str(),
                &snapshot.quote_borrowed,
                &snapshot.quote_free,
            ),
        ];
        for (asset, borrowed, free) in legs {
            let repayable = numeric::parse(borrowed)?.min(numeric::parse(free)?);
            let repayable = numeric::truncate(repayable, self.quantity_decimals).normalize();
            if repayable <= Decimal::ZERO {
                continue;
            }
            let amount = repayable.to_string();
            if let Err(e) = self.venue.repay_loan(asset, &self.pair, &amount).await {
                warn!("repay of {} {} failed: {}", amount, asset, e);
            } else {
                info!("repaid {} {}", amount, asset);
            }
        }
        Ok(())
    }

    /// One correction pass under the order lock: read the pools and, if the
    /// free base diverges from the borrowed base by at least the threshold,
    /// trade the difference at market.
    async fn correct_imbalance(&self) -> BotResult<Correction> {
        let _guard = self.lock.lock().await;

        cancel_resting(&*self.venue, &self.pair).await?;
        sleep(SETTLE_DELAY).await;
        let snapshot = self.read_snapshot().await?;
        self.cache_pools(&snapshot).await?;

        let free = numeric::parse(&snapshot.base_free)?;
        let borrowed = numeric::parse(&snapshot.base_borrowed)?;
        let (side, diff) = if free < borrowed {
            (OrderSide::Buy, borrowed - free)
        } else {
            (OrderSide::Sell, free - borrowed)
        };
        let diff = numeric::truncate(diff, self.quantity_decimals).normalize();
        if diff < self.min_imbalance {
            return Ok(Correction::Balanced);
        }

        info!("correcting base imbalance: {} {}", side, diff);
        let quantity = diff.to_string();
        self.retry
            .run("normalize market order", || {
                let venue = Arc::clone(&self.venue);
                let pair = self.pair.clone();
                let quantity = quantity.clone();
                async move {
                    venue
                        .place_market_order(&pair, side, &quantity)
                        .await
                        .map(|_| ())
                }
            })
            .await?;
        Ok(Correction::Corrected)
    }

    async fn read_snapshot(&self) -> BotResult<MarginSnapshot> {
        self.retry
            .run("margin snapshot", || {
                let venue = Arc::clone(&self.venue);
                let pair = self.pair.clone();
                async move { venue.margin_snapshot(&pair).await }
            })
            .await
    }

    async fn cache_pools(&self, snapshot: &MarginSnapshot) -> BotResult<PoolSnapshot> {
        let pools = PoolSnapshot {
            base_borrowed: numeric::parse(&snapshot.base_borrowed)?,
            quote_borrowed: numeric::parse(&snapshot.quote_borrowed)?,
        };
        *self.pools.write().await = pools;
        Ok(pools)
    }
}
