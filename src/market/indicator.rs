//! Rolling candle window and trend indicator.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::sleep;

use crate::errors::BotResult;
use crate::numeric;
use crate::venue::Candle;

/// Fewest samples for which the 3rd-from-last open is defined.
const MIN_SAMPLES: usize = 3;

/// Values the engine compares to pick a direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    /// Simple moving average of the window's opens
    pub sma_open: f64,
    /// Open of the 3rd-from-last sample
    pub ref_open: f64,
    /// Close of the latest sample
    pub last_close: f64,
}

/// Fixed-capacity FIFO window of candle samples.
///
/// Written by the candle feed supervisor, read by the engine. A push whose
/// `open_time` equals the latest stored sample is a duplicate and is
/// dropped.
pub struct IndicatorBuffer {
    window: RwLock<VecDeque<Candle>>,
    capacity: usize,
    poll_interval: Duration,
}

impl IndicatorBuffer {
    pub fn new(capacity: usize, poll_interval: Duration) -> Self {
        Self {
            window: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            poll_interval,
        }
    }

    /// Seed from historical candles: sorted by open time, truncated to the
    /// most recent `capacity` samples.
    pub async fn seed(&self, mut candles: Vec<Candle>) {
        candles.sort_unstable_by_key(|c| c.open_time);
        if candles.len() > self.capacity {
            candles.drain(..candles.len() - self.capacity);
        }
        *self.window.write().await = candles.into();
    }

    /// Append a live sample, evicting the oldest once at capacity.
    pub async fn push(&self, candle: Candle) {
        let mut window = self.window.write().await;
        if window.back().map(|last| last.open_time) == Some(candle.open_time) {
            return;
        }
        window.push_back(candle);
        while window.len() > self.capacity {
            window.pop_front();
        }
    }

    pub async fn len(&self) -> usize {
        self.window.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Wait until enough samples exist, then compute the snapshot.
    pub async fn snapshot(&self) -> BotResult<IndicatorSnapshot> {
        loop {
            {
                let window = self.window.read().await;
                if window.len() >= MIN_SAMPLES {
                    return Self::compute(&window);
                }
            }
            sleep(self.poll_interval).await;
        }
    }

    fn compute(window: &VecDeque<Candle>) -> BotResult<IndicatorSnapshot> {
        let mut sum = 0.0;
        for candle in window {
            sum += numeric::to_f64(&candle.open)?;
        }
        let ref_open = numeric::to_f64(&window[window.len() - MIN_SAMPLES].open)?;
        let last_close = numeric::to_f64(&window[window.len() - 1].close)?;
        Ok(IndicatorSnapshot {
            sma_open: sum / window.len() as f64,
            ref_open,
            last_close,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(capacity: usize) -> IndicatorBuffer {
        IndicatorBuffer::new(capacity, Duration::from_millis(1))
    }

    fn candle(open_time: i64, open: &str, close: &str) -> Candle {
        Candle::new(open_time, open, close)
    }

    #[tokio::test]
    async fn capacity_is_never_exceeded() {
        let buf = buffer(4);
        for i in 0..10 {
            buf.push(candle(i, "100", "100")).await;
            assert!(buf.len().await <= 4);
        }
        assert_eq!(buf.len().await, 4);
    }

    #[tokio::test]
    async fn duplicate_open_time_is_a_no_op() {
        let buf = buffer(4);
        buf.push(candle(1, "100", "101")).await;
        buf.push(candle(1, "999", "999")).await;
        assert_eq!(buf.len().await, 1);

        let snap_input = buf.window.read().await;
        assert_eq!(snap_input[0].open, "100");
    }

    #[tokio::test]
    async fn eviction_is_fifo() {
        let buf = buffer(3);
        for i in 1..=4 {
            buf.push(candle(i, &i.to_string(), &i.to_string())).await;
        }
        let window = buf.window.read().await;
        let times: Vec<i64> = window.iter().map(|c| c.open_time).collect();
        // Exactly the earliest sample was dropped.
        assert_eq!(times, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn seed_sorts_and_keeps_most_recent() {
        let buf = buffer(3);
        buf.seed(vec![
            candle(5, "5", "5"),
            candle(1, "1", "1"),
            candle(3, "3", "3"),
            candle(4, "4", "4"),
        ])
        .await;
        let window = buf.window.read().await;
        let times: Vec<i64> = window.iter().map(|c| c.open_time).collect();
        assert_eq!(times, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn snapshot_exposes_sma_and_reference_samples() {
        let buf = buffer(3);
        buf.push(candle(1, "100", "98")).await;
        buf.push(candle(2, "95", "93")).await;
        buf.push(candle(3, "90", "90")).await;

        let snap = buf.snapshot().await.unwrap();
        assert_eq!(snap.sma_open, 95.0);
        assert_eq!(snap.ref_open, 100.0);
        assert_eq!(snap.last_close, 90.0);
    }

    #[tokio::test]
    async fn snapshot_waits_for_minimum_population() {
        let buf = std::sync::Arc::new(buffer(5));
        buf.push(candle(1, "100", "100")).await;
        buf.push(candle(2, "100", "100")).await;

        let waiter = {
            let buf = std::sync::Arc::clone(&buf);
            tokio::spawn(async move { buf.snapshot().await })
        };
        // Third sample unblocks the waiter.
        buf.push(candle(3, "100", "99")).await;
        let snap = waiter.await.unwrap().unwrap();
        assert_eq!(snap.last_close, 99.0);
    }
}
