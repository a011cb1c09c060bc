//! Trade Impact
//!
//! Aggressor-volume imbalance over a short window ending at the snapshot
//! time: `(buy_volume - sell_volume) / (buy_volume + sell_volume)`. Taker
//! buys push price up, taker sells push it down; the recent balance between
//! them leads short-horizon drift.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::EngineResult;
use crate::signals::clip_score;
use crate::types::{MarketData, Side};

#[derive(Debug, Clone)]
pub struct ImpactSignal {
    /// Lookback window in milliseconds.
    pub window_ms: i64,
    pub weight: f64,
}

impl ImpactSignal {
    pub fn new(window_ms: i64, weight: f64) -> Self {
        Self { window_ms, weight }
    }

    pub fn calculate(&self, market_data: &MarketData) -> EngineResult<f64> {
        if market_data.trades.is_empty() {
            debug!(symbol = %market_data.symbol, "impact: no trades");
            return Ok(0.0);
        }

        let window_start = market_data.timestamp_ms - self.window_ms;
        let mut buy_volume = Decimal::ZERO;
        let mut sell_volume = Decimal::ZERO;

        for trade in &market_data.trades {
            if trade.timestamp_ms < window_start {
                continue;
            }
            match trade.side {
                Side::Buy => buy_volume += trade.size,
                Side::Sell => sell_volume += trade.size,
            }
        }

        let total = buy_volume + sell_volume;
        if total.is_zero() {
            return Ok(0.0);
        }

        let imbalance = ((buy_volume - sell_volume) / total).to_f64().unwrap_or(0.0);
        Ok(clip_score(imbalance))
    }
}
