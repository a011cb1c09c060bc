//! Order Book Imbalance
//!
//! Weighted (bid - ask) / (bid + ask) volume over the top N levels, with
//! linearly decaying weights from the best level outward. Positive means bid
//! pressure, negative means ask pressure.

use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::signals::clip_score;
use crate::types::{Level, MarketData};

#[derive(Debug, Clone)]
pub struct ObiSignal {
    /// Book depth considered.
    pub levels: usize,
    pub weight: f64,
}

impl ObiSignal {
    pub fn new(levels: usize, weight: f64) -> Self {
        Self { levels, weight }
    }

    /// Per-level weights `w_i = (N - i) / sum(1..=N)`: the best level carries
    /// the most weight, the N-th the least, and the weights sum to 1.
    fn weighted_volume(&self, side: &[Level]) -> f64 {
        let n = self.levels;
        let denominator = (n * (n + 1)) as f64 / 2.0;
        side.iter()
            .take(n)
            .enumerate()
            .map(|(i, level)| {
                let w = (n - i) as f64 / denominator;
                w * level.size.to_f64().unwrap_or(0.0)
            })
            .sum()
    }

    pub fn calculate(&self, market_data: &MarketData) -> EngineResult<f64> {
        if self.levels == 0 {
            return Err(EngineError::Component("obi configured with zero levels".into()));
        }
        if market_data.bids.is_empty() || market_data.asks.is_empty() {
            debug!(symbol = %market_data.symbol, "obi: empty book side");
            return Ok(0.0);
        }

        let bid_volume = self.weighted_volume(&market_data.bids);
        let ask_volume = self.weighted_volume(&market_data.asks);
        let total = bid_volume + ask_volume;
        if total <= 0.0 {
            return Ok(0.0);
        }

        Ok(clip_score((bid_volume - ask_volume) / total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Level;
    use rust_decimal::Decimal;

    fn book(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> MarketData {
        let to_levels = |entries: &[(f64, f64)]| {
            entries
                .iter()
                .map(|&(p, s)| {
                    Level::new(
                        Decimal::try_from(p).unwrap(),
                        Decimal::try_from(s).unwrap(),
                    )
                })
                .collect::<Vec<_>>()
        };
        let bids = to_levels(bids);
        let asks = to_levels(asks);
        let mid = match (bids.first(), asks.first()) {
            (Some(b), Some(a)) => (b.price + a.price) / Decimal::TWO,
            _ => Decimal::ZERO,
        };
        MarketData {
            symbol: "BTC".into(),
            timestamp_ms: 0,
            bids,
            asks,
            trades: vec![],
            mid_price: mid,
        }
    }

    #[test]
    fn test_balanced_book_is_zero() {
        let signal = ObiSignal::new(5, 0.4);
        let md = book(&[(100.0, 5.0)], &[(101.0, 5.0)]);
        assert_eq!(signal.calculate(&md).unwrap(), 0.0);
    }

    #[test]
    fn test_bid_heavy_book_is_positive() {
        let signal = ObiSignal::new(5, 0.4);
        let md = book(&[(100.0, 20.0)], &[(101.0, 2.0)]);
        let value = signal.calculate(&md).unwrap();
        assert!(value > 0.5, "expected strong positive obi, got {}", value);
        // (20 - 2) / (20 + 2)
        assert!((value - 18.0 / 22.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_side_returns_zero() {
        let signal = ObiSignal::new(5, 0.4);
        let md = book(&[(100.0, 5.0)], &[]);
        assert_eq!(signal.calculate(&md).unwrap(), 0.0);
    }

    #[test]
    fn test_mirror_antisymmetry() {
        let signal = ObiSignal::new(5, 0.4);
        let md = book(
            &[(100.0, 7.0), (99.9, 3.0), (99.8, 1.0)],
            &[(100.1, 2.0), (100.2, 4.0), (100.3, 6.0)],
        );
        let mirrored = book(
            &[(100.0, 2.0), (99.9, 4.0), (99.8, 6.0)],
            &[(100.1, 7.0), (100.2, 3.0), (100.3, 1.0)],
        );
        let a = signal.calculate(&md).unwrap();
        let b = signal.calculate(&mirrored).unwrap();
        assert!((a + b).abs() < 1e-12, "obi not antisymmetric: {} vs {}", a, b);
    }

    #[test]
    fn test_closer_levels_weigh_more() {
        let signal = ObiSignal::new(2, 0.4);
        // Same total size on both sides, but the bid mass sits at the best
        // level while the ask mass sits one level out.
        let md = book(&[(100.0, 10.0), (99.9, 2.0)], &[(100.1, 2.0), (100.2, 10.0)]);
        assert!(signal.calculate(&md).unwrap() > 0.0);
    }

    #[test]
    fn test_in_range_for_any_book() {
        let signal = ObiSignal::new(5, 0.4);
        let md = book(
            &[(100.0, 123_456.0), (99.5, 0.001)],
            &[(100.5, 0.002), (101.0, 98_765.0)],
        );
        let value = signal.calculate(&md).unwrap();
        assert!(value.is_finite());
        assert!((-1.0..=1.0).contains(&value));
    }
}
