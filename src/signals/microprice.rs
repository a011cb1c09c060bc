//! Microprice
//!
//! Size-weighted price between best bid and ask:
//! `M = (bid * ask_size + ask * bid_size) / (bid_size + ask_size)`.
//! The score is the microprice's deviation from mid, scaled so one basis
//! point maps to a full-strength score, then clipped to [-1, 1].

use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::signals::clip_score;
use crate::types::MarketData;

/// Maps a 1 bp microprice deviation to score 1.0.
const DEVIATION_SCALE: f64 = 10_000.0;

#[derive(Debug, Clone)]
pub struct MicropriceSignal {
    pub weight: f64,
}

impl MicropriceSignal {
    pub fn new(weight: f64) -> Self {
        Self { weight }
    }

    pub fn calculate(&self, market_data: &MarketData) -> EngineResult<f64> {
        let (bid, ask) = match (market_data.best_bid(), market_data.best_ask()) {
            (Some(bid), Some(ask)) => (bid, ask),
            _ => {
                debug!(symbol = %market_data.symbol, "microprice: empty book side");
                return Ok(0.0);
            }
        };
        if market_data.mid_price.is_zero() {
            return Ok(0.0);
        }

        let bid_price = bid.price.to_f64().unwrap_or(0.0);
        let ask_price = ask.price.to_f64().unwrap_or(0.0);
        let bid_size = bid.size.to_f64().unwrap_or(0.0);
        let ask_size = ask.size.to_f64().unwrap_or(0.0);
        let mid = market_data.mid_price.to_f64().unwrap_or(0.0);

        let total_size = bid_size + ask_size;
        if total_size <= 0.0 || mid <= 0.0 {
            return Ok(0.0);
        }

        // Size-weighted: a heavy bid queue pulls the microprice toward the ask.
        let microprice = (bid_price * ask_size + ask_price * bid_size) / total_size;
        if !microprice.is_finite() {
            return Err(EngineError::Component(format!(
                "microprice non-finite for {}",
                market_data.symbol
            )));
        }

        Ok(clip_score((microprice - mid) / mid * DEVIATION_SCALE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Level;
    use rust_decimal::Decimal;

    fn book(bid: (f64, f64), ask: (f64, f64)) -> MarketData {
        let bid_level = Level::new(
            Decimal::try_from(bid.0).unwrap(),
            Decimal::try_from(bid.1).unwrap(),
        );
        let ask_level = Level::new(
            Decimal::try_from(ask.0).unwrap(),
            Decimal::try_from(ask.1).unwrap(),
        );
        let mid = (bid_level.price + ask_level.price) / Decimal::TWO;
        MarketData {
            symbol: "ETH".into(),
            timestamp_ms: 0,
            bids: vec![bid_level],
            asks: vec![ask_level],
            trades: vec![],
            mid_price: mid,
        }
    }

    #[test]
    fn test_balanced_sizes_give_zero() {
        let signal = MicropriceSignal::new(0.3);
        let md = book((100.0, 5.0), (101.0, 5.0));
        let value = signal.calculate(&md).unwrap();
        assert!(value.abs() < 1e-9);
    }

    #[test]
    fn test_heavy_bid_pushes_score_positive() {
        let signal = MicropriceSignal::new(0.3);
        // bid queue 20 vs ask queue 2: microprice sits near the ask.
        let md = book((100.0, 20.0), (101.0, 2.0));
        let value = signal.calculate(&md).unwrap();
        assert!(value > 0.0);
    }

    #[test]
    fn test_heavy_ask_pushes_score_negative() {
        let signal = MicropriceSignal::new(0.3);
        let md = book((100.0, 2.0), (101.0, 20.0));
        assert!(signal.calculate(&md).unwrap() < 0.0);
    }

    #[test]
    fn test_wide_deviation_clips_to_one() {
        let signal = MicropriceSignal::new(0.3);
        // A wide spread with a lopsided queue moves the microprice far more
        // than 1 bp from mid; the score saturates.
        let md = book((100.0, 1000.0), (110.0, 1.0));
        assert_eq!(signal.calculate(&md).unwrap(), 1.0);
    }

    #[test]
    fn test_empty_side_returns_zero() {
        let signal = MicropriceSignal::new(0.3);
        let md = MarketData {
            symbol: "ETH".into(),
            timestamp_ms: 0,
            bids: vec![],
            asks: vec![Level::new(Decimal::from(101), Decimal::from(5))],
            trades: vec![],
            mid_price: Decimal::ZERO,
        };
        assert_eq!(signal.calculate(&md).unwrap(), 0.0);
    }
}
