//! Slippage Estimator
//!
//! Walks the opposite side of the book consuming levels until the requested
//! size is satisfied and reports the volume-weighted execution price. Output
//! here is pre-trade cost orientation: positive bps means the fill would be
//! worse than mid. (PnL attribution flips to its own negative-equals-cost
//! convention downstream.)

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::types::{MarketData, Side};

#[derive(Debug, Clone, PartialEq)]
pub struct SlippageEstimate {
    /// Volume-weighted fill price over the consumed levels.
    pub vwap: Decimal,
    /// Expected cost versus mid, basis points; positive = cost.
    pub slippage_bps: f64,
    /// Size actually covered by the book.
    pub filled_size: Decimal,
    /// Requested size exceeded visible depth; `vwap` covers only the levels
    /// seen and is the worst-fill price available.
    pub depth_exhausted: bool,
}

#[derive(Debug, Clone)]
pub struct SlippageEstimator {
    /// Advisory ceiling used by callers to veto expensive fills.
    pub max_slippage_bps: f64,
}

impl SlippageEstimator {
    pub fn new(max_slippage_bps: f64) -> Self {
        Self { max_slippage_bps }
    }

    /// Estimate the cost of taking `size` from the book on `side`.
    /// Returns `None` when the opposite side is empty or mid is unavailable.
    pub fn estimate(
        &self,
        side: Side,
        size: Decimal,
        market_data: &MarketData,
    ) -> Option<SlippageEstimate> {
        if size <= Decimal::ZERO || market_data.mid_price.is_zero() {
            return None;
        }
        let levels = match side {
            Side::Buy => &market_data.asks,
            Side::Sell => &market_data.bids,
        };
        if levels.is_empty() {
            return None;
        }

        let mut remaining = size;
        let mut notional = Decimal::ZERO;
        let mut filled = Decimal::ZERO;

        for level in levels {
            if remaining <= Decimal::ZERO {
                break;
            }
            let take = remaining.min(level.size);
            notional += take * level.price;
            filled += take;
            remaining -= take;
        }

        if filled.is_zero() {
            return None;
        }

        let vwap = notional / filled;
        let slippage_bps = self.actual_slippage_bps(vwap, market_data.mid_price, side);

        Some(SlippageEstimate {
            vwap,
            slippage_bps,
            filled_size: filled,
            depth_exhausted: remaining > Decimal::ZERO,
        })
    }

    /// Realized slippage of a fill versus a reference mid, basis points;
    /// positive = cost on either side.
    pub fn actual_slippage_bps(&self, fill_price: Decimal, mid: Decimal, side: Side) -> f64 {
        if mid.is_zero() {
            return 0.0;
        }
        let signed = (fill_price - mid) / mid * Decimal::from(10_000) * side.sign();
        signed.to_f64().unwrap_or(0.0)
    }

    /// Whether an estimate exceeds the configured ceiling.
    pub fn exceeds_budget(&self, estimate: &SlippageEstimate) -> bool {
        estimate.slippage_bps > self.max_slippage_bps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Level;
    use rust_decimal_macros::dec;

    fn market() -> MarketData {
        MarketData {
            symbol: "BTC".into(),
            timestamp_ms: 0,
            bids: vec![
                Level::new(dec!(100.0), dec!(2)),
                Level::new(dec!(99.5), dec!(3)),
            ],
            asks: vec![
                Level::new(dec!(100.5), dec!(2)),
                Level::new(dec!(101.0), dec!(3)),
            ],
            trades: vec![],
            mid_price: dec!(100.25),
        }
    }

    #[test]
    fn test_single_level_fill() {
        let estimator = SlippageEstimator::new(20.0);
        let estimate = estimator.estimate(Side::Buy, dec!(1), &market()).unwrap();
        assert_eq!(estimate.vwap, dec!(100.5));
        assert!(!estimate.depth_exhausted);
        assert_eq!(estimate.filled_size, dec!(1));
        assert!(estimate.slippage_bps > 0.0);
    }

    #[test]
    fn test_multi_level_vwap() {
        let estimator = SlippageEstimator::new(20.0);
        let estimate = estimator.estimate(Side::Buy, dec!(4), &market()).unwrap();
        // 2 @ 100.5 + 2 @ 101.0
        let expected = (dec!(2) * dec!(100.5) + dec!(2) * dec!(101.0)) / dec!(4);
        assert_eq!(estimate.vwap, expected);
        assert!(!estimate.depth_exhausted);
    }

    #[test]
    fn test_depth_exhausted_returns_worst_fill() {
        let estimator = SlippageEstimator::new(20.0);
        let estimate = estimator.estimate(Side::Sell, dec!(100), &market()).unwrap();
        assert!(estimate.depth_exhausted);
        assert_eq!(estimate.filled_size, dec!(5));
        // VWAP over everything the book had.
        let expected = (dec!(2) * dec!(100.0) + dec!(3) * dec!(99.5)) / dec!(5);
        assert_eq!(estimate.vwap, expected);
    }

    #[test]
    fn test_sell_slippage_positive_cost() {
        let estimator = SlippageEstimator::new(20.0);
        let estimate = estimator.estimate(Side::Sell, dec!(1), &market()).unwrap();
        // Selling into the bid executes below mid: still a positive cost.
        assert!(estimate.slippage_bps > 0.0);
    }

    #[test]
    fn test_favorable_fill_reads_negative() {
        let estimator = SlippageEstimator::new(20.0);
        // A buy filled below mid is a saving, not a cost.
        let bps = estimator.actual_slippage_bps(dec!(99.9), dec!(100.25), Side::Buy);
        assert!(bps < 0.0);
    }

    #[test]
    fn test_empty_side_returns_none() {
        let estimator = SlippageEstimator::new(20.0);
        let mut md = market();
        md.asks.clear();
        assert!(estimator.estimate(Side::Buy, dec!(1), &md).is_none());
    }

    #[test]
    fn test_budget_check() {
        let estimator = SlippageEstimator::new(5.0);
        let estimate = estimator.estimate(Side::Buy, dec!(5), &market()).unwrap();
        assert!(estimator.exceeds_budget(&estimate));
    }
}
