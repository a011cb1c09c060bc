//! Adaptive Cost Estimator
//!
//! Pre-trade cost in basis points (fee + slippage + impact), conditioned on
//! the detected market state:
//!
//! | state    | multiplier | scope              |
//! |----------|------------|--------------------|
//! | NORMAL   | 1.0        | none               |
//! | HIGH_VOL | 1.5        | slippage + impact  |
//! | LOW_LIQ  | 2.0        | slippage + impact  |
//! | CHOPPY   | 1.3        | slippage only      |
//!
//! Fees never scale. Advisories ride along: prefer IOC when a passive order
//! is dispatched into HIGH_VOL or LOW_LIQ, and reduce size in LOW_LIQ always
//! or in HIGH_VOL when the order is half of average top-3 depth.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::analytics::market_state::{MarketMetrics, MarketState};
use crate::execution::SlippageEstimator;
use crate::types::{MarketData, OrderType, Side};

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveCostEstimate {
    pub order_type: OrderType,
    pub side: Side,
    pub market_state: MarketState,
    pub fee_bps: f64,
    pub slippage_bps: f64,
    pub impact_bps: f64,
    pub total_cost_bps: f64,
    /// State multiplier that was applied (1.0 in NORMAL).
    pub adjustment_factor: f64,
    /// Passive order dispatched into a hostile regime: take instead.
    pub recommend_ioc: bool,
    pub recommend_reduce_size: bool,
}

pub struct AdaptiveCostEstimator {
    slippage_estimator: SlippageEstimator,
    maker_fee_bps: f64,
    taker_fee_bps: f64,
    high_vol_factor: f64,
    low_liq_factor: f64,
    choppy_factor: f64,
}

impl AdaptiveCostEstimator {
    pub fn new(
        slippage_estimator: SlippageEstimator,
        maker_fee_rate: f64,
        taker_fee_rate: f64,
    ) -> Self {
        Self {
            slippage_estimator,
            maker_fee_bps: maker_fee_rate * 10_000.0,
            taker_fee_bps: taker_fee_rate * 10_000.0,
            high_vol_factor: 1.5,
            low_liq_factor: 2.0,
            choppy_factor: 1.3,
        }
    }

    /// Estimate the all-in cost of an order under the current market state.
    pub fn estimate(
        &self,
        order_type: OrderType,
        side: Side,
        size: Decimal,
        market_data: &MarketData,
        metrics: &MarketMetrics,
    ) -> AdaptiveCostEstimate {
        let state = metrics.detected_state;

        let fee_bps = match order_type {
            OrderType::LimitPostOnly => self.maker_fee_bps,
            OrderType::Ioc => self.taker_fee_bps,
        };

        // Base slippage from the walk; impact is the share of that walk past
        // the best opposite level.
        let (base_slippage_bps, base_impact_bps) =
            match self.slippage_estimator.estimate(side, size, market_data) {
                Some(estimate) => {
                    let best_opposite = match side {
                        Side::Buy => market_data.best_ask().map(|l| l.price),
                        Side::Sell => market_data.best_bid().map(|l| l.price),
                    };
                    let impact = match best_opposite {
                        Some(best) if !market_data.mid_price.is_zero() => {
                            ((estimate.vwap - best) / market_data.mid_price
                                * Decimal::from(10_000)
                                * side.sign())
                            .to_f64()
                            .unwrap_or(0.0)
                            .max(0.0)
                        }
                        _ => 0.0,
                    };
                    (estimate.slippage_bps.max(0.0), impact)
                }
                None => (0.0, 0.0),
            };

        let (adjustment_factor, slippage_factor, impact_factor) = match state {
            MarketState::Normal => (1.0, 1.0, 1.0),
            MarketState::HighVolatility => {
                (self.high_vol_factor, self.high_vol_factor, self.high_vol_factor)
            }
            MarketState::LowLiquidity => {
                (self.low_liq_factor, self.low_liq_factor, self.low_liq_factor)
            }
            // Chop hurts the entry price, not the depth consumed.
            MarketState::Choppy => (self.choppy_factor, self.choppy_factor, 1.0),
        };

        let slippage_bps = base_slippage_bps * slippage_factor;
        let impact_bps = base_impact_bps * impact_factor;
        let total_cost_bps = fee_bps + slippage_bps + impact_bps;

        let (recommend_ioc, recommend_reduce_size) =
            self.advisories(order_type, state, size, market_data);

        debug!(
            symbol = %market_data.symbol,
            state = state.as_str(),
            total_cost_bps,
            adjustment_factor,
            recommend_ioc,
            "adaptive cost estimated"
        );

        AdaptiveCostEstimate {
            order_type,
            side,
            market_state: state,
            fee_bps,
            slippage_bps,
            impact_bps,
            total_cost_bps,
            adjustment_factor,
            recommend_ioc,
            recommend_reduce_size,
        }
    }

    fn advisories(
        &self,
        order_type: OrderType,
        state: MarketState,
        size: Decimal,
        market_data: &MarketData,
    ) -> (bool, bool) {
        match state {
            MarketState::LowLiquidity => {
                (order_type == OrderType::LimitPostOnly, true)
            }
            MarketState::HighVolatility => {
                let reduce = size >= self.average_top3_depth(market_data) / Decimal::TWO;
                (order_type == OrderType::LimitPostOnly, reduce)
            }
            MarketState::Choppy | MarketState::Normal => (false, false),
        }
    }

    /// Mean of top-3 bid and top-3 ask depth.
    fn average_top3_depth(&self, market_data: &MarketData) -> Decimal {
        let bid: Decimal = market_data.bids.iter().take(3).map(|l| l.size).sum();
        let ask: Decimal = market_data.asks.iter().take(3).map(|l| l.size).sum();
        (bid + ask) / Decimal::TWO
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
                Level::new(dec!(100.0), dec!(4)),
                Level::new(dec!(99.5), dec!(4)),
            ],
            asks: vec![
                Level::new(dec!(100.5), dec!(4)),
                Level::new(dec!(101.0), dec!(4)),
            ],
            trades: vec![],
            mid_price: dec!(100.25),
        }
    }

    fn metrics(state: MarketState) -> MarketMetrics {
        MarketMetrics {
            volatility: 0.0,
            liquidity_score: 1.0,
            spread_bps: 5.0,
            price_reversals: 0,
            detected_state: state,
        }
    }

    fn estimator() -> AdaptiveCostEstimator {
        AdaptiveCostEstimator::new(SlippageEstimator::new(20.0), 0.00015, 0.00045)
    }

    #[test]
    fn test_normal_state_no_adjustment() {
        let estimate = estimator().estimate(
            OrderType::Ioc,
            Side::Buy,
            dec!(1),
            &market(),
            &metrics(MarketState::Normal),
        );
        assert_eq!(estimate.adjustment_factor, 1.0);
        assert!((estimate.fee_bps - 4.5).abs() < 1e-12);
        assert!(estimate.slippage_bps > 0.0);
        assert_eq!(estimate.impact_bps, 0.0); // fits at the best level
        assert!(!estimate.recommend_ioc);
        assert!(!estimate.recommend_reduce_size);
    }

    #[test]
    fn test_high_vol_scales_slippage_and_impact() {
        let base = estimator().estimate(
            OrderType::Ioc,
            Side::Buy,
            dec!(6),
            &market(),
            &metrics(MarketState::Normal),
        );
        let adjusted = estimator().estimate(
            OrderType::Ioc,
            Side::Buy,
            dec!(6),
            &market(),
            &metrics(MarketState::HighVolatility),
        );
        assert!((adjusted.slippage_bps - base.slippage_bps * 1.5).abs() < 1e-9);
        assert!((adjusted.impact_bps - base.impact_bps * 1.5).abs() < 1e-9);
        assert!((adjusted.fee_bps - base.fee_bps).abs() < 1e-12);
    }

    #[test]
    fn test_choppy_scales_slippage_only() {
        let base = estimator().estimate(
            OrderType::Ioc,
            Side::Buy,
            dec!(6),
            &market(),
            &metrics(MarketState::Normal),
        );
        let adjusted = estimator().estimate(
            OrderType::Ioc,
            Side::Buy,
            dec!(6),
            &market(),
            &metrics(MarketState::Choppy),
        );
        assert!((adjusted.slippage_bps - base.slippage_bps * 1.3).abs() < 1e-9);
        assert!((adjusted.impact_bps - base.impact_bps).abs() < 1e-12);
    }

    #[test]
    fn test_low_liq_recommends_ioc_for_passive() {
        let estimate = estimator().estimate(
            OrderType::LimitPostOnly,
            Side::Buy,
            dec!(0.1),
            &market(),
            &metrics(MarketState::LowLiquidity),
        );
        assert_eq!(estimate.adjustment_factor, 2.0);
        assert!(estimate.recommend_ioc);
        assert!(estimate.recommend_reduce_size);
        assert!((estimate.fee_bps - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_low_liq_no_ioc_advice_for_taker() {
        let estimate = estimator().estimate(
            OrderType::Ioc,
            Side::Buy,
            dec!(0.1),
            &market(),
            &metrics(MarketState::LowLiquidity),
        );
        assert!(!estimate.recommend_ioc);
        assert!(estimate.recommend_reduce_size);
    }

    #[test]
    fn test_high_vol_size_advice_threshold() {
        // Average top-3 depth = (8 + 8) / 2 = 8; threshold = 4.
        let small = estimator().estimate(
            OrderType::LimitPostOnly,
            Side::Buy,
            dec!(3.9),
            &market(),
            &metrics(MarketState::HighVolatility),
        );
        assert!(!small.recommend_reduce_size);
        assert!(small.recommend_ioc);

        let large = estimator().estimate(
            OrderType::LimitPostOnly,
            Side::Buy,
            dec!(4),
            &market(),
            &metrics(MarketState::HighVolatility),
        );
        assert!(large.recommend_reduce_size);
    }

    #[test]
    fn test_impact_positive_when_walking_past_best() {
        let estimate = estimator().estimate(
            OrderType::Ioc,
            Side::Buy,
            dec!(6),
            &market(),
            &metrics(MarketState::Normal),
        );
        // 4 fill at the best, 2 walk to the next level.
        assert!(estimate.impact_bps > 0.0);
        assert!(
            (estimate.total_cost_bps
                - (estimate.fee_bps + estimate.slippage_bps + estimate.impact_bps))
                .abs()
                < 1e-12
        );
    }
}
