//! Market State Detector
//!
//! Classifies each tick into one of four regimes from a rolling mid-price
//! window plus the live book. Priority order, first match wins:
//! LOW_LIQ -> HIGH_VOL -> CHOPPY -> NORMAL. Low liquidity outranks the rest
//! because it is the regime that hurts execution the most.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use statrs::statistics::Statistics;
use std::collections::VecDeque;
use tracing::debug;

use crate::types::MarketData;

/// Spread sentinel when a book side is empty.
const EMPTY_BOOK_SPREAD_BPS: f64 = 9_999.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketState {
    Normal,
    HighVolatility,
    LowLiquidity,
    Choppy,
}

impl MarketState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketState::Normal => "normal",
            MarketState::HighVolatility => "high_volatility",
            MarketState::LowLiquidity => "low_liquidity",
            MarketState::Choppy => "choppy",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketMetrics {
    /// Relative volatility: stddev(mid) / mean(mid) over the window.
    pub volatility: f64,
    /// Depth-based score in (0, 1]; higher is more liquid.
    pub liquidity_score: f64,
    pub spread_bps: f64,
    /// Adjacent sign flips in the mid-price deltas over the window.
    pub price_reversals: usize,
    pub detected_state: MarketState,
}

pub struct MarketStateDetector {
    high_volatility_threshold: f64,
    low_liquidity_threshold: f64,
    spread_threshold_bps: f64,
    choppy_reversal_threshold: usize,
    min_liquidity_depth: Decimal,
    price_history: VecDeque<f64>,
    price_changes: VecDeque<i8>,
    window: usize,
}

impl Default for MarketStateDetector {
    fn default() -> Self {
        Self::new(0.02, 0.3, 15.0, 5, 20, Decimal::from(10))
    }
}

impl MarketStateDetector {
    pub fn new(
        high_volatility_threshold: f64,
        low_liquidity_threshold: f64,
        spread_threshold_bps: f64,
        choppy_reversal_threshold: usize,
        window: usize,
        min_liquidity_depth: Decimal,
    ) -> Self {
        Self {
            high_volatility_threshold,
            low_liquidity_threshold,
            spread_threshold_bps,
            choppy_reversal_threshold,
            min_liquidity_depth,
            price_history: VecDeque::with_capacity(window),
            price_changes: VecDeque::with_capacity(window),
            window,
        }
    }

    pub fn detect(&mut self, market_data: &MarketData) -> MarketMetrics {
        self.push_price(market_data.mid_price.to_f64().unwrap_or(0.0));

        let volatility = self.volatility();
        let liquidity_score = self.liquidity_score(market_data);
        let spread_bps = market_data.spread_bps().unwrap_or(EMPTY_BOOK_SPREAD_BPS);
        let price_reversals = self.count_reversals();

        let detected_state = if liquidity_score < self.low_liquidity_threshold
            || spread_bps > self.spread_threshold_bps
        {
            MarketState::LowLiquidity
        } else if volatility > self.high_volatility_threshold {
            MarketState::HighVolatility
        } else if price_reversals >= self.choppy_reversal_threshold {
            MarketState::Choppy
        } else {
            MarketState::Normal
        };

        debug!(
            symbol = %market_data.symbol,
            state = detected_state.as_str(),
            volatility,
            liquidity_score,
            spread_bps,
            price_reversals,
            "market state detected"
        );

        MarketMetrics {
            volatility,
            liquidity_score,
            spread_bps,
            price_reversals,
            detected_state,
        }
    }

    fn push_price(&mut self, price: f64) {
        if let Some(&last) = self.price_history.back() {
            let change = if price > last {
                1
            } else if price < last {
                -1
            } else {
                0
            };
            self.price_changes.push_back(change);
            while self.price_changes.len() > self.window.saturating_sub(1) {
                self.price_changes.pop_front();
            }
        }
        self.price_history.push_back(price);
        while self.price_history.len() > self.window {
            self.price_history.pop_front();
        }
    }

    fn volatility(&self) -> f64 {
        if self.price_history.len() < 2 {
            return 0.0;
        }
        let prices: Vec<f64> = self.price_history.iter().copied().collect();
        let mean = (&prices).mean();
        if mean <= 0.0 {
            return 0.0;
        }
        (&prices).population_std_dev() / mean
    }

    /// `1 / (1 + (min_depth / top5_depth)^2)`: at min depth the score is 0.5,
    /// rising toward 1 as the book deepens.
    fn liquidity_score(&self, market_data: &MarketData) -> f64 {
        if market_data.bids.is_empty() || market_data.asks.is_empty() {
            return 0.0;
        }
        let bid_depth: Decimal = market_data.bids.iter().take(5).map(|l| l.size).sum();
        let ask_depth: Decimal = market_data.asks.iter().take(5).map(|l| l.size).sum();
        let total = (bid_depth + ask_depth).to_f64().unwrap_or(0.0);
        let min_depth = self.min_liquidity_depth.to_f64().unwrap_or(0.0);
        if min_depth <= 0.0 {
            return 1.0;
        }
        let ratio = min_depth / (total + 1e-10);
        (1.0 / (1.0 + ratio * ratio)).min(1.0)
    }

    fn count_reversals(&self) -> usize {
        let changes: Vec<i8> = self
            .price_changes
            .iter()
            .copied()
            .filter(|&c| c != 0)
            .collect();
        changes.windows(2).filter(|w| w[0] != w[1]).count()
    }

    pub fn reset(&mut self) {
        self.price_history.clear();
        self.price_changes.clear();
    }
}
