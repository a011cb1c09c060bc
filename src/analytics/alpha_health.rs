//! Alpha Health Checker
//!
//! Classifies live signal quality into HEALTHY / DEGRADING / FAILED from the
//! short-window IC, the alpha share of cumulative attribution, IC decay
//! (short-window mean vs long-window mean), consecutive losses, and sustained
//! low liquidity. Priority: FAILED > DEGRADING > HEALTHY. The advice block is
//! what the engine acts on: a size factor and a threshold bump.
//!
//! Criteria whose inputs are not yet measurable (IC below its sample floor,
//! no attributed trades) are skipped rather than read as zero, so a freshly
//! started engine is not declared dead.

use std::collections::VecDeque;
use tracing::{info, warn};

use crate::analytics::market_state::MarketState;
use crate::types::Millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degrading,
    Failed,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degrading => "degrading",
            HealthStatus::Failed => "failed",
        }
    }
}

/// Live inputs sampled by the engine at health-check time.
#[derive(Debug, Clone)]
pub struct HealthInputs {
    /// Short-window IC; `None` while below the sample floor.
    pub ic: Option<f64>,
    /// Alpha share of |cumulative total|, percent; `None` before any trades.
    pub alpha_percentage: Option<f64>,
    pub market_state: MarketState,
    pub now_ms: Millis,
}

/// System response advice attached to a classification.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthAdvice {
    pub stop_trading: bool,
    pub reduce_size: bool,
    pub increase_threshold: bool,
    /// Multiplier on order size (0.0 stops, 1.0 unchanged).
    pub size_factor: f64,
    /// Additive bump on the confidence thresholds.
    pub theta_adjustment: f64,
}

impl HealthAdvice {
    fn unchanged() -> Self {
        Self {
            stop_trading: false,
            reduce_size: false,
            increase_threshold: false,
            size_factor: 1.0,
            theta_adjustment: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub ic: Option<f64>,
    pub alpha_percentage: Option<f64>,
    pub ic_decay_pct: f64,
    pub market_state: MarketState,
    pub consecutive_losses: u32,
    pub low_liq_duration_s: i64,
    pub advice: HealthAdvice,
    pub timestamp_ms: Millis,
}

pub struct AlphaHealthChecker {
    healthy_ic: f64,
    degrading_ic: f64,
    healthy_alpha_pct: f64,
    degrading_alpha_pct: f64,
    healthy_decay_pct: f64,
    degrading_decay_pct: f64,
    ic_window_short: usize,
    ic_window_long: usize,
    min_samples: usize,
    losses_degrading: u32,
    losses_failed: u32,
    low_liq_limit_s: i64,
    ic_history: VecDeque<f64>,
    consecutive_losses: u32,
    low_liq_since: Option<Millis>,
}

impl Default for AlphaHealthChecker {
    fn default() -> Self {
        Self {
            healthy_ic: 0.03,
            degrading_ic: 0.01,
            healthy_alpha_pct: 70.0,
            degrading_alpha_pct: 50.0,
            healthy_decay_pct: 20.0,
            degrading_decay_pct: 50.0,
            ic_window_short: 100,
            ic_window_long: 500,
            min_samples: 10,
            losses_degrading: 3,
            losses_failed: 5,
            low_liq_limit_s: 1_800,
            ic_history: VecDeque::new(),
            consecutive_losses: 0,
            low_liq_since: None,
        }
    }
}

impl AlphaHealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the outcome of a closed trade into the loss streak.
    pub fn record_trade_outcome(&mut self, is_loss: bool) {
        if is_loss {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    /// Classify current health and produce advice.
    pub fn check(&mut self, inputs: HealthInputs) -> HealthReport {
        if let Some(ic) = inputs.ic {
            self.ic_history.push_back(ic);
            while self.ic_history.len() > self.ic_window_long {
                self.ic_history.pop_front();
            }
        }

        let ic_decay_pct = self.ic_decay_pct();
        let low_liq_duration_s = self.track_low_liq(inputs.market_state, inputs.now_ms);

        let status = self.classify(
            inputs.ic,
            inputs.alpha_percentage,
            ic_decay_pct,
            inputs.market_state,
            low_liq_duration_s,
        );
        let advice = self.advise(status, ic_decay_pct, inputs.market_state);

        match status {
            HealthStatus::Healthy => info!(
                status = status.as_str(),
                ic = ?inputs.ic,
                alpha_pct = ?inputs.alpha_percentage,
                "alpha health checked"
            ),
            _ => warn!(
                status = status.as_str(),
                ic = ?inputs.ic,
                alpha_pct = ?inputs.alpha_percentage,
                ic_decay_pct,
                consecutive_losses = self.consecutive_losses,
                "alpha health deteriorated"
            ),
        }

        HealthReport {
            status,
            ic: inputs.ic,
            alpha_percentage: inputs.alpha_percentage,
            ic_decay_pct,
            market_state: inputs.market_state,
            consecutive_losses: self.consecutive_losses,
            low_liq_duration_s,
            advice,
            timestamp_ms: inputs.now_ms,
        }
    }

    /// `max(0, (long_mean - short_mean) / |long_mean|) * 100`: improvement
    /// clamps to zero, only decay is reported.
    fn ic_decay_pct(&self) -> f64 {
        if self.ic_history.len() < self.min_samples {
            return 0.0;
        }
        let long: Vec<f64> = self.ic_history.iter().copied().collect();
        let short_start = long.len().saturating_sub(self.ic_window_short);
        let short = &long[short_start..];

        let long_mean = long.iter().sum::<f64>() / long.len() as f64;
        let short_mean = short.iter().sum::<f64>() / short.len() as f64;
        if long_mean == 0.0 {
            return 0.0;
        }
        ((long_mean - short_mean) / long_mean.abs() * 100.0).max(0.0)
    }

    fn track_low_liq(&mut self, state: MarketState, now_ms: Millis) -> i64 {
        if state == MarketState::LowLiquidity {
            let since = *self.low_liq_since.get_or_insert(now_ms);
            (now_ms - since) / 1_000
        } else {
            self.low_liq_since = None;
            0
        }
    }

    fn classify(
        &self,
        ic: Option<f64>,
        alpha_pct: Option<f64>,
        decay_pct: f64,
        state: MarketState,
        low_liq_s: i64,
    ) -> HealthStatus {
        let failed = ic.is_some_and(|v| v < self.degrading_ic)
            || alpha_pct.is_some_and(|v| v < self.degrading_alpha_pct)
            || decay_pct > self.degrading_decay_pct
            || self.consecutive_losses > self.losses_failed
            || low_liq_s > self.low_liq_limit_s;
        if failed {
            return HealthStatus::Failed;
        }

        let degrading = ic.is_some_and(|v| v >= self.degrading_ic && v < self.healthy_ic)
            || alpha_pct
                .is_some_and(|v| v >= self.degrading_alpha_pct && v < self.healthy_alpha_pct)
            || (decay_pct >= self.healthy_decay_pct && decay_pct <= self.degrading_decay_pct)
            || self.consecutive_losses >= self.losses_degrading
            || matches!(state, MarketState::HighVolatility | MarketState::LowLiquidity);
        if degrading {
            return HealthStatus::Degrading;
        }

        HealthStatus::Healthy
    }

    fn advise(&self, status: HealthStatus, decay_pct: f64, state: MarketState) -> HealthAdvice {
        match status {
            HealthStatus::Healthy => HealthAdvice::unchanged(),
            HealthStatus::Degrading => HealthAdvice {
                stop_trading: false,
                reduce_size: true,
                increase_threshold: true,
                size_factor: if decay_pct > 30.0 { 0.3 } else { 0.5 },
                theta_adjustment: if state == MarketState::LowLiquidity {
                    0.15
                } else {
                    0.1
                },
            },
            HealthStatus::Failed => HealthAdvice {
                stop_trading: true,
                reduce_size: true,
                increase_threshold: true,
                size_factor: 0.0,
                theta_adjustment: 0.2,
            },
        }
    }
}
