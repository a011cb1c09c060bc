//! Hybrid Execution Router
//!
//! Confidence-tiered dispatch: HIGH and MEDIUM signals get a post-only maker
//! attempt; the IOC fallback fires when the maker leg times out (HIGH always,
//! MEDIUM only when configured) or immediately when the venue rejects the
//! post-only flag. LOW signals are skipped.
//!
//! Local concurrency rule: one in-flight order per (symbol, side). A second
//! request while one is live is rejected with `Busy` before anything reaches
//! the venue.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::execution::{IocExecutor, MakerOutcome, ShallowMakerExecutor};
use crate::types::{ConfidenceLevel, MarketData, Order, SignalScore, Side};

/// Lifetime execution counters. Fill rates are derived, not stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutorStats {
    pub total_signals: u64,
    pub skipped_signals: u64,
    pub maker_attempts: u64,
    pub maker_fills: u64,
    pub ioc_attempts: u64,
    pub ioc_fills: u64,
    pub fallback_executions: u64,
}

impl ExecutorStats {
    pub fn maker_fill_rate(&self) -> f64 {
        if self.maker_attempts == 0 {
            0.0
        } else {
            self.maker_fills as f64 / self.maker_attempts as f64
        }
    }

    pub fn ioc_fill_rate(&self) -> f64 {
        if self.ioc_attempts == 0 {
            0.0
        } else {
            self.ioc_fills as f64 / self.ioc_attempts as f64
        }
    }

    pub fn skip_rate(&self) -> f64 {
        if self.total_signals == 0 {
            0.0
        } else {
            self.skipped_signals as f64 / self.total_signals as f64
        }
    }
}

/// What one routed signal produced, for the fill-rate monitor and metrics.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub order: Option<Order>,
    pub maker_attempted: bool,
    pub maker_filled: bool,
    pub used_fallback: bool,
}

impl ExecutionReport {
    fn skip() -> Self {
        Self {
            order: None,
            maker_attempted: false,
            maker_filled: false,
            used_fallback: false,
        }
    }
}

pub struct HybridExecutor {
    maker: ShallowMakerExecutor,
    ioc: IocExecutor,
    enable_fallback: bool,
    fallback_on_medium: bool,
    in_flight: Mutex<HashSet<(String, Side)>>,
    stats: Mutex<ExecutorStats>,
}

/// Removes the (symbol, side) reservation when the attempt finishes, on every
/// exit path.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<(String, Side)>>,
    key: (String, Side),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

impl HybridExecutor {
    pub fn new(
        maker: ShallowMakerExecutor,
        ioc: IocExecutor,
        enable_fallback: bool,
        fallback_on_medium: bool,
    ) -> Self {
        Self {
            maker,
            ioc,
            enable_fallback,
            fallback_on_medium,
            in_flight: Mutex::new(HashSet::new()),
            stats: Mutex::new(ExecutorStats::default()),
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().clone()
    }

    /// Route one classified signal. Returns `Busy` without touching the venue
    /// when an order for the same (symbol, side) is still live.
    pub async fn execute(
        &self,
        score: &SignalScore,
        size: Decimal,
        market_data: &MarketData,
    ) -> EngineResult<ExecutionReport> {
        self.stats.lock().total_signals += 1;

        let side = if score.value > 0.0 {
            Side::Buy
        } else if score.value < 0.0 {
            Side::Sell
        } else {
            self.stats.lock().skipped_signals += 1;
            return Ok(ExecutionReport::skip());
        };

        if score.confidence == ConfidenceLevel::Low {
            debug!(symbol = %market_data.symbol, value = score.value, "low confidence, skipping");
            self.stats.lock().skipped_signals += 1;
            return Ok(ExecutionReport::skip());
        }

        let key = (market_data.symbol.clone(), side);
        let _guard = {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(key.clone()) {
                return Err(EngineError::Busy {
                    symbol: key.0,
                    side: side.as_str(),
                });
            }
            InFlightGuard {
                set: &self.in_flight,
                key,
            }
        };

        let fallback_allowed = self.enable_fallback
            && (score.confidence == ConfidenceLevel::High || self.fallback_on_medium);

        self.stats.lock().maker_attempts += 1;
        let outcome = self
            .maker
            .execute(score.confidence, side, size, market_data)
            .await?;

        match outcome {
            MakerOutcome::Filled(order) => {
                let mut stats = self.stats.lock();
                stats.maker_fills += 1;
                Ok(ExecutionReport {
                    order: Some(order),
                    maker_attempted: true,
                    maker_filled: true,
                    used_fallback: false,
                })
            }
            MakerOutcome::TimedOut(order) => {
                // A partial captured during the cancel race still counts as
                // an order to book, but the maker attempt missed.
                let partial = if order.filled_size > Decimal::ZERO {
                    Some(order)
                } else {
                    None
                };
                if partial.is_none() && fallback_allowed {
                    info!(symbol = %market_data.symbol, side = side.as_str(), "maker timed out, falling back to ioc");
                    return self.fallback(side, size, market_data, true).await;
                }
                Ok(ExecutionReport {
                    order: partial,
                    maker_attempted: true,
                    maker_filled: false,
                    used_fallback: false,
                })
            }
            MakerOutcome::PostOnlyRejected => {
                // Would have crossed: the taker leg fires without waiting out
                // any timer, regardless of tier fallback settings.
                info!(symbol = %market_data.symbol, side = side.as_str(), "post-only crossed, immediate ioc");
                self.fallback(side, size, market_data, true).await
            }
            MakerOutcome::Rejected(order) => {
                debug!(symbol = %market_data.symbol, error = ?order.error, "maker rejected");
                Ok(ExecutionReport {
                    order: None,
                    maker_attempted: true,
                    maker_filled: false,
                    used_fallback: false,
                })
            }
        }
    }

    async fn fallback(
        &self,
        side: Side,
        size: Decimal,
        market_data: &MarketData,
        maker_attempted: bool,
    ) -> EngineResult<ExecutionReport> {
        {
            let mut stats = self.stats.lock();
            stats.ioc_attempts += 1;
            stats.fallback_executions += 1;
        }

        let order = self.ioc.execute(side, size, market_data).await?;
        if order.is_some() {
            self.stats.lock().ioc_fills += 1;
        }

        Ok(ExecutionReport {
            order,
            maker_attempted,
            maker_filled: false,
            used_fallback: true,
        })
    }
}
