//! Take-Profit / Stop-Loss and the Position Closer
//!
//! Exit triggers are computed from the entry price: a fractional move of
//! `tp_pct` with profit sign, `sl_pct` with loss sign, or a position older
//! than the maximum age. The closer sweeps every open position BEFORE the
//! open-side logic each loop iteration so risk exits are never starved by new
//! entries, and flattens with a reducing IOC of the full current size.

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::execution::IocExecutor;
use crate::risk::position::{Position, PositionManager};
use crate::types::{MarketData, Millis, Order};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    MaxAge,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::MaxAge => "max_age",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TpSlManager {
    tp_pct: Decimal,
    sl_pct: Decimal,
}

impl TpSlManager {
    pub fn new(tp_pct: f64, sl_pct: f64) -> EngineResult<Self> {
        if tp_pct <= 0.0 || sl_pct <= 0.0 {
            return Err(EngineError::Config(
                "tp_pct and sl_pct must be positive".into(),
            ));
        }
        Ok(Self {
            tp_pct: Decimal::try_from(tp_pct).map_err(|e| EngineError::Config(e.to_string()))?,
            sl_pct: Decimal::try_from(sl_pct).map_err(|e| EngineError::Config(e.to_string()))?,
        })
    }

    /// TP/SL trigger for a position at a mark, if any. The fractional move
    /// from entry is signed by position direction so a long profits on an up
    /// move and a short on a down move.
    pub fn check(&self, position: &Position, mark: Decimal) -> Option<ExitReason> {
        if position.is_flat() || position.avg_entry_price.is_zero() {
            return None;
        }
        let entry = position.avg_entry_price;
        let move_pct = (mark - entry) / entry * position.size.signum();

        if move_pct >= self.tp_pct {
            Some(ExitReason::TakeProfit)
        } else if move_pct <= -self.sl_pct {
            Some(ExitReason::StopLoss)
        } else {
            None
        }
    }
}

pub struct PositionCloser {
    tp_sl: TpSlManager,
    max_age: Duration,
}

/// A flattening order produced by the sweep, with why it fired.
#[derive(Debug, Clone)]
pub struct CloseResult {
    pub order: Order,
    pub reason: ExitReason,
    /// Mid at decision time, for attribution reference.
    pub reference_mid: Decimal,
}

impl PositionCloser {
    pub fn new(tp_sl: TpSlManager, max_age: Duration) -> Self {
        Self { tp_sl, max_age }
    }

    /// Decide whether a position must exit now.
    pub fn exit_reason(&self, position: &Position, mark: Decimal, now: Millis) -> Option<ExitReason> {
        if position.is_flat() {
            return None;
        }
        if let Some(reason) = self.tp_sl.check(position, mark) {
            return Some(reason);
        }
        let age_ms = now.saturating_sub(position.opened_at);
        if age_ms >= self.max_age.as_millis() as i64 {
            return Some(ExitReason::MaxAge);
        }
        None
    }

    /// Sweep all open positions and submit flattening IOCs for the triggered
    /// ones. Fills are NOT booked here; the engine owns the ledger and books
    /// every returned order in the same tick.
    pub async fn sweep(
        &self,
        positions: &PositionManager,
        market: &HashMap<String, MarketData>,
        ioc: &IocExecutor,
        now: Millis,
    ) -> Vec<CloseResult> {
        let mut closed = Vec::new();

        for position in positions.open_positions() {
            let Some(market_data) = market.get(&position.symbol) else {
                continue;
            };
            if market_data.mid_price.is_zero() {
                continue;
            }
            let Some(reason) = self.exit_reason(position, market_data.mid_price, now) else {
                continue;
            };
            let Some(side) = position.reducing_side() else {
                continue;
            };

            info!(
                symbol = %position.symbol,
                reason = reason.as_str(),
                size = %position.size,
                entry = %position.avg_entry_price,
                mark = %market_data.mid_price,
                "closing position"
            );

            match ioc.execute(side, position.size.abs(), market_data).await {
                Ok(Some(order)) => closed.push(CloseResult {
                    order,
                    reason,
                    reference_mid: market_data.mid_price,
                }),
                Ok(None) => {
                    // Missed the book; the next sweep retries.
                    warn!(symbol = %position.symbol, reason = reason.as_str(), "close order missed");
                }
                Err(err) => {
                    warn!(symbol = %position.symbol, error = %err, "close order failed");
                }
            }
        }

        closed
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{PaperOutcome, PaperTransport};
    use crate::types::{Level, OrderStatus, Side};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn position(size: Decimal, entry: Decimal, opened_at: Millis) -> Position {
        Position {
            symbol: "BTC".into(),
            size,
            avg_entry_price: entry,
            realized_pnl: Decimal::ZERO,
            opened_at,
            updated_at: opened_at,
        }
    }

    #[test]
    fn test_long_take_profit() {
        let tp_sl = TpSlManager::new(0.02, 0.01).unwrap();
        let pos = position(dec!(0.5), dec!(100), 0);
        assert_eq!(tp_sl.check(&pos, dec!(102)), Some(ExitReason::TakeProfit));
        assert_eq!(tp_sl.check(&pos, dec!(101.9)), None);
    }

    #[test]
    fn test_long_stop_loss() {
        let tp_sl = TpSlManager::new(0.02, 0.01).unwrap();
        let pos = position(dec!(0.5), dec!(100), 0);
        assert_eq!(tp_sl.check(&pos, dec!(99)), Some(ExitReason::StopLoss));
        assert_eq!(tp_sl.check(&pos, dec!(99.1)), None);
    }

    #[test]
    fn test_short_triggers_mirror() {
        let tp_sl = TpSlManager::new(0.02, 0.01).unwrap();
        let pos = position(dec!(-0.5), dec!(100), 0);
        assert_eq!(tp_sl.check(&pos, dec!(98)), Some(ExitReason::TakeProfit));
        assert_eq!(tp_sl.check(&pos, dec!(101)), Some(ExitReason::StopLoss));
    }

    #[test]
    fn test_max_age_trigger() {
        let tp_sl = TpSlManager::new(0.02, 0.01).unwrap();
        let closer = PositionCloser::new(tp_sl, Duration::from_secs(1800));
        let pos = position(dec!(0.5), dec!(100), 0);
        // Inside band, young: no exit.
        assert_eq!(closer.exit_reason(&pos, dec!(100.5), 1_799_999), None);
        // Inside band, old: age exit.
        assert_eq!(
            closer.exit_reason(&pos, dec!(100.5), 1_800_000),
            Some(ExitReason::MaxAge)
        );
    }

    #[test]
    fn test_tp_takes_priority_over_age() {
        let tp_sl = TpSlManager::new(0.02, 0.01).unwrap();
        let closer = PositionCloser::new(tp_sl, Duration::from_secs(1));
        let pos = position(dec!(0.5), dec!(100), 0);
        assert_eq!(
            closer.exit_reason(&pos, dec!(102), 10_000_000),
            Some(ExitReason::TakeProfit)
        );
    }

    #[tokio::test]
    async fn test_sweep_flattens_triggered_position() {
        let transport = Arc::new(PaperTransport::new());
        transport.script(PaperOutcome::IocFill { ratio: 1.0 });
        let ioc = IocExecutor::new(transport.clone(), 5.0);

        let mut positions = PositionManager::new();
        positions.apply_fill("BTC", Side::Buy, dec!(0.5), dec!(100), 0);

        let market_data = MarketData {
            symbol: "BTC".into(),
            timestamp_ms: 0,
            bids: vec![Level::new(dec!(101.9), dec!(5))],
            asks: vec![Level::new(dec!(102.1), dec!(5))],
            trades: vec![],
            mid_price: dec!(102),
        };
        let mut market = HashMap::new();
        market.insert("BTC".to_string(), market_data);

        let tp_sl = TpSlManager::new(0.02, 0.01).unwrap();
        let closer = PositionCloser::new(tp_sl, Duration::from_secs(1800));

        let closed = closer.sweep(&positions, &market, &ioc, 1_000).await;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].reason, ExitReason::TakeProfit);
        assert_eq!(closed[0].order.side, Side::Sell);
        assert_eq!(closed[0].order.filled_size, dec!(0.5));
        assert_eq!(closed[0].order.status, OrderStatus::Filled);
        assert_eq!(closed[0].reference_mid, dec!(102));
    }

    #[tokio::test]
    async fn test_sweep_skips_untriggered_and_unknown_symbols() {
        let transport = Arc::new(PaperTransport::new());
        let ioc = IocExecutor::new(transport.clone(), 5.0);

        let mut positions = PositionManager::new();
        positions.apply_fill("BTC", Side::Buy, dec!(0.5), dec!(100), 0);
        positions.apply_fill("ETH", Side::Buy, dec!(1), dec!(2000), 0);

        // Only BTC has market data, and it sits inside the band.
        let market_data = MarketData {
            symbol: "BTC".into(),
            timestamp_ms: 0,
            bids: vec![Level::new(dec!(100.4), dec!(5))],
            asks: vec![Level::new(dec!(100.6), dec!(5))],
            trades: vec![],
            mid_price: dec!(100.5),
        };
        let mut market = HashMap::new();
        market.insert("BTC".to_string(), market_data);

        let tp_sl = TpSlManager::new(0.02, 0.01).unwrap();
        let closer = PositionCloser::new(tp_sl, Duration::from_secs(1800));

        let closed = closer.sweep(&positions, &market, &ioc, 1_000).await;
        assert!(closed.is_empty());
        assert!(transport.placements().is_empty());
    }
}
