//! Hard Risk Limits
//!
//! Pre-trade admission gate plus the running NAV / drawdown fuse. Checks run
//! in a fixed order and the first failure short-circuits:
//!
//! 1. projected position notional vs the absolute USD cap,
//! 2. single-trade worst-case loss vs `max_single_loss_pct * initial_nav`,
//! 3. daily drawdown vs `max_daily_drawdown_pct`,
//! 4. the breach latch.
//!
//! Once the latch trips, every order is rejected until the operator clears
//! it. Rejections are decisions, not errors; callers log and move on.

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::types::Side;

/// Volatility proxy used for the single-trade worst-case reversal, as a
/// fraction of notional.
const SINGLE_TRADE_STD_FRACTION: &str = "0.01";

#[derive(Debug, Clone, PartialEq)]
pub struct RiskStatus {
    pub initial_nav: Decimal,
    pub day_start_nav: Decimal,
    pub current_nav: Decimal,
    pub daily_pnl: Decimal,
    pub is_breached: bool,
    pub breach_reason: Option<String>,
}

pub struct HardLimits {
    initial_nav: Decimal,
    day_start_nav: Decimal,
    current_nav: Decimal,
    max_single_loss_pct: Decimal,
    max_daily_drawdown_pct: Decimal,
    max_position_usd: Decimal,
    single_trade_std: Decimal,
    is_breached: bool,
    breach_reason: Option<String>,
}

impl HardLimits {
    pub fn new(
        initial_nav: Decimal,
        max_single_loss_pct: f64,
        max_daily_drawdown_pct: f64,
        max_position_usd: Decimal,
    ) -> EngineResult<Self> {
        if initial_nav <= Decimal::ZERO {
            return Err(EngineError::Config("initial_nav must be positive".into()));
        }
        if !(0.0 < max_single_loss_pct && max_single_loss_pct < 1.0)
            || !(0.0 < max_daily_drawdown_pct && max_daily_drawdown_pct < 1.0)
        {
            return Err(EngineError::Config(
                "risk percentages must be in (0, 1)".into(),
            ));
        }
        Ok(Self {
            initial_nav,
            day_start_nav: initial_nav,
            current_nav: initial_nav,
            max_single_loss_pct: Decimal::try_from(max_single_loss_pct)
                .map_err(|e| EngineError::Config(e.to_string()))?,
            max_daily_drawdown_pct: Decimal::try_from(max_daily_drawdown_pct)
                .map_err(|e| EngineError::Config(e.to_string()))?,
            max_position_usd,
            single_trade_std: SINGLE_TRADE_STD_FRACTION.parse().expect("const parses"),
            is_breached: false,
            breach_reason: None,
        })
    }

    /// Pre-trade admission for an order of `size` at `price`, given the
    /// current signed position in the same symbol. `Ok(())` admits.
    pub fn check_order(
        &self,
        side: Side,
        size: Decimal,
        price: Decimal,
        current_position_size: Decimal,
    ) -> EngineResult<()> {
        // 1. Projected notional against the absolute cap.
        let projected_size = current_position_size + size * side.sign();
        let projected_notional = projected_size.abs() * price;
        if projected_notional > self.max_position_usd {
            return Err(EngineError::RiskRejected(format!(
                "projected notional {} exceeds max {}",
                projected_notional, self.max_position_usd
            )));
        }

        // 2. Worst-case single-trade loss: one estimator-std reversal.
        let worst_case_loss = size * price * self.single_trade_std;
        let loss_limit = self.initial_nav * self.max_single_loss_pct;
        if worst_case_loss > loss_limit {
            return Err(EngineError::RiskRejected(format!(
                "worst-case loss {} exceeds single-trade limit {}",
                worst_case_loss, loss_limit
            )));
        }

        // 3. Daily drawdown fuse.
        if self.daily_drawdown() <= -self.max_daily_drawdown_pct {
            return Err(EngineError::RiskRejected(format!(
                "daily drawdown {} beyond limit {}",
                self.daily_drawdown(),
                self.max_daily_drawdown_pct
            )));
        }

        // 4. Breach latch.
        if self.is_breached {
            return Err(EngineError::BreachLatched(
                self.breach_reason
                    .clone()
                    .unwrap_or_else(|| "risk breach".into()),
            ));
        }

        Ok(())
    }

    /// Signed daily return versus day-start NAV.
    fn daily_drawdown(&self) -> Decimal {
        if self.day_start_nav.is_zero() {
            return Decimal::ZERO;
        }
        (self.current_nav - self.day_start_nav) / self.day_start_nav
    }

    /// Apply a realized PnL delta. Crossing the daily-drawdown threshold
    /// trips the latch.
    pub fn update_pnl(&mut self, delta: Decimal) {
        self.current_nav += delta;

        if !self.is_breached && self.daily_drawdown() <= -self.max_daily_drawdown_pct {
            let reason = format!(
                "daily drawdown {:.4} breached limit {}",
                self.daily_drawdown(),
                self.max_daily_drawdown_pct
            );
            warn!(reason = %reason, "risk breach latched");
            self.is_breached = true;
            self.breach_reason = Some(reason);
        }
    }

    pub fn is_breached(&self) -> bool {
        self.is_breached
    }

    /// Operator action: clear the latch and re-admit orders.
    pub fn clear_breach(&mut self) {
        info!("risk breach latch cleared by operator");
        self.is_breached = false;
        self.breach_reason = None;
    }

    /// Roll the daily anchor (UTC day boundary in the live engine).
    pub fn roll_day(&mut self) {
        self.day_start_nav = self.current_nav;
    }

    pub fn status(&self) -> RiskStatus {
        RiskStatus {
            initial_nav: self.initial_nav,
            day_start_nav: self.day_start_nav,
            current_nav: self.current_nav,
            daily_pnl: self.current_nav - self.day_start_nav,
            is_breached: self.is_breached,
            breach_reason: self.breach_reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limits() -> HardLimits {
        HardLimits::new(dec!(100000), 0.008, 0.05, dec!(10000)).unwrap()
    }

    #[test]
    fn test_construction_validates_percentages() {
        assert!(HardLimits::new(dec!(100000), 0.0, 0.05, dec!(10000)).is_err());
        assert!(HardLimits::new(dec!(100000), 0.008, 1.0, dec!(10000)).is_err());
        assert!(HardLimits::new(dec!(0), 0.008, 0.05, dec!(10000)).is_err());
    }

    #[test]
    fn test_notional_cap_boundary() {
        let limits = limits();
        // Existing long 4.9 @ 2000 = 9800 notional.
        let existing = dec!(4.9);
        // +0.1 -> 10000, exactly at the cap: admitted.
        assert!(limits
            .check_order(Side::Buy, dec!(0.1), dec!(2000), existing)
            .is_ok());
        // +0.2 -> 10200: denied.
        let denied = limits.check_order(Side::Buy, dec!(0.2), dec!(2000), existing);
        assert!(matches!(denied, Err(EngineError::RiskRejected(_))));
    }

    #[test]
    fn test_reducing_trade_passes_notional_cap() {
        let limits = limits();
        // Short 4.9 reduced by a buy shrinks the projection.
        assert!(limits
            .check_order(Side::Buy, dec!(1), dec!(2000), dec!(-4.9))
            .is_ok());
    }

    #[test]
    fn test_single_trade_loss_cap() {
        let limits = limits();
        // Worst case = size * price * 1%. Limit = 0.8% of 100k = 800.
        // A large reducing buy passes the notional projection (ends nearly
        // flat) but its own worst-case reversal 45 * 2000 * 1% = 900 > 800.
        let denied = limits.check_order(Side::Buy, dec!(45), dec!(2000), dec!(-44.9));
        assert!(matches!(denied, Err(EngineError::RiskRejected(_))));
    }

    #[test]
    fn test_drawdown_trips_latch_and_rejects() {
        let mut limits = limits();
        limits.update_pnl(dec!(-5001));
        assert!(limits.is_breached());

        let result = limits.check_order(Side::Buy, dec!(0.001), dec!(2000), Decimal::ZERO);
        // Check 3 (drawdown) fires before the latch in spec order.
        assert!(matches!(result, Err(EngineError::RiskRejected(_))));
    }

    #[test]
    fn test_latch_holds_after_recovery_until_cleared() {
        let mut limits = limits();
        limits.update_pnl(dec!(-5001));
        assert!(limits.is_breached());

        // PnL recovers, drawdown check passes, but the latch still rejects.
        limits.update_pnl(dec!(6000));
        let result = limits.check_order(Side::Buy, dec!(0.001), dec!(2000), Decimal::ZERO);
        assert!(matches!(result, Err(EngineError::BreachLatched(_))));

        limits.clear_breach();
        assert!(limits
            .check_order(Side::Buy, dec!(0.001), dec!(2000), Decimal::ZERO)
            .is_ok());
    }

    #[test]
    fn test_boundary_does_not_breach() {
        let mut limits = limits();
        limits.update_pnl(dec!(-4999));
        assert!(!limits.is_breached());
        limits.update_pnl(dec!(-1));
        // Exactly -5%: the fuse fires at <= -limit.
        assert!(limits.is_breached());
    }

    #[test]
    fn test_status_reports_daily_pnl() {
        let mut limits = limits();
        limits.update_pnl(dec!(-1500));
        let status = limits.status();
        assert_eq!(status.daily_pnl, dec!(-1500));
        assert_eq!(status.current_nav, dec!(98500));
        assert!(!status.is_breached);
    }

    #[test]
    fn test_roll_day_resets_anchor() {
        let mut limits = limits();
        limits.update_pnl(dec!(-4000));
        limits.roll_day();
        assert_eq!(limits.status().daily_pnl, Decimal::ZERO);
        // A fresh -4% after the roll does not breach.
        limits.update_pnl(dec!(-3840));
        assert!(!limits.is_breached());
    }
}
