//! PnL Attribution
//!
//! Decomposes each filled order into Alpha + Fee + Slippage + Impact +
//! Rebate. Sign convention is uniform: costs are negative, so
//! `total = alpha + fee + slippage + impact + rebate` holds with no
//! side-specific exceptions. A negative maker fee rate books as a positive
//! rebate instead of a fee.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::types::{Millis, Order, OrderType};

#[derive(Debug, Clone, PartialEq)]
pub struct TradeAttribution {
    pub trade_id: String,
    pub symbol: String,
    /// Directional value predicted by the signal.
    pub alpha: Decimal,
    /// Exchange fee; negative.
    pub fee: Decimal,
    /// Execution price versus the signal-time mid; negative when adverse.
    pub slippage: Decimal,
    /// Execution price versus best-opposite at submission; negative when the
    /// fill walked past the touch.
    pub impact: Decimal,
    /// Maker rebate; positive or zero.
    pub rebate: Decimal,
    /// Invariant: `total = alpha + fee + slippage + impact + rebate`.
    pub total: Decimal,
    pub timestamp_ms: Millis,
}

/// Cumulative component sums and |total|-based percentages.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributionReport {
    pub alpha: Decimal,
    pub fee: Decimal,
    pub slippage: Decimal,
    pub impact: Decimal,
    pub rebate: Decimal,
    pub total: Decimal,
    pub alpha_pct: f64,
    pub fee_pct: f64,
    pub slippage_pct: f64,
    pub impact_pct: f64,
    pub rebate_pct: f64,
    pub trade_count: usize,
}

pub struct PnLAttribution {
    maker_fee_rate: Decimal,
    taker_fee_rate: Decimal,
    /// Volatility proxy for the alpha term, as a fraction of reference mid.
    volatility_fraction: Decimal,
    /// Alpha share below which the quick health check fails.
    alpha_threshold_pct: f64,
    history: VecDeque<TradeAttribution>,
    max_history: usize,
    cumulative_alpha: Decimal,
    cumulative_fee: Decimal,
    cumulative_slippage: Decimal,
    cumulative_impact: Decimal,
    cumulative_rebate: Decimal,
    cumulative_total: Decimal,
}

impl PnLAttribution {
    pub fn new(maker_fee_rate: f64, taker_fee_rate: f64) -> EngineResult<Self> {
        let convert = |value: f64| {
            Decimal::try_from(value).map_err(|e| EngineError::Config(e.to_string()))
        };
        Ok(Self {
            maker_fee_rate: convert(maker_fee_rate)?,
            taker_fee_rate: convert(taker_fee_rate)?,
            volatility_fraction: convert(0.01)?,
            alpha_threshold_pct: 70.0,
            history: VecDeque::new(),
            max_history: 10_000,
            cumulative_alpha: Decimal::ZERO,
            cumulative_fee: Decimal::ZERO,
            cumulative_slippage: Decimal::ZERO,
            cumulative_impact: Decimal::ZERO,
            cumulative_rebate: Decimal::ZERO,
            cumulative_total: Decimal::ZERO,
        })
    }

    fn fee_rate(&self, order_type: OrderType) -> Decimal {
        match order_type {
            OrderType::LimitPostOnly => self.maker_fee_rate,
            OrderType::Ioc => self.taker_fee_rate,
        }
    }

    /// Attribute one filled (or partially filled) order.
    ///
    /// `reference_mid` is the mid at signal time; `best_price` the best
    /// opposite price at submission.
    pub fn attribute_trade(
        &mut self,
        order: &Order,
        signal_value: f64,
        reference_mid: Decimal,
        best_price: Decimal,
    ) -> TradeAttribution {
        let quantity = order.filled_size;
        let fill_price = order.price;
        let direction = order.side.sign();
        let notional = quantity * fill_price;

        // Fee or rebate by liquidity role.
        let rate = self.fee_rate(order.order_type);
        let (fee, rebate) = if rate >= Decimal::ZERO {
            (-notional * rate, Decimal::ZERO)
        } else {
            (Decimal::ZERO, -notional * rate)
        };

        // Negative = cost, for both sides: a buy filled above the reference
        // mid paid up; a sell filled below it gave up.
        let slippage = -(fill_price - reference_mid) * quantity * direction;
        let impact = -(fill_price - best_price) * quantity * direction;

        // Directional value: the signal's conviction times a volatility unit.
        let sigma = reference_mid * self.volatility_fraction;
        let alpha =
            Decimal::try_from(signal_value).unwrap_or(Decimal::ZERO) * sigma * quantity;

        let total = alpha + fee + slippage + impact + rebate;

        let attribution = TradeAttribution {
            trade_id: order.id.clone(),
            symbol: order.symbol.clone(),
            alpha,
            fee,
            slippage,
            impact,
            rebate,
            total,
            timestamp_ms: order.created_at,
        };
        self.record(&attribution);

        info!(
            trade_id = %attribution.trade_id,
            symbol = %attribution.symbol,
            alpha = %attribution.alpha,
            fee = %attribution.fee,
            slippage = %attribution.slippage,
            impact = %attribution.impact,
            total = %attribution.total,
            "trade attributed"
        );
        attribution
    }

    fn record(&mut self, attribution: &TradeAttribution) {
        self.history.push_back(attribution.clone());
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
        self.cumulative_alpha += attribution.alpha;
        self.cumulative_fee += attribution.fee;
        self.cumulative_slippage += attribution.slippage;
        self.cumulative_impact += attribution.impact;
        self.cumulative_rebate += attribution.rebate;
        self.cumulative_total += attribution.total;
    }

    /// Component share of |cumulative total|, percent. The absolute base
    /// keeps the semantics stable through loss regimes.
    pub fn alpha_percentage(&self) -> f64 {
        self.percentage(self.cumulative_alpha)
    }

    fn percentage(&self, component: Decimal) -> f64 {
        if self.cumulative_total.is_zero() {
            return 0.0;
        }
        (component / self.cumulative_total.abs() * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0)
    }

    pub fn trade_count(&self) -> usize {
        self.history.len()
    }

    pub fn cumulative_total(&self) -> Decimal {
        self.cumulative_total
    }

    /// Quick alpha-share check: passes trivially before any trades, then
    /// requires alpha >= 70% of |total|.
    pub fn check_alpha_health(&self) -> (bool, String) {
        if self.cumulative_total.is_zero() {
            return (true, "no trades yet, health check skipped".into());
        }
        let alpha_pct = self.alpha_percentage().abs();
        if alpha_pct >= self.alpha_threshold_pct {
            debug!(alpha_pct, "alpha health check passed");
            (
                true,
                format!("alpha {:.1}% >= {:.1}%", alpha_pct, self.alpha_threshold_pct),
            )
        } else {
            warn!(alpha_pct, "alpha health check failed");
            (
                false,
                format!("alpha {:.1}% < {:.1}%", alpha_pct, self.alpha_threshold_pct),
            )
        }
    }

    pub fn report(&self) -> AttributionReport {
        AttributionReport {
            alpha: self.cumulative_alpha,
            fee: self.cumulative_fee,
            slippage: self.cumulative_slippage,
            impact: self.cumulative_impact,
            rebate: self.cumulative_rebate,
            total: self.cumulative_total,
            alpha_pct: self.percentage(self.cumulative_alpha),
            fee_pct: self.percentage(self.cumulative_fee),
            slippage_pct: self.percentage(self.cumulative_slippage),
            impact_pct: self.percentage(self.cumulative_impact),
            rebate_pct: self.percentage(self.cumulative_rebate),
            trade_count: self.history.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderStatus, Side};
    use rust_decimal_macros::dec;

    fn filled_order(side: Side, order_type: OrderType, price: Decimal, size: Decimal) -> Order {
        let mut order = Order::new("BTC", side, order_type, price, size);
        order.filled_size = size;
        order.status = OrderStatus::Filled;
        order
    }

    #[test]
    fn test_total_identity() {
        let mut attribution = PnLAttribution::new(0.00015, 0.00045).unwrap();
        let order = filled_order(Side::Buy, OrderType::Ioc, dec!(100.6), dec!(0.5));
        let result = attribution.attribute_trade(&order, 0.7, dec!(100.5), dec!(100.5));
        assert_eq!(
            result.total,
            result.alpha + result.fee + result.slippage + result.impact + result.rebate
        );
    }

    #[test]
    fn test_taker_fee_negative() {
        let mut attribution = PnLAttribution::new(0.00015, 0.00045).unwrap();
        let order = filled_order(Side::Buy, OrderType::Ioc, dec!(100), dec!(1));
        let result = attribution.attribute_trade(&order, 0.0, dec!(100), dec!(100));
        assert_eq!(result.fee, dec!(-0.045));
        assert_eq!(result.rebate, Decimal::ZERO);
    }

    #[test]
    fn test_negative_maker_rate_books_as_rebate() {
        let mut attribution = PnLAttribution::new(-0.0001, 0.00045).unwrap();
        let order = filled_order(Side::Buy, OrderType::LimitPostOnly, dec!(100), dec!(1));
        let result = attribution.attribute_trade(&order, 0.0, dec!(100), dec!(100));
        assert_eq!(result.fee, Decimal::ZERO);
        assert_eq!(result.rebate, dec!(0.01));
    }

    #[test]
    fn test_favorable_maker_fill_positive_slippage() {
        let mut attribution = PnLAttribution::new(0.00015, 0.00045).unwrap();
        // Passive buy below the signal-time mid 100.5: a saving.
        let order = filled_order(Side::Buy, OrderType::LimitPostOnly, dec!(99.9), dec!(1));
        let result = attribution.attribute_trade(&order, 0.6, dec!(100.5), dec!(100));
        assert_eq!(result.slippage, dec!(0.6));
    }

    #[test]
    fn test_adverse_buy_negative_slippage_and_impact() {
        let mut attribution = PnLAttribution::new(0.00015, 0.00045).unwrap();
        // Aggressive buy through the book: filled past mid and past the best.
        let order = filled_order(Side::Buy, OrderType::Ioc, dec!(100.8), dec!(1));
        let result = attribution.attribute_trade(&order, 0.6, dec!(100.5), dec!(100.6));
        assert_eq!(result.slippage, dec!(-0.3));
        assert_eq!(result.impact, dec!(-0.2));
    }

    #[test]
    fn test_sell_side_signs_mirror() {
        let mut attribution = PnLAttribution::new(0.00015, 0.00045).unwrap();
        // Sell above mid is favorable.
        let order = filled_order(Side::Sell, OrderType::LimitPostOnly, dec!(100.9), dec!(1));
        let result = attribution.attribute_trade(&order, -0.6, dec!(100.5), dec!(101));
        assert_eq!(result.slippage, dec!(0.4));
        // Filled below the best opposite: impact cost.
        assert_eq!(result.impact, dec!(-0.1));
    }

    #[test]
    fn test_alpha_uses_volatility_proxy() {
        let mut attribution = PnLAttribution::new(0.0, 0.0).unwrap();
        let order = filled_order(Side::Buy, OrderType::Ioc, dec!(100), dec!(2));
        let result = attribution.attribute_trade(&order, 0.5, dec!(100), dec!(100));
        // 0.5 * (1% of 100) * 2
        assert_eq!(result.alpha, dec!(1.0));
    }

    #[test]
    fn test_percentages_use_absolute_total() {
        let mut attribution = PnLAttribution::new(0.0, 0.0).unwrap();
        // Strong negative signal executed long: alpha negative, total negative.
        let order = filled_order(Side::Buy, OrderType::Ioc, dec!(100), dec!(2));
        attribution.attribute_trade(&order, -0.5, dec!(100), dec!(100));
        let report = attribution.report();
        assert!(report.total < Decimal::ZERO);
        // Alpha is -100% of |total|, not +100%.
        assert!((report.alpha_pct + 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_health_check_no_trades_passes() {
        let attribution = PnLAttribution::new(0.00015, 0.00045).unwrap();
        let (healthy, _) = attribution.check_alpha_health();
        assert!(healthy);
    }

    #[test]
    fn test_health_check_alpha_dominated() {
        let mut attribution = PnLAttribution::new(0.0, 0.0).unwrap();
        let order = filled_order(Side::Buy, OrderType::Ioc, dec!(100), dec!(1));
        // Pure alpha, no costs: 100% share.
        attribution.attribute_trade(&order, 0.8, dec!(100), dec!(100));
        let (healthy, message) = attribution.check_alpha_health();
        assert!(healthy, "{}", message);
    }
}
