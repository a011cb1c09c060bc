//! IOC Executor
//!
//! Taker leg: a limit order priced through the touch by the configured
//! slippage budget, immediate-or-cancel. Partial fills are accepted and the
//! residual is treated as a miss, never re-submitted.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::transport::{
    with_retry, ExecutionTransport, PlaceDisposition, PlaceRequest, IOC_LATENCY_CAP,
};
use crate::types::{MarketData, Order, OrderStatus, OrderType, Side};

pub struct IocExecutor {
    transport: Arc<dyn ExecutionTransport>,
    /// Price adjustment past best-opposite, basis points.
    price_adjustment_bps: Decimal,
    /// Round-trip latency cap; expiry reads as a miss.
    latency_cap: Duration,
}

impl IocExecutor {
    pub fn new(transport: Arc<dyn ExecutionTransport>, price_adjustment_bps: f64) -> Self {
        Self {
            transport,
            price_adjustment_bps: Decimal::try_from(price_adjustment_bps)
                .unwrap_or(Decimal::ZERO),
            latency_cap: IOC_LATENCY_CAP,
        }
    }

    /// Aggressive limit price: best-opposite pushed through by the budget.
    fn ioc_price(&self, side: Side, market_data: &MarketData) -> Option<Decimal> {
        let adjustment = self.price_adjustment_bps / Decimal::from(10_000);
        match side {
            Side::Buy => market_data
                .best_ask()
                .map(|l| l.price * (Decimal::ONE + adjustment)),
            Side::Sell => market_data
                .best_bid()
                .map(|l| l.price * (Decimal::ONE - adjustment)),
        }
    }

    /// Execute immediately or miss. `Ok(None)` is a miss (nothing crossed,
    /// venue rejection, or latency cap hit); partial fills come back as
    /// `PartialFilled` orders.
    pub async fn execute(
        &self,
        side: Side,
        size: Decimal,
        market_data: &MarketData,
    ) -> EngineResult<Option<Order>> {
        let price = self
            .ioc_price(side, market_data)
            .ok_or_else(|| EngineError::Component("ioc: empty book side".into()))?;

        let mut order = Order::new(
            market_data.symbol.clone(),
            side,
            OrderType::Ioc,
            price,
            size,
        );

        let request = PlaceRequest {
            client_id: order.id.clone(),
            symbol: order.symbol.clone(),
            side,
            order_type: OrderType::Ioc,
            price,
            size,
            post_only: false,
        };

        debug!(symbol = %order.symbol, side = side.as_str(), %price, %size, "placing ioc order");

        let ack = match timeout(
            self.latency_cap,
            with_retry("ioc_place", || self.transport.place_order(request.clone())),
        )
        .await
        {
            Ok(Ok(ack)) => ack,
            Ok(Err(err)) => {
                warn!(symbol = %order.symbol, error = %err, "ioc placement failed");
                return Ok(None);
            }
            Err(_) => {
                warn!(symbol = %order.symbol, cap_ms = self.latency_cap.as_millis() as u64, "ioc latency cap exceeded");
                return Ok(None);
            }
        };

        match ack.disposition {
            PlaceDisposition::Filled { price, size: filled } => {
                order.price = price;
                order.filled_size = filled;
                order.status = if filled >= order.size {
                    OrderStatus::Filled
                } else {
                    // Residual is a miss by contract; nothing re-submits it.
                    OrderStatus::PartialFilled
                };
                info!(
                    symbol = %order.symbol,
                    order_id = %order.id,
                    %price,
                    filled = %filled,
                    "ioc executed"
                );
                Ok(Some(order))
            }
            PlaceDisposition::Unfilled => {
                debug!(symbol = %order.symbol, "ioc missed");
                Ok(None)
            }
            PlaceDisposition::Rejected { reason } => {
                warn!(symbol = %order.symbol, reason = %reason, "ioc rejected");
                Ok(None)
            }
            PlaceDisposition::RejectedPostOnly | PlaceDisposition::Resting => {
                // An IOC can neither rest nor trip the post-only check.
                Err(EngineError::Transport(format!(
                    "venue returned invalid ioc disposition for {}",
                    order.id
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{PaperOutcome, PaperTransport};
    use crate::types::Level;
    use rust_decimal_macros::dec;

    fn market() -> MarketData {
        MarketData {
            symbol: "BTC".into(),
            timestamp_ms: 0,
            bids: vec![Level::new(dec!(100.0), dec!(5))],
            asks: vec![Level::new(dec!(100.5), dec!(5))],
            trades: vec![],
            mid_price: dec!(100.25),
        }
    }

    #[tokio::test]
    async fn test_buy_prices_through_the_ask() {
        let transport = Arc::new(PaperTransport::new());
        transport.script(PaperOutcome::IocFill { ratio: 1.0 });
        let ioc = IocExecutor::new(transport.clone(), 10.0);

        let order = ioc
            .execute(Side::Buy, dec!(0.5), &market())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        // 100.5 * (1 + 10 bps)
        assert_eq!(transport.placements()[0].price, dec!(100.6005));
        assert!(!transport.placements()[0].post_only);
    }

    #[tokio::test]
    async fn test_sell_prices_through_the_bid() {
        let transport = Arc::new(PaperTransport::new());
        transport.script(PaperOutcome::IocFill { ratio: 1.0 });
        let ioc = IocExecutor::new(transport.clone(), 10.0);

        ioc.execute(Side::Sell, dec!(0.5), &market()).await.unwrap();
        assert_eq!(transport.placements()[0].price, dec!(99.9));
    }

    #[tokio::test]
    async fn test_partial_fill_accepted_not_resubmitted() {
        let transport = Arc::new(PaperTransport::new());
        transport.script(PaperOutcome::IocFill { ratio: 0.4 });
        let ioc = IocExecutor::new(transport.clone(), 0.0);

        let order = ioc
            .execute(Side::Buy, dec!(1), &market())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::PartialFilled);
        assert_eq!(order.filled_size, dec!(0.4));
        assert_eq!(transport.placements().len(), 1);
    }

    #[tokio::test]
    async fn test_miss_returns_none() {
        let transport = Arc::new(PaperTransport::new());
        transport.script(PaperOutcome::IocMiss);
        let ioc = IocExecutor::new(transport, 0.0);

        assert!(ioc.execute(Side::Buy, dec!(1), &market()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejection_is_a_miss() {
        let transport = Arc::new(PaperTransport::new());
        transport.script(PaperOutcome::Reject {
            reason: "insufficient margin".into(),
        });
        let ioc = IocExecutor::new(transport, 0.0);

        assert!(ioc.execute(Side::Buy, dec!(1), &market()).await.unwrap().is_none());
    }
}
