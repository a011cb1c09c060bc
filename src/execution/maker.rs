//! Shallow Maker Executor
//!
//! Post-only limit order one tick behind the touch, with a confidence-tiered
//! resting timeout. Lifecycle:
//!
//! `PLACING -> RESTING -> (FILLED | CANCELLING -> CANCELLED | REJECTED_POST_ONLY)`
//!
//! A post-only rejection (the order would have crossed) short-circuits to the
//! caller immediately so the fallback leg does not wait out the timeout. The
//! resting timer runs from the placement acknowledgement. Fills that race the
//! cancel are booked onto the returned order.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::transport::{
    with_retry, ExecutionTransport, FillOutcome, PlaceDisposition, PlaceRequest, ORDER_ACK_TIMEOUT,
};
use crate::types::{ConfidenceLevel, MarketData, Order, OrderStatus, OrderType, Side};

/// Terminal result of one maker attempt.
#[derive(Debug, Clone)]
pub enum MakerOutcome {
    /// Filled while resting (or fully filled during the cancel race).
    Filled(Order),
    /// Rested out the window; cancelled. `filled_size` carries any partial
    /// fill captured during the cancel.
    TimedOut(Order),
    /// The venue rejected the post-only flag; the order never rested.
    PostOnlyRejected,
    /// Hard rejection (or acknowledgement timeout).
    Rejected(Order),
}

pub struct ShallowMakerExecutor {
    transport: Arc<dyn ExecutionTransport>,
    tick_offset: Decimal,
    timeout_high: Duration,
    timeout_medium: Duration,
    use_post_only: bool,
}

impl ShallowMakerExecutor {
    pub fn new(
        transport: Arc<dyn ExecutionTransport>,
        tick_offset: Decimal,
        timeout_high: Duration,
        timeout_medium: Duration,
        use_post_only: bool,
    ) -> Self {
        Self {
            transport,
            tick_offset,
            timeout_high,
            timeout_medium,
            use_post_only,
        }
    }

    /// Passive price one tick behind the touch on the order's own side.
    fn maker_price(&self, side: Side, market_data: &MarketData) -> Option<Decimal> {
        match side {
            Side::Buy => market_data.best_bid().map(|l| l.price - self.tick_offset),
            Side::Sell => market_data.best_ask().map(|l| l.price + self.tick_offset),
        }
    }

    fn resting_timeout(&self, confidence: ConfidenceLevel) -> Duration {
        match confidence {
            ConfidenceLevel::High => self.timeout_high,
            _ => self.timeout_medium,
        }
    }

    pub async fn execute(
        &self,
        confidence: ConfidenceLevel,
        side: Side,
        size: Decimal,
        market_data: &MarketData,
    ) -> EngineResult<MakerOutcome> {
        let price = self
            .maker_price(side, market_data)
            .ok_or_else(|| EngineError::Component("maker: empty book side".into()))?;
        if price <= Decimal::ZERO {
            return Err(EngineError::Component(format!(
                "maker price {} not positive",
                price
            )));
        }

        let mut order = Order::new(
            market_data.symbol.clone(),
            side,
            OrderType::LimitPostOnly,
            price,
            size,
        );

        let request = PlaceRequest {
            client_id: order.id.clone(),
            symbol: order.symbol.clone(),
            side,
            order_type: OrderType::LimitPostOnly,
            price,
            size,
            post_only: self.use_post_only,
        };

        debug!(
            symbol = %order.symbol,
            side = side.as_str(),
            %price,
            %size,
            "placing maker order"
        );

        // PLACING: submission retries on transport failure; the ack window is
        // bounded and expiry reads as a rejection.
        let ack = match timeout(
            ORDER_ACK_TIMEOUT,
            with_retry("maker_place", || {
                self.transport.place_order(request.clone())
            }),
        )
        .await
        {
            Ok(Ok(ack)) => ack,
            Ok(Err(err)) => {
                warn!(symbol = %order.symbol, error = %err, "maker placement failed");
                order.status = OrderStatus::Rejected;
                order.error = Some(err.to_string());
                return Ok(MakerOutcome::Rejected(order));
            }
            Err(_) => {
                warn!(symbol = %order.symbol, "maker placement ack timed out");
                order.status = OrderStatus::Rejected;
                order.error = Some("ack timeout".into());
                return Ok(MakerOutcome::Rejected(order));
            }
        };

        match ack.disposition {
            PlaceDisposition::RejectedPostOnly => {
                info!(symbol = %order.symbol, side = side.as_str(), "post-only rejected, order would cross");
                Ok(MakerOutcome::PostOnlyRejected)
            }
            PlaceDisposition::Rejected { reason } => {
                order.status = OrderStatus::Rejected;
                order.error = Some(reason);
                Ok(MakerOutcome::Rejected(order))
            }
            PlaceDisposition::Filled { price, size: filled } => {
                // Crossed at the venue despite the flag being off, or an
                // adapter that fills passively on arrival.
                order.price = price;
                order.filled_size = filled;
                order.status = if filled >= order.size {
                    OrderStatus::Filled
                } else {
                    OrderStatus::PartialFilled
                };
                Ok(MakerOutcome::Filled(order))
            }
            PlaceDisposition::Unfilled => {
                order.status = OrderStatus::Cancelled;
                Ok(MakerOutcome::TimedOut(order))
            }
            PlaceDisposition::Resting => {
                // RESTING: wait for the fill or the tier's timeout.
                self.wait_resting(order, confidence).await
            }
        }
    }

    async fn wait_resting(
        &self,
        mut order: Order,
        confidence: ConfidenceLevel,
    ) -> EngineResult<MakerOutcome> {
        let window = self.resting_timeout(confidence);
        let outcome = self.transport.await_fill(&order.id, window).await?;

        match outcome {
            FillOutcome::Filled { price, size } => {
                order.price = price;
                order.filled_size = size;
                order.status = if size >= order.size {
                    OrderStatus::Filled
                } else {
                    OrderStatus::PartialFilled
                };
                info!(
                    symbol = %order.symbol,
                    order_id = %order.id,
                    %price,
                    "maker order filled"
                );
                Ok(MakerOutcome::Filled(order))
            }
            FillOutcome::Unfilled => {
                // CANCELLING: best-effort; a fill that races the cancel is
                // still booked.
                debug!(symbol = %order.symbol, order_id = %order.id, "maker resting timeout, cancelling");
                let cancel = with_retry("maker_cancel", || {
                    self.transport.cancel_order(&order.symbol, &order.id)
                })
                .await?;

                if let Some((price, size)) = cancel.fill_during_cancel {
                    order.price = price;
                    order.filled_size = size;
                    if size >= order.size {
                        order.status = OrderStatus::Filled;
                        info!(symbol = %order.symbol, order_id = %order.id, "maker filled during cancel");
                        return Ok(MakerOutcome::Filled(order));
                    }
                    order.status = OrderStatus::PartialFilled;
                } else {
                    order.status = OrderStatus::Cancelled;
                }
                Ok(MakerOutcome::TimedOut(order))
            }
        }
    }
}
