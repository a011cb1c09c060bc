//! Execution Transport
//!
//! The venue boundary. The engine consumes this trait; the live
//! websocket/REST client lives outside this crate and plugs in here. A
//! deterministic paper adapter ships for dry runs and tests.
//!
//! Contract: placement is idempotent by client id (a duplicate place with the
//! same id returns the original acknowledgement), and every resting order has
//! exactly one terminal outcome observable through `await_fill` / `cancel_order`.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::types::{OrderType, Side};

/// Order-submit acknowledgement timeout. Expiry is treated as REJECTED.
pub const ORDER_ACK_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Total latency cap for an IOC round trip.
pub const IOC_LATENCY_CAP: Duration = Duration::from_millis(500);

/// Order submission request.
#[derive(Debug, Clone)]
pub struct PlaceRequest {
    /// Client order id; the venue must deduplicate on it.
    pub client_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Decimal,
    pub size: Decimal,
    pub post_only: bool,
}

/// How the venue disposed of a placement.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaceDisposition {
    /// Post-only order acknowledged and resting at its limit price.
    Resting,
    /// Executed on arrival (IOC leg, possibly partial).
    Filled { price: Decimal, size: Decimal },
    /// IOC order crossed nothing and was cancelled in full.
    Unfilled,
    /// Post-only order would have crossed; the venue rejected it.
    RejectedPostOnly,
    /// Hard venue rejection.
    Rejected { reason: String },
}

#[derive(Debug, Clone)]
pub struct PlaceAck {
    pub client_id: String,
    pub exchange_order_id: String,
    pub disposition: PlaceDisposition,
}

/// Terminal outcome of a resting order observed within a wait window.
#[derive(Debug, Clone, PartialEq)]
pub enum FillOutcome {
    Filled { price: Decimal, size: Decimal },
    /// Still resting when the wait window expired.
    Unfilled,
}

#[derive(Debug, Clone)]
pub struct CancelAck {
    pub client_id: String,
    pub cancelled_size: Decimal,
    /// A fill that raced the cancel. Must still be booked by the caller.
    pub fill_during_cancel: Option<(Decimal, Decimal)>,
}

#[async_trait]
pub trait ExecutionTransport: Send + Sync {
    /// Submit an order and await the venue acknowledgement.
    async fn place_order(&self, req: PlaceRequest) -> EngineResult<PlaceAck>;

    /// Wait up to `timeout` for a resting order to fill. Returns `Unfilled`
    /// on expiry without cancelling; cancellation is the caller's decision.
    async fn await_fill(&self, client_id: &str, timeout: Duration) -> EngineResult<FillOutcome>;

    /// Cancel a resting order.
    async fn cancel_order(&self, symbol: &str, client_id: &str) -> EngineResult<CancelAck>;
}

/// Retry a transport operation with exponential backoff: base 100 ms, cap
/// 5 s, 5 attempts. Only `TransportError` is retried; every other error class
/// surfaces immediately.
pub async fn with_retry<T, F, Fut>(label: &str, mut op: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    const MAX_ATTEMPTS: u32 = 5;
    let mut delay = Duration::from_millis(100);

    for attempt in 1..=MAX_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                warn!(label, attempt, delay_ms = delay.as_millis() as u64, error = %err, "transport retry");
                sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(5));
            }
            Err(err) => return Err(err),
        }
    }
    unreachable!("retry loop returns on final attempt")
}

// =============================================================================
// PAPER TRANSPORT
// =============================================================================

/// Scripted outcome for the next order the paper venue sees.
#[derive(Debug, Clone)]
pub enum PaperOutcome {
    /// Rest, then fill at the order's limit price after `after`.
    MakerFill { after: Duration },
    /// Rest and never fill inside any wait window.
    MakerTimeout,
    /// Rest, report unfilled, then deliver the fill inside the cancel ack.
    MakerFillDuringCancel,
    /// Post-only rejection (order would have crossed).
    PostOnlyReject,
    /// IOC executes `ratio` of the requested size at the requested price.
    IocFill { ratio: f64 },
    /// IOC crosses nothing.
    IocMiss,
    /// Hard venue rejection.
    Reject { reason: String },
    /// Transport-level failure (network, venue 5xx).
    TransportError,
}

struct RestingOrder {
    request: PlaceRequest,
    outcome: PaperOutcome,
}

#[derive(Default)]
struct PaperState {
    script: VecDeque<PaperOutcome>,
    resting: HashMap<String, RestingOrder>,
    acks: HashMap<String, PlaceAck>,
    placements: Vec<PlaceRequest>,
    cancels: Vec<String>,
}

/// Deterministic in-process venue. Outcomes are taken from the script queue
/// in placement order; an empty queue defaults to an immediate full fill at
/// the order's own price, which is what paper-trading mode wants.
pub struct PaperTransport {
    state: Mutex<PaperState>,
}

impl PaperTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PaperState::default()),
        }
    }

    /// Queue the outcome for the next placement.
    pub fn script(&self, outcome: PaperOutcome) {
        self.state.lock().script.push_back(outcome);
    }

    /// Placement audit log (test hook).
    pub fn placements(&self) -> Vec<PlaceRequest> {
        self.state.lock().placements.clone()
    }

    /// Cancelled client ids (test hook).
    pub fn cancels(&self) -> Vec<String> {
        self.state.lock().cancels.clone()
    }
}

impl Default for PaperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionTransport for PaperTransport {
    async fn place_order(&self, req: PlaceRequest) -> EngineResult<PlaceAck> {
        let mut state = self.state.lock();

        // Idempotency: duplicate place with the same client id is a no-op.
        if let Some(ack) = state.acks.get(&req.client_id) {
            return Ok(ack.clone());
        }

        let outcome = state.script.pop_front().unwrap_or(PaperOutcome::IocFill { ratio: 1.0 });
        state.placements.push(req.clone());

        let disposition = match &outcome {
            PaperOutcome::TransportError => {
                return Err(EngineError::Transport("paper venue unavailable".into()));
            }
            PaperOutcome::Reject { reason } => PlaceDisposition::Rejected {
                reason: reason.clone(),
            },
            PaperOutcome::PostOnlyReject => PlaceDisposition::RejectedPostOnly,
            PaperOutcome::MakerFill { .. }
            | PaperOutcome::MakerTimeout
            | PaperOutcome::MakerFillDuringCancel => {
                state.resting.insert(
                    req.client_id.clone(),
                    RestingOrder {
                        request: req.clone(),
                        outcome: outcome.clone(),
                    },
                );
                PlaceDisposition::Resting
            }
            PaperOutcome::IocFill { ratio } => {
                let ratio = Decimal::try_from(ratio.clamp(0.0, 1.0)).unwrap_or(Decimal::ONE);
                let filled = req.size * ratio;
                if filled.is_zero() {
                    PlaceDisposition::Unfilled
                } else {
                    PlaceDisposition::Filled {
                        price: req.price,
                        size: filled,
                    }
                }
            }
            PaperOutcome::IocMiss => PlaceDisposition::Unfilled,
        };

        let ack = PlaceAck {
            client_id: req.client_id.clone(),
            exchange_order_id: format!("paper:{}", req.client_id),
            disposition,
        };
        state.acks.insert(req.client_id.clone(), ack.clone());
        debug!(client_id = %req.client_id, symbol = %req.symbol, "paper order placed");
        Ok(ack)
    }

    async fn await_fill(&self, client_id: &str, timeout: Duration) -> EngineResult<FillOutcome> {
        let (request, outcome) = {
            let state = self.state.lock();
            match state.resting.get(client_id) {
                Some(resting) => (resting.request.clone(), resting.outcome.clone()),
                None => return Ok(FillOutcome::Unfilled),
            }
        };

        match outcome {
            PaperOutcome::MakerFill { after } if after <= timeout => {
                sleep(after).await;
                self.state.lock().resting.remove(client_id);
                Ok(FillOutcome::Filled {
                    price: request.price,
                    size: request.size,
                })
            }
            _ => {
                sleep(timeout).await;
                Ok(FillOutcome::Unfilled)
            }
        }
    }

    async fn cancel_order(&self, _symbol: &str, client_id: &str) -> EngineResult<CancelAck> {
        let mut state = self.state.lock();
        state.cancels.push(client_id.to_string());

        match state.resting.remove(client_id) {
            Some(resting) => {
                let fill_during_cancel =
                    if matches!(resting.outcome, PaperOutcome::MakerFillDuringCancel) {
                        Some((resting.request.price, resting.request.size))
                    } else {
                        None
                    };
                Ok(CancelAck {
                    client_id: client_id.to_string(),
                    cancelled_size: resting.request.size,
                    fill_during_cancel,
                })
            }
            None => Ok(CancelAck {
                client_id: client_id.to_string(),
                cancelled_size: Decimal::ZERO,
                fill_during_cancel: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(id: &str, order_type: OrderType) -> PlaceRequest {
        PlaceRequest {
            client_id: id.to_string(),
            symbol: "BTC".to_string(),
            side: Side::Buy,
            order_type,
            price: dec!(100),
            size: dec!(1),
            post_only: order_type == OrderType::LimitPostOnly,
        }
    }

    #[tokio::test]
    async fn test_ioc_fill_and_partial() {
        let transport = PaperTransport::new();
        transport.script(PaperOutcome::IocFill { ratio: 0.5 });

        let ack = transport.place_order(request("a", OrderType::Ioc)).await.unwrap();
        assert_eq!(
            ack.disposition,
            PlaceDisposition::Filled {
                price: dec!(100),
                size: dec!(0.5)
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_place_is_noop() {
        let transport = PaperTransport::new();
        transport.script(PaperOutcome::IocFill { ratio: 1.0 });
        transport.script(PaperOutcome::IocMiss);

        let first = transport.place_order(request("a", OrderType::Ioc)).await.unwrap();
        let second = transport.place_order(request("a", OrderType::Ioc)).await.unwrap();
        assert_eq!(first.disposition, second.disposition);
        assert_eq!(transport.placements().len(), 1);
    }

    #[tokio::test]
    async fn test_maker_fill_within_window() {
        let transport = PaperTransport::new();
        transport.script(PaperOutcome::MakerFill {
            after: Duration::from_millis(5),
        });

        let ack = transport
            .place_order(request("m", OrderType::LimitPostOnly))
            .await
            .unwrap();
        assert_eq!(ack.disposition, PlaceDisposition::Resting);

        let outcome = transport
            .await_fill("m", Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            FillOutcome::Filled {
                price: dec!(100),
                size: dec!(1)
            }
        );
    }

    #[tokio::test]
    async fn test_maker_timeout_then_cancel() {
        let transport = PaperTransport::new();
        transport.script(PaperOutcome::MakerTimeout);

        transport
            .place_order(request("m", OrderType::LimitPostOnly))
            .await
            .unwrap();
        let outcome = transport
            .await_fill("m", Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(outcome, FillOutcome::Unfilled);

        let cancel = transport.cancel_order("BTC", "m").await.unwrap();
        assert_eq!(cancel.cancelled_size, dec!(1));
        assert!(cancel.fill_during_cancel.is_none());
    }

    #[tokio::test]
    async fn test_fill_during_cancel_surfaces() {
        let transport = PaperTransport::new();
        transport.script(PaperOutcome::MakerFillDuringCancel);

        transport
            .place_order(request("m", OrderType::LimitPostOnly))
            .await
            .unwrap();
        let cancel = transport.cancel_order("BTC", "m").await.unwrap();
        assert_eq!(cancel.fill_during_cancel, Some((dec!(100), dec!(1))));
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_after_max_attempts() {
        let mut calls = 0u32;
        let result: EngineResult<()> = with_retry("test", || {
            calls += 1;
            async { Err(EngineError::Transport("down".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 5);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_hard_errors() {
        let mut calls = 0u32;
        let result: EngineResult<()> = with_retry("test", || {
            calls += 1;
            async { Err(EngineError::PostOnlyCrossed) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
