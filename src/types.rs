//! Core Domain Types
//!
//! Canonical types shared by the signal, execution, risk, and analytics
//! layers. Monetary and quantity fields are fixed-point `Decimal`; floats are
//! reserved for signal scores, ratios, and basis-point metrics.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Wall-clock timestamp in milliseconds since the Unix epoch.
pub type Millis = i64;

/// Current wall-clock time in milliseconds.
#[inline]
pub fn now_ms() -> Millis {
    Utc::now().timestamp_millis()
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    #[inline]
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for Buy, -1 for Sell, as a Decimal multiplier.
    #[inline]
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Buy => Decimal::ONE,
            Side::Sell => -Decimal::ONE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Order type for submission. The engine only ever sends post-only limit
/// orders (maker leg) or immediate-or-cancel limit orders (taker leg).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Post-only limit: the venue must reject rather than cross.
    LimitPostOnly,
    /// Immediate-or-cancel limit: fill what crosses, cancel the rest.
    Ioc,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::LimitPostOnly => "LIMIT_POST_ONLY",
            OrderType::Ioc => "IOC",
        }
    }
}

/// Order lifecycle status. Terminal states do not transition further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    PartialFilled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Filled => "FILLED",
            OrderStatus::PartialFilled => "PARTIAL_FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
        }
    }
}

/// Signal confidence tier. Gates execution mode in the hybrid router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "HIGH",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::Low => "LOW",
        }
    }
}

/// A single price level in the order book.
///
/// Invariant: `price > 0` and `size > 0` for any level stored in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: Decimal,
    pub size: Decimal,
}

impl Level {
    #[inline]
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Public trade print carried in the snapshot's recent-trades buffer.
/// `side` marks the aggressor (who crossed the spread).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradePrint {
    pub timestamp_ms: Millis,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
}

/// Latest book + trades snapshot for one symbol.
///
/// Invariants (enforced at ingest by the market-data store):
/// `bids` strictly descending by price, `asks` strictly ascending,
/// `best_bid < best_ask` when both sides are non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub symbol: String,
    pub timestamp_ms: Millis,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub trades: Vec<TradePrint>,
    /// `(best_bid + best_ask) / 2` when both sides are non-empty, else zero.
    pub mid_price: Decimal,
}

impl MarketData {
    pub fn best_bid(&self) -> Option<&Level> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&Level> {
        self.asks.first()
    }

    /// Spread in basis points versus mid. `None` when a side is empty.
    pub fn spread_bps(&self) -> Option<f64> {
        use rust_decimal::prelude::ToPrimitive;
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        if self.mid_price.is_zero() {
            return None;
        }
        let spread = (ask.price - bid.price) / self.mid_price * Decimal::from(10_000);
        spread.to_f64()
    }
}

/// An order as tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Client order id (idempotency key at the transport).
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Decimal,
    pub size: Decimal,
    /// Invariant: `0 <= filled_size <= size`; Filled iff `filled_size == size`.
    pub filled_size: Decimal,
    pub status: OrderStatus,
    pub created_at: Millis,
    /// Venue error string on rejection, if any.
    pub error: Option<String>,
}

impl Order {
    pub fn new(
        symbol: impl Into<String>,
        side: Side,
        order_type: OrderType,
        price: Decimal,
        size: Decimal,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            order_type,
            price,
            size,
            filled_size: Decimal::ZERO,
            status: OrderStatus::Pending,
            created_at: now_ms(),
            error: None,
        }
    }

    #[inline]
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// Signed fill quantity: positive for buys, negative for sells.
    #[inline]
    pub fn signed_filled_size(&self) -> Decimal {
        self.filled_size * self.side.sign()
    }
}

/// Aggregated signal score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    /// Bounded composite score in [-1, 1].
    pub value: f64,
    pub confidence: ConfidenceLevel,
    /// Per-component scores in aggregator order (errored components read 0).
    pub component_scores: Vec<f64>,
    /// Wall-clock stamp (not the snapshot time) so downstream consumers can
    /// reason about freshness.
    pub timestamp_ms: Millis,
}
