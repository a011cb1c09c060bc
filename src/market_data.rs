//! Market Data Store
//!
//! Latest per-symbol book + trades snapshot. The transport task writes, the
//! engine loop reads; `parking_lot::RwLock` keeps the critical sections short
//! on both sides.
//!
//! Ingest enforces the snapshot invariants (strictly sorted sides, positive
//! level sizes, non-crossed book). A snapshot that violates them is dropped
//! with a warning and the previous good snapshot stays visible to readers.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::types::{Level, MarketData, Millis, TradePrint};

/// Maximum trade prints retained per symbol.
const TRADE_BUFFER_CAPACITY: usize = 256;

#[derive(Default)]
struct SymbolState {
    snapshot: Option<MarketData>,
    trades: VecDeque<TradePrint>,
    updates_applied: u64,
    updates_rejected: u64,
}

/// Thread-safe latest-snapshot store for all subscribed symbols.
pub struct MarketDataStore {
    symbols: RwLock<HashMap<String, SymbolState>>,
}

impl MarketDataStore {
    pub fn new() -> Self {
        Self {
            symbols: RwLock::new(HashMap::new()),
        }
    }

    /// Apply a full book snapshot. Trades already buffered for the symbol are
    /// carried into the stored snapshot so signal code sees one object.
    pub fn apply_snapshot(
        &self,
        symbol: &str,
        timestamp_ms: Millis,
        bids: Vec<Level>,
        asks: Vec<Level>,
    ) {
        if let Err(reason) = validate_book(&bids, &asks) {
            let mut map = self.symbols.write();
            let state = map.entry(symbol.to_string()).or_default();
            state.updates_rejected += 1;
            warn!(symbol, reason, "rejected malformed book snapshot");
            return;
        }

        let mid_price = match (bids.first(), asks.first()) {
            (Some(bid), Some(ask)) => (bid.price + ask.price) / Decimal::TWO,
            _ => Decimal::ZERO,
        };

        let mut map = self.symbols.write();
        let state = map.entry(symbol.to_string()).or_default();
        state.snapshot = Some(MarketData {
            symbol: symbol.to_string(),
            timestamp_ms,
            bids,
            asks,
            trades: state.trades.iter().copied().collect(),
            mid_price,
        });
        state.updates_applied += 1;
        debug!(symbol, timestamp_ms, "book snapshot applied");
    }

    /// Record a public trade print into the bounded per-symbol buffer and
    /// refresh the stored snapshot's trades view.
    pub fn record_trade(&self, symbol: &str, print: TradePrint) {
        let mut map = self.symbols.write();
        let state = map.entry(symbol.to_string()).or_default();
        state.trades.push_back(print);
        while state.trades.len() > TRADE_BUFFER_CAPACITY {
            state.trades.pop_front();
        }
        if let Some(snapshot) = state.snapshot.as_mut() {
            snapshot.trades = state.trades.iter().copied().collect();
        }
    }

    /// Latest snapshot for a symbol, if one has arrived.
    pub fn get(&self, symbol: &str) -> Option<MarketData> {
        self.symbols
            .read()
            .get(symbol)
            .and_then(|state| state.snapshot.clone())
    }

    /// (applied, rejected) update counters for a symbol.
    pub fn update_counts(&self, symbol: &str) -> (u64, u64) {
        self.symbols
            .read()
            .get(symbol)
            .map(|s| (s.updates_applied, s.updates_rejected))
            .unwrap_or((0, 0))
    }
}

impl Default for MarketDataStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_book(bids: &[Level], asks: &[Level]) -> Result<(), &'static str> {
    for level in bids.iter().chain(asks.iter()) {
        if level.price <= Decimal::ZERO {
            return Err("non-positive level price");
        }
        if level.size <= Decimal::ZERO {
            return Err("non-positive level size");
        }
    }
    if !bids.windows(2).all(|w| w[0].price > w[1].price) {
        return Err("bids not strictly descending");
    }
    if !asks.windows(2).all(|w| w[0].price < w[1].price) {
        return Err("asks not strictly ascending");
    }
    if let (Some(bid), Some(ask)) = (bids.first(), asks.first()) {
        if bid.price >= ask.price {
            return Err("crossed book");
        }
    }
    Ok(())
}
