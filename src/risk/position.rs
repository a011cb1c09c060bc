//! Position Ledger
//!
//! Per-symbol signed positions with weighted-average entry. Fills mutate the
//! ledger through exactly one path (`apply_fill`) so the accumulate / reduce /
//! flip arithmetic lives in one place. Flat positions are kept at size zero
//! rather than removed, preserving their realized PnL history.

use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

use crate::types::{Millis, Side};

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    /// Signed: positive long, negative short, zero flat.
    pub size: Decimal,
    pub avg_entry_price: Decimal,
    pub realized_pnl: Decimal,
    /// Set when the position transitions from flat to non-zero.
    pub opened_at: Millis,
    pub updated_at: Millis,
}

impl Position {
    fn flat(symbol: &str, now: Millis) -> Self {
        Self {
            symbol: symbol.to_string(),
            size: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            opened_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }

    /// Unrealized PnL against a mark:
    /// `(mark - avg_entry) * size` with signed size carrying the direction.
    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        (mark - self.avg_entry_price) * self.size
    }

    /// Side of the IOC that flattens this position.
    pub fn reducing_side(&self) -> Option<Side> {
        if self.size > Decimal::ZERO {
            Some(Side::Sell)
        } else if self.size < Decimal::ZERO {
            Some(Side::Buy)
        } else {
            None
        }
    }
}

/// Result of booking one fill.
#[derive(Debug, Clone, PartialEq)]
pub struct FillApplication {
    /// Realized PnL produced by this fill (zero when purely accumulating).
    pub realized_delta: Decimal,
    pub position_after: Position,
}

#[derive(Default)]
pub struct PositionManager {
    positions: HashMap<String, Position>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Signed size for a symbol, zero when no position exists.
    pub fn size(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.size)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn all(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| !p.is_flat())
    }

    /// Book a fill. Three regimes:
    /// - same direction: accumulate at a size-weighted average entry;
    /// - opposite, |fill| <= |position|: realize against the average entry,
    ///   entry unchanged (flatten when equal);
    /// - opposite, |fill| > |position|: realize the closed portion, then open
    ///   the residual in the new direction at the fill price.
    pub fn apply_fill(
        &mut self,
        symbol: &str,
        side: Side,
        fill_size: Decimal,
        fill_price: Decimal,
        now: Millis,
    ) -> FillApplication {
        let position = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position::flat(symbol, now));

        let signed_fill = fill_size * side.sign();
        let old_size = position.size;
        let mut realized_delta = Decimal::ZERO;

        if old_size.is_zero() {
            position.size = signed_fill;
            position.avg_entry_price = fill_price;
            position.opened_at = now;
        } else if old_size.signum() == signed_fill.signum() {
            // Accumulate.
            let new_size = old_size + signed_fill;
            position.avg_entry_price = (old_size.abs() * position.avg_entry_price
                + signed_fill.abs() * fill_price)
                / new_size.abs();
            position.size = new_size;
        } else {
            let closing = fill_size.min(old_size.abs());
            realized_delta =
                (fill_price - position.avg_entry_price) * closing * old_size.signum();
            position.realized_pnl += realized_delta;

            let new_size = old_size + signed_fill;
            if new_size.is_zero() {
                position.size = Decimal::ZERO;
                position.avg_entry_price = Decimal::ZERO;
            } else if new_size.signum() == old_size.signum() {
                // Reduced; entry unchanged.
                position.size = new_size;
            } else {
                // Flipped; residual opens at the fill price.
                position.size = new_size;
                position.avg_entry_price = fill_price;
                position.opened_at = now;
            }
        }

        position.updated_at = now;
        debug!(
            symbol,
            side = side.as_str(),
            size = %fill_size,
            price = %fill_price,
            position = %position.size,
            realized = %realized_delta,
            "fill booked"
        );

        FillApplication {
            realized_delta,
            position_after: position.clone(),
        }
    }

    /// Total realized PnL across all symbols.
    pub fn total_realized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.realized_pnl).sum()
    }
}
