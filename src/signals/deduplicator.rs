//! Signal Deduplicator
//!
//! Suppresses near-duplicate signals so the router does not over-trade a
//! persistent book condition. Four gates, applied in order per symbol:
//! cooldown, minimum change (same sign), same-direction size decay, and a
//! hard same-direction cap that only a position flip or flatten resets.

use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

use crate::config::DedupConfig;
use crate::types::{Millis, SignalScore};

/// A signal that survived deduplication, with a size multiplier the router
/// applies on top of the configured order size.
#[derive(Debug, Clone)]
pub struct FilteredSignal {
    pub score: SignalScore,
    pub size_multiplier: f64,
}

#[derive(Debug, Default, Clone)]
struct SymbolDedupState {
    last_value: f64,
    last_emit_ms: Millis,
    /// Same-direction emissions since the last flip or flatten.
    same_direction_count: u32,
}

pub struct SignalDeduplicator {
    config: DedupConfig,
    states: HashMap<String, SymbolDedupState>,
}

impl SignalDeduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    /// Run the gates for one symbol. `position_size` is the current signed
    /// position (zero when flat). Returns `None` when the signal is dropped.
    pub fn filter(
        &mut self,
        symbol: &str,
        score: &SignalScore,
        position_size: Decimal,
    ) -> Option<FilteredSignal> {
        let state = self.states.entry(symbol.to_string()).or_default();

        // A flat or flipped position resets the same-direction ladder.
        let position_direction = if position_size > Decimal::ZERO {
            1
        } else if position_size < Decimal::ZERO {
            -1
        } else {
            0
        };
        let signal_direction = if score.value > 0.0 {
            1
        } else if score.value < 0.0 {
            -1
        } else {
            0
        };
        if position_direction == 0 || signal_direction != position_direction {
            state.same_direction_count = 0;
        }

        // 1. Cooldown.
        let cooldown_ms = (self.config.cooldown_s * 1000.0) as i64;
        if state.last_emit_ms > 0 && score.timestamp_ms - state.last_emit_ms < cooldown_ms {
            debug!(symbol, "signal dropped: cooldown");
            return None;
        }

        // 2. Minimum change, same sign only. A sign flip always passes.
        let same_sign = score.value.signum() == state.last_value.signum();
        if state.last_emit_ms > 0
            && same_sign
            && (score.value - state.last_value).abs() < self.config.change_threshold
        {
            debug!(
                symbol,
                value = score.value,
                last = state.last_value,
                "signal dropped: below change threshold"
            );
            return None;
        }

        // 3 + 4. Same-direction handling against the live position.
        let mut size_multiplier = 1.0;
        if signal_direction != 0 && signal_direction == position_direction {
            if state.same_direction_count >= self.config.max_same_direction {
                debug!(
                    symbol,
                    count = state.same_direction_count,
                    "signal dropped: same-direction cap"
                );
                return None;
            }
            size_multiplier = self
                .config
                .decay_factor
                .powi(state.same_direction_count as i32);
            state.same_direction_count += 1;
        }

        state.last_value = score.value;
        state.last_emit_ms = score.timestamp_ms;

        Some(FilteredSignal {
            score: score.clone(),
            size_multiplier,
        })
    }

    /// Forget per-symbol state (used when a position flips via the closer).
    pub fn reset_symbol(&mut self, symbol: &str) {
        self.states.remove(symbol);
    }
}
