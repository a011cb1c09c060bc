//! Micro-structure Signals
//!
//! Three pure book-to-scalar signals combined by the aggregator. Dispatch is
//! a closed sum type: the aggregator owns a `Vec<Signal>` and never needs
//! dynamic trait objects.

mod aggregator;
mod classifier;
mod deduplicator;
mod impact;
mod microprice;
mod obi;

pub use aggregator::SignalAggregator;
pub use classifier::SignalClassifier;
pub use deduplicator::{FilteredSignal, SignalDeduplicator};
pub use impact::ImpactSignal;
pub use microprice::MicropriceSignal;
pub use obi::ObiSignal;

use crate::config::SignalsConfig;
use crate::error::EngineResult;
use crate::types::MarketData;

/// A configured signal primitive with its aggregation weight.
#[derive(Debug, Clone)]
pub enum Signal {
    Obi(ObiSignal),
    Microprice(MicropriceSignal),
    Impact(ImpactSignal),
}

impl Signal {
    /// Score the snapshot. Every variant returns a finite value in [-1, 1]
    /// or a `Component` error, which the aggregator books as a zero
    /// contribution.
    pub fn calculate(&self, market_data: &MarketData) -> EngineResult<f64> {
        match self {
            Signal::Obi(signal) => signal.calculate(market_data),
            Signal::Microprice(signal) => signal.calculate(market_data),
            Signal::Impact(signal) => signal.calculate(market_data),
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            Signal::Obi(signal) => signal.weight,
            Signal::Microprice(signal) => signal.weight,
            Signal::Impact(signal) => signal.weight,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Signal::Obi(_) => "obi",
            Signal::Microprice(_) => "microprice",
            Signal::Impact(_) => "impact",
        }
    }
}

/// Build the standard three-signal stack from config.
pub fn signals_from_config(config: &SignalsConfig) -> Vec<Signal> {
    vec![
        Signal::Obi(ObiSignal::new(config.obi_levels, config.obi_weight)),
        Signal::Microprice(MicropriceSignal::new(config.microprice_weight)),
        Signal::Impact(ImpactSignal::new(
            config.impact_window_ms,
            config.impact_weight,
        )),
    ]
}

/// Clamp a raw score into [-1, 1], mapping non-finite values to 0.
#[inline]
pub(crate) fn clip_score(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
