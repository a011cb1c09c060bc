//! Signal Aggregator
//!
//! Weighted mean of the component scores with confidence tiering by absolute
//! value. A component that errors contributes a zero score but the divisor
//! stays the total configured weight, so one bad component drags the
//! composite toward zero instead of silently re-normalizing the rest.

use tracing::{debug, warn};

use crate::config::SignalsConfig;
use crate::error::{EngineError, EngineResult};
use crate::signals::{signals_from_config, Signal};
use crate::types::{now_ms, ConfidenceLevel, MarketData, SignalScore};

pub struct SignalAggregator {
    signals: Vec<Signal>,
    theta_1: f64,
    theta_2: f64,
}

impl SignalAggregator {
    /// Invariant enforced here: `0 <= theta_2 < theta_1 <= 1`.
    pub fn new(signals: Vec<Signal>, theta_1: f64, theta_2: f64) -> EngineResult<Self> {
        if !(0.0..=1.0).contains(&theta_1) || !(0.0..=1.0).contains(&theta_2) {
            return Err(EngineError::Config(format!(
                "confidence thresholds must be in [0, 1], got theta_1={} theta_2={}",
                theta_1, theta_2
            )));
        }
        if theta_2 >= theta_1 {
            return Err(EngineError::Config(format!(
                "theta_2 ({}) must be less than theta_1 ({})",
                theta_2, theta_1
            )));
        }
        for signal in &signals {
            if signal.weight() < 0.0 {
                return Err(EngineError::Config(format!(
                    "signal {} has negative weight {}",
                    signal.name(),
                    signal.weight()
                )));
            }
        }
        Ok(Self {
            signals,
            theta_1,
            theta_2,
        })
    }

    pub fn from_config(config: &SignalsConfig) -> EngineResult<Self> {
        Self::new(signals_from_config(config), config.theta_1, config.theta_2)
    }

    /// Compute the composite score for one snapshot. Always returns a score;
    /// component failures degrade toward zero rather than aborting the tick.
    pub fn calculate(&self, market_data: &MarketData) -> SignalScore {
        let mut component_scores = Vec::with_capacity(self.signals.len());
        let mut weighted_sum = 0.0;
        // Divisor is the full configured weight, unchanged by failures.
        let weight_sum: f64 = self.signals.iter().map(Signal::weight).sum();

        for signal in &self.signals {
            match signal.calculate(market_data) {
                Ok(score) => {
                    component_scores.push(score);
                    weighted_sum += score * signal.weight();
                }
                Err(err) => {
                    warn!(
                        symbol = %market_data.symbol,
                        signal = signal.name(),
                        error = %err,
                        "signal component failed, contributing zero"
                    );
                    component_scores.push(0.0);
                }
            }
        }

        let value = if weight_sum == 0.0 {
            warn!(symbol = %market_data.symbol, "zero total signal weight");
            0.0
        } else {
            weighted_sum / weight_sum
        };

        let confidence = self.classify(value);
        debug!(
            symbol = %market_data.symbol,
            value,
            confidence = confidence.as_str(),
            "signal aggregated"
        );

        SignalScore {
            value,
            confidence,
            component_scores,
            // Wall clock, not the snapshot stamp: downstream freshness checks
            // reason about when the score was produced.
            timestamp_ms: now_ms(),
        }
    }

    /// Sign-independent bucket test shared with the classifier.
    pub fn classify(&self, value: f64) -> ConfidenceLevel {
        let abs_value = value.abs();
        if abs_value > self.theta_1 {
            ConfidenceLevel::High
        } else if abs_value > self.theta_2 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn thresholds(&self) -> (f64, f64) {
        (self.theta_1, self.theta_2)
    }

    /// Replace the thresholds, e.g. after classifier calibration or a health
    /// advisory bump. Same invariant as construction.
    pub fn set_thresholds(&mut self, theta_1: f64, theta_2: f64) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&theta_1) || theta_2 >= theta_1 || theta_2 < 0.0 {
            return Err(EngineError::Config(format!(
                "invalid thresholds theta_1={} theta_2={}",
                theta_1, theta_2
            )));
        }
        self.theta_1 = theta_1;
        self.theta_2 = theta_2;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{ImpactSignal, MicropriceSignal, ObiSignal};
    use crate::types::Level;
    use rust_decimal::Decimal;

    fn book(bid_size: f64, ask_size: f64) -> MarketData {
        let bids = vec![Level::new(
            Decimal::from(100),
            Decimal::try_from(bid_size).unwrap(),
        )];
        let asks = vec![Level::new(
            Decimal::from(101),
            Decimal::try_from(ask_size).unwrap(),
        )];
        MarketData {
            symbol: "BTC".into(),
            timestamp_ms: 0,
            bids,
            asks,
            trades: vec![],
            mid_price: Decimal::try_from(100.5).unwrap(),
        }
    }

    fn standard_signals() -> Vec<Signal> {
        vec![
            Signal::Obi(ObiSignal::new(5, 0.4)),
            Signal::Microprice(MicropriceSignal::new(0.3)),
            Signal::Impact(ImpactSignal::new(100, 0.3)),
        ]
    }

    #[test]
    fn test_threshold_order_enforced() {
        assert!(SignalAggregator::new(standard_signals(), 0.2, 0.5).is_err());
        assert!(SignalAggregator::new(standard_signals(), 0.5, 0.5).is_err());
        assert!(SignalAggregator::new(standard_signals(), 0.5, 0.2).is_ok());
    }

    #[test]
    fn test_balanced_book_scores_low() {
        let aggregator = SignalAggregator::new(standard_signals(), 0.5, 0.2).unwrap();
        let score = aggregator.calculate(&book(5.0, 5.0));
        assert_eq!(score.value, 0.0);
        assert_eq!(score.confidence, ConfidenceLevel::Low);
        assert_eq!(score.component_scores.len(), 3);
    }

    #[test]
    fn test_lopsided_book_scores_high() {
        let aggregator = SignalAggregator::new(standard_signals(), 0.5, 0.2).unwrap();
        let score = aggregator.calculate(&book(20.0, 2.0));
        assert!(score.value > 0.5, "got {}", score.value);
        assert_eq!(score.confidence, ConfidenceLevel::High);
    }

    #[test]
    fn test_failed_component_keeps_divisor() {
        // An obi with zero levels errors on every call; with weights
        // 0.4/0.3/0.3 the composite must divide by 1.0, not 0.6.
        let signals = vec![
            Signal::Obi(ObiSignal::new(0, 0.4)),
            Signal::Microprice(MicropriceSignal::new(0.3)),
            Signal::Impact(ImpactSignal::new(100, 0.3)),
        ];
        let aggregator = SignalAggregator::new(signals, 0.5, 0.2).unwrap();

        let md = book(20.0, 2.0);
        let score = aggregator.calculate(&md);

        let micro = MicropriceSignal::new(0.3).calculate(&md).unwrap();
        let expected = micro * 0.3 / 1.0; // impact is 0 (no trades)
        assert!((score.value - expected).abs() < 1e-12);
        assert_eq!(score.component_scores[0], 0.0);
    }

    #[test]
    fn test_zero_weight_sum_returns_low_zero() {
        let signals = vec![
            Signal::Obi(ObiSignal::new(5, 0.0)),
            Signal::Microprice(MicropriceSignal::new(0.0)),
        ];
        let aggregator = SignalAggregator::new(signals, 0.5, 0.2).unwrap();
        let score = aggregator.calculate(&book(20.0, 2.0));
        assert_eq!(score.value, 0.0);
        assert_eq!(score.confidence, ConfidenceLevel::Low);
    }

    #[test]
    fn test_confidence_buckets() {
        let aggregator = SignalAggregator::new(standard_signals(), 0.5, 0.2).unwrap();
        assert_eq!(aggregator.classify(0.6), ConfidenceLevel::High);
        assert_eq!(aggregator.classify(-0.6), ConfidenceLevel::High);
        assert_eq!(aggregator.classify(0.5), ConfidenceLevel::Medium);
        assert_eq!(aggregator.classify(0.3), ConfidenceLevel::Medium);
        assert_eq!(aggregator.classify(0.2), ConfidenceLevel::Low);
        assert_eq!(aggregator.classify(0.0), ConfidenceLevel::Low);
    }
}
