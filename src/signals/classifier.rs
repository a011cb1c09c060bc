//! Signal Strength Classifier
//!
//! Same sign-independent bucket test as the aggregator, plus percentile
//! calibration: fit the thresholds to a historical score sample so HIGH
//! captures the top 10% of absolute scores and MEDIUM the top 30%. The
//! aggregator remains authoritative at runtime; calibrated thresholds are
//! pushed back into it when they supersede config.

use statrs::statistics::{Data, OrderStatistics};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::types::ConfidenceLevel;

/// Minimum historical sample for a meaningful quantile fit.
const MIN_CALIBRATION_SAMPLES: usize = 100;

#[derive(Debug, Clone)]
pub struct SignalClassifier {
    theta_1: f64,
    theta_2: f64,
}

/// Tier distribution over a score sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierStats {
    pub total: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
    pub theta_1: f64,
    pub theta_2: f64,
}

impl SignalClassifier {
    pub fn new(theta_1: f64, theta_2: f64) -> EngineResult<Self> {
        if theta_1 <= 0.0 || theta_2 <= 0.0 {
            return Err(EngineError::Config(
                "classifier thresholds must be positive".into(),
            ));
        }
        if theta_2 >= theta_1 {
            return Err(EngineError::Config(format!(
                "theta_2 ({}) must be less than theta_1 ({})",
                theta_2, theta_1
            )));
        }
        Ok(Self { theta_1, theta_2 })
    }

    /// Fit thresholds to the |score| distribution of a historical sample:
    /// `theta_1 = quantile(1 - p_high)`, `theta_2 = quantile(1 - p_medium)`.
    /// Requires at least 100 samples.
    pub fn calibrate(
        &mut self,
        scores: &[f64],
        p_high: f64,
        p_medium: f64,
    ) -> EngineResult<(f64, f64)> {
        if scores.len() < MIN_CALIBRATION_SAMPLES {
            return Err(EngineError::Config(format!(
                "insufficient data for calibration: {} < {}",
                scores.len(),
                MIN_CALIBRATION_SAMPLES
            )));
        }
        if !(0.0 < p_high && p_high < p_medium && p_medium < 1.0) {
            return Err(EngineError::Config(format!(
                "invalid calibration percentiles: high={} medium={}",
                p_high, p_medium
            )));
        }

        let mut abs_scores = Data::new(scores.iter().map(|s| s.abs()).collect::<Vec<_>>());
        let theta_1 = abs_scores.quantile(1.0 - p_high);
        let theta_2 = abs_scores.quantile(1.0 - p_medium);

        self.theta_1 = theta_1;
        self.theta_2 = theta_2;

        info!(
            theta_1,
            theta_2,
            sample_size = scores.len(),
            "classifier thresholds calibrated"
        );
        Ok((theta_1, theta_2))
    }

    pub fn classify(&self, score: f64) -> ConfidenceLevel {
        let abs_score = score.abs();
        let level = if abs_score > self.theta_1 {
            ConfidenceLevel::High
        } else if abs_score > self.theta_2 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        };
        debug!(score, confidence = level.as_str(), "signal classified");
        level
    }

    pub fn thresholds(&self) -> (f64, f64) {
        (self.theta_1, self.theta_2)
    }

    /// Tier distribution for a score sample under the current thresholds.
    pub fn statistics(&self, scores: &[f64]) -> ClassifierStats {
        let mut high_count = 0;
        let mut medium_count = 0;
        let mut low_count = 0;
        for &score in scores {
            match self.classify(score) {
                ConfidenceLevel::High => high_count += 1,
                ConfidenceLevel::Medium => medium_count += 1,
                ConfidenceLevel::Low => low_count += 1,
            }
        }
        ClassifierStats {
            total: scores.len(),
            high_count,
            medium_count,
            low_count,
            theta_1: self.theta_1,
            theta_2: self.theta_2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_rejects_bad_thresholds() {
        assert!(SignalClassifier::new(0.2, 0.5).is_err());
        assert!(SignalClassifier::new(0.5, 0.5).is_err());
        assert!(SignalClassifier::new(0.5, 0.0).is_err());
        assert!(SignalClassifier::new(0.45, 0.25).is_ok());
    }

    #[test]
    fn test_classification_is_sign_independent() {
        let classifier = SignalClassifier::new(0.5, 0.2).unwrap();
        assert_eq!(classifier.classify(0.7), ConfidenceLevel::High);
        assert_eq!(classifier.classify(-0.7), ConfidenceLevel::High);
        assert_eq!(classifier.classify(0.3), ConfidenceLevel::Medium);
        assert_eq!(classifier.classify(-0.3), ConfidenceLevel::Medium);
        assert_eq!(classifier.classify(0.1), ConfidenceLevel::Low);
    }

    #[test]
    fn test_calibration_requires_min_samples() {
        let mut classifier = SignalClassifier::new(0.5, 0.2).unwrap();
        let scores = vec![0.5; 50];
        assert!(classifier.calibrate(&scores, 0.10, 0.30).is_err());
    }

    #[test]
    fn test_calibration_orders_thresholds() {
        let mut classifier = SignalClassifier::new(0.5, 0.2).unwrap();
        // Uniform-ish ramp of 200 scores in (-1, 1).
        let scores: Vec<f64> = (0..200).map(|i| (i as f64 / 100.0) - 1.0).collect();
        let (theta_1, theta_2) = classifier.calibrate(&scores, 0.10, 0.30).unwrap();
        assert!(theta_1 > theta_2, "theta_1={} theta_2={}", theta_1, theta_2);
        // Roughly: top 10% of |ramp| sits near 0.9, top 30% near 0.7.
        assert!(theta_1 > 0.8 && theta_1 <= 1.0);
        assert!(theta_2 > 0.6 && theta_2 < 0.8);
    }

    #[test]
    fn test_calibration_rejects_bad_percentiles() {
        let mut classifier = SignalClassifier::new(0.5, 0.2).unwrap();
        let scores = vec![0.5; 200];
        assert!(classifier.calibrate(&scores, 0.30, 0.10).is_err());
    }

    #[test]
    fn test_statistics_distribution() {
        let classifier = SignalClassifier::new(0.5, 0.2).unwrap();
        let stats = classifier.statistics(&[0.9, -0.6, 0.3, -0.25, 0.1, 0.0]);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.high_count, 2);
        assert_eq!(stats.medium_count, 2);
        assert_eq!(stats.low_count, 2);
    }
}
