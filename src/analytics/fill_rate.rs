//! Maker Fill-Rate Monitor
//!
//! Rolling per-tier fill rate over the last N maker attempts, plus lifetime
//! counters. HIGH and MEDIUM tiers alert independently: WARN below the tier
//! threshold, CRITICAL below the shared floor. Fewer than 10 samples in a
//! window reports healthy by default.

use std::collections::VecDeque;
use tracing::{debug, error, warn};

use crate::types::ConfidenceLevel;

/// Samples required before the alerts arm.
const MIN_ALERT_SAMPLES: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillRateStats {
    pub window_fill_rate: Option<f64>,
    pub lifetime_fill_rate: Option<f64>,
    pub window_len: usize,
    pub lifetime_attempts: u64,
    pub lifetime_fills: u64,
}

struct TierWindow {
    window: VecDeque<bool>,
    capacity: usize,
    lifetime_attempts: u64,
    lifetime_fills: u64,
    alert_threshold: f64,
}

impl TierWindow {
    fn new(capacity: usize, alert_threshold: f64) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            lifetime_attempts: 0,
            lifetime_fills: 0,
            alert_threshold,
        }
    }

    fn push(&mut self, filled: bool) {
        self.window.push_back(filled);
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
        self.lifetime_attempts += 1;
        if filled {
            self.lifetime_fills += 1;
        }
    }

    fn window_rate(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        let fills = self.window.iter().filter(|&&f| f).count();
        Some(fills as f64 / self.window.len() as f64)
    }

    fn lifetime_rate(&self) -> Option<f64> {
        if self.lifetime_attempts == 0 {
            return None;
        }
        Some(self.lifetime_fills as f64 / self.lifetime_attempts as f64)
    }

    fn stats(&self) -> FillRateStats {
        FillRateStats {
            window_fill_rate: self.window_rate(),
            lifetime_fill_rate: self.lifetime_rate(),
            window_len: self.window.len(),
            lifetime_attempts: self.lifetime_attempts,
            lifetime_fills: self.lifetime_fills,
        }
    }
}

pub struct MakerFillRateMonitor {
    high: TierWindow,
    medium: TierWindow,
    critical_threshold: f64,
}

impl MakerFillRateMonitor {
    pub fn new(
        window_size: usize,
        alert_threshold_high: f64,
        alert_threshold_medium: f64,
        critical_threshold: f64,
    ) -> Self {
        Self {
            high: TierWindow::new(window_size, alert_threshold_high),
            medium: TierWindow::new(window_size, alert_threshold_medium),
            critical_threshold,
        }
    }

    fn tier(&self, confidence: ConfidenceLevel) -> Option<&TierWindow> {
        match confidence {
            ConfidenceLevel::High => Some(&self.high),
            ConfidenceLevel::Medium => Some(&self.medium),
            ConfidenceLevel::Low => None,
        }
    }

    /// Record one maker attempt. LOW-tier attempts are not tracked (the
    /// router never places them).
    pub fn record_attempt(&mut self, confidence: ConfidenceLevel, filled: bool) {
        let tier = match confidence {
            ConfidenceLevel::High => &mut self.high,
            ConfidenceLevel::Medium => &mut self.medium,
            ConfidenceLevel::Low => return,
        };
        tier.push(filled);
        debug!(
            confidence = confidence.as_str(),
            filled,
            window_len = tier.window.len(),
            "maker attempt recorded"
        );
        self.check_alert(confidence);
    }

    pub fn fill_rate(&self, confidence: ConfidenceLevel) -> Option<f64> {
        self.tier(confidence)?.window_rate()
    }

    pub fn stats(&self, confidence: ConfidenceLevel) -> FillRateStats {
        self.tier(confidence).map(TierWindow::stats).unwrap_or_default()
    }

    /// Below the tier alert threshold? Under-sampled windows are healthy.
    pub fn is_healthy(&self, confidence: ConfidenceLevel) -> bool {
        let Some(tier) = self.tier(confidence) else {
            return true;
        };
        if tier.window.len() < MIN_ALERT_SAMPLES {
            return true;
        }
        match tier.window_rate() {
            Some(rate) => rate >= tier.alert_threshold,
            None => true,
        }
    }

    /// Below the shared critical floor? Under-sampled windows never trip.
    pub fn is_critical(&self, confidence: ConfidenceLevel) -> bool {
        let Some(tier) = self.tier(confidence) else {
            return false;
        };
        if tier.window.len() < MIN_ALERT_SAMPLES {
            return false;
        }
        match tier.window_rate() {
            Some(rate) => rate < self.critical_threshold,
            None => false,
        }
    }

    fn check_alert(&self, confidence: ConfidenceLevel) {
        let Some(tier) = self.tier(confidence) else {
            return;
        };
        if tier.window.len() < MIN_ALERT_SAMPLES {
            return;
        }
        let Some(rate) = tier.window_rate() else {
            return;
        };
        if rate < self.critical_threshold {
            error!(
                confidence = confidence.as_str(),
                fill_rate = rate,
                critical_threshold = self.critical_threshold,
                "maker fill rate critical"
            );
        } else if rate < tier.alert_threshold {
            warn!(
                confidence = confidence.as_str(),
                fill_rate = rate,
                threshold = tier.alert_threshold,
                "maker fill rate below target"
            );
        }
    }
}

impl Default for MakerFillRateMonitor {
    fn default() -> Self {
        Self::new(100, 0.80, 0.75, 0.60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_monitor_is_healthy() {
        let monitor = MakerFillRateMonitor::default();
        assert!(monitor.is_healthy(ConfidenceLevel::High));
        assert!(!monitor.is_critical(ConfidenceLevel::High));
        assert!(monitor.fill_rate(ConfidenceLevel::High).is_none());
    }

    #[test]
    fn test_under_sampled_window_reports_healthy() {
        let mut monitor = MakerFillRateMonitor::default();
        // 9 straight misses: still below the alert sample floor.
        for _ in 0..9 {
            monitor.record_attempt(ConfidenceLevel::High, false);
        }
        assert!(monitor.is_healthy(ConfidenceLevel::High));
        assert!(!monitor.is_critical(ConfidenceLevel::High));

        // The 10th arms the alerts.
        monitor.record_attempt(ConfidenceLevel::High, false);
        assert!(!monitor.is_healthy(ConfidenceLevel::High));
        assert!(monitor.is_critical(ConfidenceLevel::High));
    }

    #[test]
    fn test_tiers_are_independent() {
        let mut monitor = MakerFillRateMonitor::default();
        for _ in 0..20 {
            monitor.record_attempt(ConfidenceLevel::High, true);
            monitor.record_attempt(ConfidenceLevel::Medium, false);
        }
        assert!(monitor.is_healthy(ConfidenceLevel::High));
        assert!(!monitor.is_healthy(ConfidenceLevel::Medium));
        assert!(monitor.is_critical(ConfidenceLevel::Medium));
        assert_eq!(monitor.fill_rate(ConfidenceLevel::High), Some(1.0));
        assert_eq!(monitor.fill_rate(ConfidenceLevel::Medium), Some(0.0));
    }

    #[test]
    fn test_warn_band_between_thresholds() {
        let mut monitor = MakerFillRateMonitor::default();
        // 70%: below the HIGH target of 80% but above critical 60%.
        for i in 0..20 {
            monitor.record_attempt(ConfidenceLevel::High, i % 10 < 7);
        }
        assert!(!monitor.is_healthy(ConfidenceLevel::High));
        assert!(!monitor.is_critical(ConfidenceLevel::High));
    }

    #[test]
    fn test_window_evicts_old_samples() {
        let mut monitor = MakerFillRateMonitor::new(10, 0.80, 0.75, 0.60);
        for _ in 0..10 {
            monitor.record_attempt(ConfidenceLevel::High, false);
        }
        assert!(monitor.is_critical(ConfidenceLevel::High));
        // A run of fills pushes the misses out of the 10-slot window.
        for _ in 0..10 {
            monitor.record_attempt(ConfidenceLevel::High, true);
        }
        assert_eq!(monitor.fill_rate(ConfidenceLevel::High), Some(1.0));
        assert!(monitor.is_healthy(ConfidenceLevel::High));
    }

    #[test]
    fn test_lifetime_counters_survive_eviction() {
        let mut monitor = MakerFillRateMonitor::new(10, 0.80, 0.75, 0.60);
        for i in 0..25 {
            monitor.record_attempt(ConfidenceLevel::Medium, i % 2 == 0);
        }
        let stats = monitor.stats(ConfidenceLevel::Medium);
        assert_eq!(stats.window_len, 10);
        assert_eq!(stats.lifetime_attempts, 25);
        assert_eq!(stats.lifetime_fills, 13);
    }

    #[test]
    fn test_low_tier_ignored() {
        let mut monitor = MakerFillRateMonitor::default();
        monitor.record_attempt(ConfidenceLevel::Low, true);
        assert_eq!(monitor.stats(ConfidenceLevel::High).lifetime_attempts, 0);
        assert_eq!(monitor.stats(ConfidenceLevel::Medium).lifetime_attempts, 0);
    }
}
