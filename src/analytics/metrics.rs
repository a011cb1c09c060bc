//! Metrics Collector
//!
//! Ring-buffered signal and execution records, the realized-return back-fill
//! that makes IC computable, and summary statistics. IC is Spearman rank
//! correlation between signal values and realized forward returns over the
//! most recent window of records that carry a return; below 10 valid samples
//! it is unavailable, not zero.

use rust_decimal::Decimal;
use statrs::statistics::{Data, OrderStatistics};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

use crate::types::{ConfidenceLevel, Millis, Order, OrderStatus, SignalScore};

const MIN_IC_SAMPLES: usize = 10;

#[derive(Debug, Clone)]
pub struct SignalRecord {
    pub timestamp_ms: Millis,
    pub symbol: String,
    pub value: f64,
    pub confidence: ConfidenceLevel,
    /// Mid at signal time, the base for the forward return.
    pub mid_at_signal: f64,
    /// Forward return, back-filled one horizon later.
    pub realized_return: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub timestamp_ms: Millis,
    pub symbol: String,
    pub order_id: String,
    pub side: String,
    pub size: Decimal,
    pub price: Decimal,
    pub slippage_bps: f64,
    pub latency_ms: f64,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Default)]
pub struct SignalMetrics {
    pub ic: Option<f64>,
    pub hit_rate: f64,
    pub total_recorded: usize,
    pub scored_samples: usize,
    pub avg_signal_strength: f64,
    pub confidence_counts: HashMap<&'static str, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionMetrics {
    pub total_orders: usize,
    pub filled_orders: usize,
    pub success_rate: f64,
    pub avg_slippage_bps: f64,
    pub avg_latency_ms: f64,
    pub latency_p50: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
}

pub struct MetricsCollector {
    ic_window: usize,
    return_horizon_ms: i64,
    signal_records: VecDeque<SignalRecord>,
    execution_records: VecDeque<ExecutionRecord>,
    max_history: usize,
    signal_hits: usize,
    signal_scored: usize,
}

impl MetricsCollector {
    pub fn new(ic_window: usize, return_horizon_ms: i64) -> Self {
        Self {
            ic_window,
            return_horizon_ms,
            signal_records: VecDeque::new(),
            execution_records: VecDeque::new(),
            max_history: 10_000,
            signal_hits: 0,
            signal_scored: 0,
        }
    }

    pub fn record_signal(&mut self, score: &SignalScore, symbol: &str, mid_at_signal: f64) {
        self.signal_records.push_back(SignalRecord {
            timestamp_ms: score.timestamp_ms,
            symbol: symbol.to_string(),
            value: score.value,
            confidence: score.confidence,
            mid_at_signal,
            realized_return: None,
        });
        while self.signal_records.len() > self.max_history {
            self.signal_records.pop_front();
        }
    }

    /// Back-fill realized returns for records of `symbol` whose horizon has
    /// elapsed: `(mid_now - mid_at_signal) / mid_at_signal`. Also feeds the
    /// directional hit counter.
    pub fn backfill_returns(&mut self, symbol: &str, now_ms: Millis, mid_now: f64) {
        if mid_now <= 0.0 {
            return;
        }
        let horizon = self.return_horizon_ms;
        let mut hits = 0;
        let mut scored = 0;
        for record in self.signal_records.iter_mut() {
            if record.symbol != symbol
                || record.realized_return.is_some()
                || now_ms - record.timestamp_ms < horizon
                || record.mid_at_signal <= 0.0
            {
                continue;
            }
            let forward_return = (mid_now - record.mid_at_signal) / record.mid_at_signal;
            record.realized_return = Some(forward_return);
            scored += 1;
            if (record.value > 0.0 && forward_return > 0.0)
                || (record.value < 0.0 && forward_return < 0.0)
            {
                hits += 1;
            }
        }
        self.signal_hits += hits;
        self.signal_scored += scored;
        if scored > 0 {
            debug!(symbol, scored, "realized returns back-filled");
        }
    }

    pub fn record_execution(&mut self, order: &Order, slippage_bps: f64, latency_ms: f64) {
        self.execution_records.push_back(ExecutionRecord {
            timestamp_ms: order.created_at,
            symbol: order.symbol.clone(),
            order_id: order.id.clone(),
            side: order.side.as_str().to_string(),
            size: order.size,
            price: order.price,
            slippage_bps,
            latency_ms,
            status: order.status,
        });
        while self.execution_records.len() > self.max_history {
            self.execution_records.pop_front();
        }
    }

    /// Spearman IC over the most recent `ic_window` records that carry a
    /// realized return. `None` below 10 valid samples.
    pub fn calculate_ic(&self) -> Option<f64> {
        let mut signals = Vec::new();
        let mut returns = Vec::new();
        for record in self.signal_records.iter().rev() {
            if let Some(forward_return) = record.realized_return {
                signals.push(record.value);
                returns.push(forward_return);
                if signals.len() == self.ic_window {
                    break;
                }
            }
        }
        if signals.len() < MIN_IC_SAMPLES {
            return None;
        }
        spearman(&signals, &returns)
    }

    pub fn signal_metrics(&self) -> SignalMetrics {
        let mut confidence_counts: HashMap<&'static str, usize> = HashMap::new();
        let mut strength_sum = 0.0;
        for record in &self.signal_records {
            *confidence_counts.entry(record.confidence.as_str()).or_default() += 1;
            strength_sum += record.value.abs();
        }
        let total = self.signal_records.len();
        SignalMetrics {
            ic: self.calculate_ic(),
            hit_rate: if self.signal_scored == 0 {
                0.0
            } else {
                self.signal_hits as f64 / self.signal_scored as f64
            },
            total_recorded: total,
            scored_samples: self.signal_scored,
            avg_signal_strength: if total == 0 { 0.0 } else { strength_sum / total as f64 },
            confidence_counts,
        }
    }

    /// Most recent signal values (oldest first), for threshold calibration.
    pub fn recent_signal_values(&self, n: usize) -> Vec<f64> {
        let skip = self.signal_records.len().saturating_sub(n);
        self.signal_records.iter().skip(skip).map(|r| r.value).collect()
    }

    pub fn execution_metrics(&self) -> ExecutionMetrics {
        let total = self.execution_records.len();
        if total == 0 {
            return ExecutionMetrics::default();
        }
        let filled = self
            .execution_records
            .iter()
            .filter(|r| r.status == OrderStatus::Filled)
            .count();
        let avg_slippage =
            self.execution_records.iter().map(|r| r.slippage_bps).sum::<f64>() / total as f64;
        let latencies: Vec<f64> = self.execution_records.iter().map(|r| r.latency_ms).collect();
        let avg_latency = latencies.iter().sum::<f64>() / total as f64;

        let (p50, p95, p99) = if latencies.len() >= 2 {
            let mut data = Data::new(latencies);
            (
                data.percentile(50),
                data.percentile(95),
                data.percentile(99),
            )
        } else {
            (0.0, 0.0, 0.0)
        };

        ExecutionMetrics {
            total_orders: total,
            filled_orders: filled,
            success_rate: filled as f64 / total as f64,
            avg_slippage_bps: avg_slippage,
            avg_latency_ms: avg_latency,
            latency_p50: p50,
            latency_p95: p95,
            latency_p99: p99,
        }
    }
}

/// Spearman rank correlation: Pearson over average ranks (ties share the mean
/// rank). `None` when either side is constant.
fn spearman(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let rank_x = average_ranks(xs);
    let rank_y = average_ranks(ys);

    let n = rank_x.len() as f64;
    let mean_x = rank_x.iter().sum::<f64>() / n;
    let mean_y = rank_y.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..rank_x.len() {
        let dx = rank_x[i] - mean_x;
        let dy = rank_y[i] - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(covariance / (var_x.sqrt() * var_y.sqrt()))
}

fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut indexed: Vec<(usize, f64)> =
        values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < indexed.len() {
        let mut j = i;
        while j + 1 < indexed.len() && indexed[j + 1].1 == indexed[i].1 {
            j += 1;
        }
        // Ranks are 1-based; ties share the mean of their span.
        let shared = (i + j) as f64 / 2.0 + 1.0;
        for item in indexed.iter().take(j + 1).skip(i) {
            ranks[item.0] = shared;
        }
        i = j + 1;
    }
    ranks
}
