//! Analytics Feedback Loop
//!
//! PnL decomposition, rolling signal/execution metrics with Spearman IC,
//! market-state detection, state-conditioned cost adjustment, maker fill-rate
//! monitoring, and the alpha-health classifier whose advice steers live size
//! and threshold adjustments.

mod adaptive_cost;
mod alpha_health;
mod attribution;
mod fill_rate;
mod market_state;
mod metrics;

pub use adaptive_cost::{AdaptiveCostEstimate, AdaptiveCostEstimator};
pub use alpha_health::{AlphaHealthChecker, HealthAdvice, HealthInputs, HealthReport, HealthStatus};
pub use attribution::{AttributionReport, PnLAttribution, TradeAttribution};
pub use fill_rate::{FillRateStats, MakerFillRateMonitor};
pub use market_state::{MarketMetrics, MarketState, MarketStateDetector};
pub use metrics::{ExecutionRecord, MetricsCollector, SignalRecord};
