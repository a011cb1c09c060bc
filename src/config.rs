//! Configuration
//!
//! TOML settings bundle with an environment overlay for wallet identity.
//! `Config::validate()` is the single gate behind the `check-config`
//! subcommand; every range constraint lives there so a bundle that loads is a
//! bundle the engine will accept.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    #[serde(default)]
    pub wallet_address: String,
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_true")]
    pub use_mainnet: bool,
}

fn default_symbols() -> Vec<String> {
    vec!["BTC".to_string(), "ETH".to_string()]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Starting account equity in USD.
    #[serde(default = "default_initial_nav")]
    pub initial_nav: f64,
    /// Single-trade worst-case loss as a fraction of initial NAV, in (0, 1).
    #[serde(default = "default_max_single_loss_pct")]
    pub max_single_loss_pct: f64,
    /// Daily drawdown fuse as a fraction of day-start NAV, in (0, 1).
    #[serde(default = "default_max_daily_drawdown_pct")]
    pub max_daily_drawdown_pct: f64,
    /// Absolute cap on projected position notional, USD.
    #[serde(default = "default_max_position_usd")]
    pub max_position_usd: f64,
    /// Take-profit trigger as a fraction of entry price.
    #[serde(default = "default_tp_pct")]
    pub tp_pct: f64,
    /// Stop-loss trigger as a fraction of entry price.
    #[serde(default = "default_sl_pct")]
    pub sl_pct: f64,
    /// Positions older than this are flattened regardless of PnL.
    #[serde(default = "default_max_position_age_s")]
    pub max_position_age_s: f64,
}

fn default_initial_nav() -> f64 {
    100_000.0
}
fn default_max_single_loss_pct() -> f64 {
    0.008
}
fn default_max_daily_drawdown_pct() -> f64 {
    0.05
}
fn default_max_position_usd() -> f64 {
    10_000.0
}
fn default_tp_pct() -> f64 {
    0.02
}
fn default_sl_pct() -> f64 {
    0.01
}
fn default_max_position_age_s() -> f64 {
    1800.0
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            initial_nav: default_initial_nav(),
            max_single_loss_pct: default_max_single_loss_pct(),
            max_daily_drawdown_pct: default_max_daily_drawdown_pct(),
            max_position_usd: default_max_position_usd(),
            tp_pct: default_tp_pct(),
            sl_pct: default_sl_pct(),
            max_position_age_s: default_max_position_age_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Minimum seconds between emissions for the same symbol.
    #[serde(default = "default_cooldown_s")]
    pub cooldown_s: f64,
    /// Drop when |v - v_last| is below this and the sign is unchanged.
    #[serde(default = "default_change_threshold")]
    pub change_threshold: f64,
    /// Size multiplier applied per same-direction repeat.
    #[serde(default = "default_decay_factor")]
    pub decay_factor: f64,
    /// Hard cap on same-direction emissions until the position flips/flattens.
    #[serde(default = "default_max_same_direction")]
    pub max_same_direction: u32,
}

fn default_cooldown_s() -> f64 {
    5.0
}
fn default_change_threshold() -> f64 {
    0.15
}
fn default_decay_factor() -> f64 {
    0.85
}
fn default_max_same_direction() -> u32 {
    3
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            cooldown_s: default_cooldown_s(),
            change_threshold: default_change_threshold(),
            decay_factor: default_decay_factor(),
            max_same_direction: default_max_same_direction(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    /// Book depth used by the order-book-imbalance signal.
    #[serde(default = "default_obi_levels")]
    pub obi_levels: usize,
    #[serde(default = "default_obi_weight")]
    pub obi_weight: f64,
    #[serde(default = "default_microprice_weight")]
    pub microprice_weight: f64,
    /// Aggressor-volume lookback for the impact signal.
    #[serde(default = "default_impact_window_ms")]
    pub impact_window_ms: i64,
    #[serde(default = "default_impact_weight")]
    pub impact_weight: f64,
    /// High-confidence threshold on |score|.
    #[serde(default = "default_theta_1")]
    pub theta_1: f64,
    /// Medium-confidence threshold on |score|.
    #[serde(default = "default_theta_2")]
    pub theta_2: f64,
    #[serde(default)]
    pub dedup: DedupConfig,
}

fn default_obi_levels() -> usize {
    5
}
fn default_obi_weight() -> f64 {
    0.4
}
fn default_microprice_weight() -> f64 {
    0.3
}
fn default_impact_window_ms() -> i64 {
    100
}
fn default_impact_weight() -> f64 {
    0.3
}
fn default_theta_1() -> f64 {
    0.5
}
fn default_theta_2() -> f64 {
    0.2
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            obi_levels: default_obi_levels(),
            obi_weight: default_obi_weight(),
            microprice_weight: default_microprice_weight(),
            impact_window_ms: default_impact_window_ms(),
            impact_weight: default_impact_weight(),
            theta_1: default_theta_1(),
            theta_2: default_theta_2(),
            dedup: DedupConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Fixed per-order size in base units.
    #[serde(default = "default_order_size")]
    pub default_size: f64,
    /// Absolute price quantum used when pricing maker orders inside the
    /// spread. Config-provided; the engine never infers tick size.
    #[serde(default = "default_tick_offset")]
    pub tick_offset: f64,
    /// Maker resting timeout for HIGH-confidence signals, seconds.
    #[serde(default = "default_timeout_high")]
    pub timeout_high_s: f64,
    /// Maker resting timeout for MEDIUM-confidence signals, seconds.
    #[serde(default = "default_timeout_medium")]
    pub timeout_medium_s: f64,
    #[serde(default = "default_true")]
    pub use_post_only: bool,
    /// Maximum acceptable estimated slippage, basis points.
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: f64,
    /// Price adjustment past best-opposite for IOC orders, basis points.
    #[serde(default = "default_ioc_adjustment_bps")]
    pub ioc_price_adjustment_bps: f64,
    /// Whether a MEDIUM maker timeout falls back to IOC.
    #[serde(default)]
    pub fallback_on_medium: bool,
    /// Whether maker timeouts fall back to IOC at all.
    #[serde(default = "default_true")]
    pub enable_fallback: bool,
    /// Maker fee rate (negative means rebate).
    #[serde(default = "default_maker_fee_rate")]
    pub maker_fee_rate: f64,
    /// Taker fee rate.
    #[serde(default = "default_taker_fee_rate")]
    pub taker_fee_rate: f64,
}

fn default_order_size() -> f64 {
    0.001
}
fn default_tick_offset() -> f64 {
    0.1
}
fn default_timeout_high() -> f64 {
    5.0
}
fn default_timeout_medium() -> f64 {
    3.0
}
fn default_max_slippage_bps() -> f64 {
    20.0
}
fn default_ioc_adjustment_bps() -> f64 {
    5.0
}
fn default_maker_fee_rate() -> f64 {
    0.00015
}
fn default_taker_fee_rate() -> f64 {
    0.00045
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_size: default_order_size(),
            tick_offset: default_tick_offset(),
            timeout_high_s: default_timeout_high(),
            timeout_medium_s: default_timeout_medium(),
            use_post_only: true,
            max_slippage_bps: default_max_slippage_bps(),
            ioc_price_adjustment_bps: default_ioc_adjustment_bps(),
            fallback_on_medium: false,
            enable_fallback: true,
            maker_fee_rate: default_maker_fee_rate(),
            taker_fee_rate: default_taker_fee_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Main loop cadence, milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Periodic health sweep interval, seconds.
    #[serde(default = "default_health_interval_s")]
    pub health_check_interval_s: u64,
}

fn default_tick_interval_ms() -> u64 {
    100
}
fn default_health_interval_s() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            health_check_interval_s: default_health_interval_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite path for the durable execution/attribution record.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "hyperbot.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// The full settings bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub venue: VenueConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load from a TOML file, then overlay `HYPERBOT_WALLET_ADDRESS` from the
    /// environment so identity never has to live in the bundle.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading config {}", path.as_ref().display()))?;
        let mut config: Config = toml::from_str(&raw).context("parsing config TOML")?;

        if let Ok(wallet) = env::var("HYPERBOT_WALLET_ADDRESS") {
            if !wallet.trim().is_empty() {
                config.venue.wallet_address = wallet;
            }
        }

        Ok(config)
    }

    /// Validate every range constraint. A bundle that passes here is one the
    /// engine components will accept at construction.
    pub fn validate(&self) -> Result<(), EngineError> {
        let fail = |msg: String| Err(EngineError::Config(msg));

        if self.venue.symbols.is_empty() {
            return fail("venue.symbols must not be empty".into());
        }

        let r = &self.risk;
        if r.initial_nav <= 0.0 {
            return fail(format!("risk.initial_nav must be > 0, got {}", r.initial_nav));
        }
        if !(0.0 < r.max_single_loss_pct && r.max_single_loss_pct < 1.0) {
            return fail(format!(
                "risk.max_single_loss_pct must be in (0, 1), got {}",
                r.max_single_loss_pct
            ));
        }
        if !(0.0 < r.max_daily_drawdown_pct && r.max_daily_drawdown_pct < 1.0) {
            return fail(format!(
                "risk.max_daily_drawdown_pct must be in (0, 1), got {}",
                r.max_daily_drawdown_pct
            ));
        }
        if r.max_position_usd <= 0.0 {
            return fail(format!(
                "risk.max_position_usd must be > 0, got {}",
                r.max_position_usd
            ));
        }
        if r.tp_pct <= 0.0 || r.sl_pct <= 0.0 || r.max_position_age_s <= 0.0 {
            return fail("risk tp_pct, sl_pct and max_position_age_s must be > 0".into());
        }

        let s = &self.signals;
        if s.obi_levels == 0 || s.obi_levels > 20 {
            return fail(format!("signals.obi_levels must be in 1..=20, got {}", s.obi_levels));
        }
        if s.impact_window_ms < 10 || s.impact_window_ms > 10_000 {
            return fail(format!(
                "signals.impact_window_ms must be in 10..=10000, got {}",
                s.impact_window_ms
            ));
        }
        for (name, w) in [
            ("obi_weight", s.obi_weight),
            ("microprice_weight", s.microprice_weight),
            ("impact_weight", s.impact_weight),
        ] {
            if !(0.0..=1.0).contains(&w) {
                return fail(format!("signals.{} must be in [0, 1], got {}", name, w));
            }
        }
        let total_weight = s.obi_weight + s.microprice_weight + s.impact_weight;
        if !(0.99..=1.01).contains(&total_weight) {
            return fail(format!(
                "signal weights must sum to ~1.0, got {:.3}",
                total_weight
            ));
        }
        if !(0.0..=1.0).contains(&s.theta_1) || !(0.0..=1.0).contains(&s.theta_2) {
            return fail(format!(
                "thresholds must be in [0, 1], got theta_1={} theta_2={}",
                s.theta_1, s.theta_2
            ));
        }
        if s.theta_2 >= s.theta_1 {
            return fail(format!(
                "theta_2 ({}) must be less than theta_1 ({})",
                s.theta_2, s.theta_1
            ));
        }
        let d = &s.dedup;
        if d.cooldown_s < 0.0 || d.change_threshold < 0.0 {
            return fail("dedup cooldown_s and change_threshold must be >= 0".into());
        }
        if !(0.0 < d.decay_factor && d.decay_factor <= 1.0) {
            return fail(format!(
                "dedup.decay_factor must be in (0, 1], got {}",
                d.decay_factor
            ));
        }

        let e = &self.execution;
        if e.default_size <= 0.0 {
            return fail(format!("execution.default_size must be > 0, got {}", e.default_size));
        }
        if e.tick_offset <= 0.0 {
            return fail(format!("execution.tick_offset must be > 0, got {}", e.tick_offset));
        }
        if e.timeout_high_s <= 0.0 || e.timeout_medium_s <= 0.0 {
            return fail("execution timeouts must be > 0".into());
        }
        if !(0.0..=1000.0).contains(&e.max_slippage_bps) {
            return fail(format!(
                "execution.max_slippage_bps must be in [0, 1000], got {}",
                e.max_slippage_bps
            ));
        }
        if e.ioc_price_adjustment_bps < 0.0 {
            return fail("execution.ioc_price_adjustment_bps must be >= 0".into());
        }

        if self.engine.tick_interval_ms == 0 {
            return fail("engine.tick_interval_ms must be > 0".into());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            venue: VenueConfig {
                wallet_address: String::new(),
                symbols: default_symbols(),
                use_mainnet: true,
            },
            risk: RiskConfig::default(),
            signals: SignalsConfig::default(),
            execution: ExecutionConfig::default(),
            engine: EngineConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}
