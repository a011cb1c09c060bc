//! Trading Engine
//!
//! The main loop. Tick phases, in order: (1) read the market-data store,
//! (2) position-closer sweep, (3) per-symbol signal -> classify -> dedup ->
//! risk -> route, (4) periodic health sweep. Only transport I/O suspends;
//! the pure-compute stages run to completion inside the tick.
//!
//! The shutdown watch flag is consulted between tick phases. A latched risk
//! breach stops the loop after the current iteration finishes.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::analytics::{
    AdaptiveCostEstimator, AlphaHealthChecker, HealthInputs, MakerFillRateMonitor, MarketState,
    MarketStateDetector, MetricsCollector, PnLAttribution,
};
use crate::config::Config;
use crate::error::EngineError;
use crate::execution::{
    ExecutionReport, HybridExecutor, IocExecutor, ShallowMakerExecutor, SlippageEstimator,
};
use crate::market_data::MarketDataStore;
use crate::risk::{HardLimits, PositionCloser, PositionManager, TpSlManager};
use crate::signals::{SignalAggregator, SignalClassifier, SignalDeduplicator};
use crate::storage::{ExecutionRow, TradeRecorder};
use crate::transport::ExecutionTransport;
use crate::types::{now_ms, ConfidenceLevel, MarketData, Millis, Order, OrderType, Side};

/// Calibration sample floor; below it config thresholds stay in force.
const CALIBRATION_SAMPLE: usize = 100;
/// Forward-return horizon used for IC back-fill.
const RETURN_HORIZON_MS: i64 = 5_000;

pub struct TradingEngine {
    config: Config,
    store: Arc<MarketDataStore>,
    aggregator: SignalAggregator,
    classifier: SignalClassifier,
    deduplicator: SignalDeduplicator,
    executor: HybridExecutor,
    closer: PositionCloser,
    closer_ioc: IocExecutor,
    slippage: SlippageEstimator,
    cost_estimator: AdaptiveCostEstimator,
    limits: HardLimits,
    positions: PositionManager,
    attribution: PnLAttribution,
    metrics: MetricsCollector,
    detectors: HashMap<String, MarketStateDetector>,
    last_states: HashMap<String, MarketState>,
    health: AlphaHealthChecker,
    fill_monitor: MakerFillRateMonitor,
    recorder: Option<TradeRecorder>,
    shutdown_rx: watch::Receiver<bool>,
    last_health_ms: Millis,
    /// Live size multiplier from the latest health advice.
    size_factor: f64,
    /// Additive threshold bump from the latest health advice.
    theta_boost: f64,
    health_stop: bool,
}

impl TradingEngine {
    pub fn new(
        config: Config,
        transport: Arc<dyn ExecutionTransport>,
        store: Arc<MarketDataStore>,
        recorder: Option<TradeRecorder>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let aggregator = SignalAggregator::from_config(&config.signals)?;
        let classifier = SignalClassifier::new(config.signals.theta_1, config.signals.theta_2)?;
        let deduplicator = SignalDeduplicator::new(config.signals.dedup.clone());

        let exec = &config.execution;
        let to_decimal = |value: f64, field: &str| {
            Decimal::try_from(value)
                .map_err(|e| EngineError::Config(format!("{}: {}", field, e)))
        };

        let maker = ShallowMakerExecutor::new(
            transport.clone(),
            to_decimal(exec.tick_offset, "tick_offset")?,
            Duration::from_secs_f64(exec.timeout_high_s),
            Duration::from_secs_f64(exec.timeout_medium_s),
            exec.use_post_only,
        );
        let ioc = IocExecutor::new(transport.clone(), exec.ioc_price_adjustment_bps);
        let executor = HybridExecutor::new(maker, ioc, exec.enable_fallback, exec.fallback_on_medium);
        let closer_ioc = IocExecutor::new(transport, exec.ioc_price_adjustment_bps);

        let slippage = SlippageEstimator::new(exec.max_slippage_bps);
        let cost_estimator = AdaptiveCostEstimator::new(
            SlippageEstimator::new(exec.max_slippage_bps),
            exec.maker_fee_rate,
            exec.taker_fee_rate,
        );

        let risk = &config.risk;
        let limits = HardLimits::new(
            to_decimal(risk.initial_nav, "initial_nav")?,
            risk.max_single_loss_pct,
            risk.max_daily_drawdown_pct,
            to_decimal(risk.max_position_usd, "max_position_usd")?,
        )?;
        let closer = PositionCloser::new(
            TpSlManager::new(risk.tp_pct, risk.sl_pct)?,
            Duration::from_secs_f64(risk.max_position_age_s),
        );

        let attribution = PnLAttribution::new(exec.maker_fee_rate, exec.taker_fee_rate)?;
        let metrics = MetricsCollector::new(100, RETURN_HORIZON_MS);

        Ok(Self {
            config,
            store,
            aggregator,
            classifier,
            deduplicator,
            executor,
            closer,
            closer_ioc,
            slippage,
            cost_estimator,
            limits,
            positions: PositionManager::new(),
            attribution,
            metrics,
            detectors: HashMap::new(),
            last_states: HashMap::new(),
            health: AlphaHealthChecker::new(),
            fill_monitor: MakerFillRateMonitor::default(),
            recorder,
            shutdown_rx,
            last_health_ms: 0,
            size_factor: 1.0,
            theta_boost: 0.0,
            health_stop: false,
        })
    }

    /// Run until shutdown or a latched risk breach.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        info!(
            symbols = ?self.config.venue.symbols,
            tick_ms = self.config.engine.tick_interval_ms,
            "trading engine started"
        );

        let mut ticker = interval(Duration::from_millis(self.config.engine.tick_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if *self.shutdown_rx.borrow() {
                info!("shutdown requested, finishing current tick");
                break;
            }

            self.tick().await;

            if self.limits.is_breached() {
                // The periodic sweep logged the breach; leave after the full
                // iteration so fills already received stay booked.
                error!("risk breach latched, stopping main loop");
                return Err(EngineError::BreachLatched(
                    self.limits
                        .status()
                        .breach_reason
                        .unwrap_or_else(|| "risk breach".into()),
                ));
            }
        }

        self.shutdown_report();
        Ok(())
    }

    /// One full tick: closer sweep, per-symbol pipeline, periodic health.
    pub async fn tick(&mut self) {
        let market = self.collect_market();

        // Phase 1: risk exits run before any open-side logic.
        self.close_positions(&market).await;
        if *self.shutdown_rx.borrow() {
            return;
        }

        // Phase 2: per-symbol signal pipeline.
        let symbols: Vec<String> = self.config.venue.symbols.clone();
        for symbol in symbols {
            if *self.shutdown_rx.borrow() {
                return;
            }
            if let Some(market_data) = market.get(&symbol) {
                self.process_symbol(market_data).await;
            }
        }

        // Phase 3: periodic health sweep.
        let now = now_ms();
        let interval_ms = self.config.engine.health_check_interval_s as i64 * 1_000;
        if now - self.last_health_ms >= interval_ms {
            self.last_health_ms = now;
            self.periodic_health_check(now);
        }
    }

    fn collect_market(&self) -> HashMap<String, MarketData> {
        self.config
            .venue
            .symbols
            .iter()
            .filter_map(|symbol| self.store.get(symbol).map(|md| (symbol.clone(), md)))
            .collect()
    }

    async fn close_positions(&mut self, market: &HashMap<String, MarketData>) {
        let now = now_ms();
        let closed = self
            .closer
            .sweep(&self.positions, market, &self.closer_ioc, now)
            .await;

        for close in closed {
            info!(
                symbol = %close.order.symbol,
                reason = close.reason.as_str(),
                order_id = %close.order.id,
                "position closed"
            );
            // Risk exits carry no directional signal of their own.
            self.book_fill(&close.order, 0.0, ConfidenceLevel::Low, close.reference_mid, market);
            self.deduplicator.reset_symbol(&close.order.symbol);
        }
    }

    async fn process_symbol(&mut self, market_data: &MarketData) {
        let symbol = market_data.symbol.clone();
        let mid = market_data.mid_price.to_f64().unwrap_or(0.0);

        // Forward returns for signals whose horizon has elapsed.
        self.metrics.backfill_returns(&symbol, now_ms(), mid);

        // Market state feeds the cost model and the health sweep.
        let detector = self
            .detectors
            .entry(symbol.clone())
            .or_insert_with(MarketStateDetector::default);
        let state_metrics = detector.detect(market_data);
        self.last_states.insert(symbol.clone(), state_metrics.detected_state);

        let mut score = self.aggregator.calculate(market_data);
        self.metrics.record_signal(&score, &symbol, mid);

        let filtered = match self
            .deduplicator
            .filter(&symbol, &score, self.positions.size(&symbol))
        {
            Some(filtered) => filtered,
            None => return,
        };
        score = filtered.score;

        if score.value == 0.0 {
            return;
        }
        let side = if score.value > 0.0 { Side::Buy } else { Side::Sell };

        // Health advice scales size; zero means entries are stopped.
        let multiplier = filtered.size_multiplier * self.size_factor;
        let size = Decimal::try_from(self.config.execution.default_size * multiplier)
            .unwrap_or(Decimal::ZERO);
        if size <= Decimal::ZERO {
            debug!(symbol = %symbol, "entry suppressed by health size factor");
            return;
        }

        // Risk pre-check: a rejection is a decision, not an error.
        if let Err(err) = self.limits.check_order(
            side,
            size,
            market_data.mid_price,
            self.positions.size(&symbol),
        ) {
            match err {
                EngineError::RiskRejected(reason) => {
                    warn!(
                        symbol = %symbol,
                        reason = %reason,
                        confidence = score.confidence.as_str(),
                        "order rejected by risk control"
                    );
                }
                EngineError::BreachLatched(reason) => {
                    warn!(symbol = %symbol, reason = %reason, "breach latched, order rejected");
                }
                other => warn!(symbol = %symbol, error = %other, "risk check failed"),
            }
            return;
        }

        // State-conditioned cost advisory for the passive leg.
        let cost = self.cost_estimator.estimate(
            OrderType::LimitPostOnly,
            side,
            size,
            market_data,
            &state_metrics,
        );
        if cost.recommend_ioc || cost.recommend_reduce_size {
            debug!(
                symbol = %symbol,
                state = cost.market_state.as_str(),
                total_cost_bps = cost.total_cost_bps,
                recommend_ioc = cost.recommend_ioc,
                recommend_reduce_size = cost.recommend_reduce_size,
                "adaptive cost advisory"
            );
        }

        let started = std::time::Instant::now();
        let report = match self.executor.execute(&score, size, market_data).await {
            Ok(report) => report,
            Err(EngineError::Busy { symbol, side }) => {
                debug!(symbol = %symbol, side, "execution busy, signal dropped");
                return;
            }
            Err(err) => {
                warn!(symbol = %symbol, error = %err, "execution failed");
                return;
            }
        };
        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;

        self.record_maker_attempt(&score, &report);

        if let Some(order) = &report.order {
            if order.filled_size > Decimal::ZERO {
                let market = self.collect_market();
                let attribution_total = self.book_fill(
                    order,
                    score.value,
                    score.confidence,
                    market_data.mid_price,
                    &market,
                );
                info!(
                    symbol = %order.symbol,
                    order_id = %order.id,
                    side = order.side.as_str(),
                    order_type = order.order_type.as_str(),
                    confidence = score.confidence.as_str(),
                    size = %order.filled_size,
                    pnl = %attribution_total,
                    used_fallback = report.used_fallback,
                    "trade completed"
                );
            }
            let slippage_bps =
                self.slippage
                    .actual_slippage_bps(order.price, market_data.mid_price, order.side);
            self.metrics.record_execution(order, slippage_bps, latency_ms);
        }
    }

    fn record_maker_attempt(&mut self, score: &crate::types::SignalScore, report: &ExecutionReport) {
        if !report.maker_attempted {
            return;
        }
        if matches!(score.confidence, ConfidenceLevel::High | ConfidenceLevel::Medium) {
            self.fill_monitor.record_attempt(score.confidence, report.maker_filled);
        }
    }

    /// Book one fill everywhere it matters: ledger, NAV, attribution, loss
    /// streak, durable record. Returns the attribution total.
    fn book_fill(
        &mut self,
        order: &Order,
        signal_value: f64,
        confidence: ConfidenceLevel,
        reference_mid: Decimal,
        market: &HashMap<String, MarketData>,
    ) -> Decimal {
        let now = now_ms();
        let application = self.positions.apply_fill(
            &order.symbol,
            order.side,
            order.filled_size,
            order.price,
            now,
        );

        let best_price = market
            .get(&order.symbol)
            .and_then(|md| match order.side {
                Side::Buy => md.best_ask().map(|l| l.price),
                Side::Sell => md.best_bid().map(|l| l.price),
            })
            .unwrap_or(order.price);

        let attribution =
            self.attribution
                .attribute_trade(order, signal_value, reference_mid, best_price);

        self.limits.update_pnl(attribution.total);
        self.health.record_trade_outcome(attribution.total < Decimal::ZERO);

        if let Some(recorder) = &self.recorder {
            let slippage_bps =
                self.slippage
                    .actual_slippage_bps(order.price, reference_mid, order.side);
            let row = ExecutionRow::from_parts(
                order,
                confidence,
                signal_value,
                slippage_bps,
                0.0,
                &attribution,
            );
            if let Err(err) = recorder.record(&row) {
                warn!(symbol = %order.symbol, error = %err, "trade persistence failed");
            }
        }

        debug!(
            symbol = %order.symbol,
            position = %application.position_after.size,
            realized = %application.realized_delta,
            "fill booked"
        );
        attribution.total
    }

    /// Worst current market state across symbols, for the health sweep.
    fn overall_market_state(&self) -> MarketState {
        let mut worst = MarketState::Normal;
        for state in self.last_states.values().copied() {
            worst = match (worst, state) {
                (_, MarketState::LowLiquidity) | (MarketState::LowLiquidity, _) => {
                    MarketState::LowLiquidity
                }
                (_, MarketState::HighVolatility) | (MarketState::HighVolatility, _) => {
                    MarketState::HighVolatility
                }
                (_, MarketState::Choppy) | (MarketState::Choppy, _) => MarketState::Choppy,
                _ => MarketState::Normal,
            };
        }
        worst
    }

    fn periodic_health_check(&mut self, now: Millis) {
        // 1. Quick alpha share check.
        let (alpha_healthy, alpha_message) = self.attribution.check_alpha_health();
        if !alpha_healthy {
            warn!(message = %alpha_message, "alpha health warning");
        }

        // 2. Risk status; a breach here ends the run (checked by the loop).
        let risk_status = self.limits.status();
        if risk_status.is_breached {
            error!(reason = ?risk_status.breach_reason, "risk breach detected");
            return;
        }

        // 3. Recalibrate thresholds once enough history exists, then apply
        //    the standing health boost.
        let sample = self.metrics.recent_signal_values(CALIBRATION_SAMPLE * 5);
        if sample.len() >= CALIBRATION_SAMPLE {
            if let Ok((theta_1, theta_2)) = self.classifier.calibrate(&sample, 0.10, 0.30) {
                let theta_1 = (theta_1 + self.theta_boost).clamp(0.0, 1.0);
                let mut theta_2 = (theta_2 + self.theta_boost).clamp(0.0, 1.0);
                if theta_2 >= theta_1 {
                    theta_2 = (theta_1 - 0.01).max(0.0);
                }
                if let Err(err) = self.aggregator.set_thresholds(theta_1, theta_2) {
                    warn!(error = %err, "calibrated thresholds rejected");
                }
            }
        }

        // 4. Full health classification and advice application.
        let ic = self.metrics.calculate_ic();
        let alpha_pct = if self.attribution.trade_count() > 0 {
            Some(self.attribution.alpha_percentage().abs())
        } else {
            None
        };
        let report = self.health.check(HealthInputs {
            ic,
            alpha_percentage: alpha_pct,
            market_state: self.overall_market_state(),
            now_ms: now,
        });

        self.size_factor = report.advice.size_factor;
        if (report.advice.theta_adjustment - self.theta_boost).abs() > f64::EPSILON {
            self.theta_boost = report.advice.theta_adjustment;
            let (theta_1, theta_2) = self.aggregator.thresholds();
            let boosted_1 = (theta_1 + self.theta_boost).clamp(0.0, 1.0);
            let mut boosted_2 = (theta_2 + self.theta_boost).clamp(0.0, 1.0);
            if boosted_2 >= boosted_1 {
                boosted_2 = (boosted_1 - 0.01).max(0.0);
            }
            if let Err(err) = self.aggregator.set_thresholds(boosted_1, boosted_2) {
                warn!(error = %err, "threshold boost rejected");
            }
        }
        if report.advice.stop_trading && !self.health_stop {
            self.health_stop = true;
            error!(status = report.status.as_str(), "health checker stopped new entries");
        } else if !report.advice.stop_trading {
            self.health_stop = false;
        }

        // 5. Fill-rate alerts.
        let high_stats = self.fill_monitor.stats(ConfidenceLevel::High);
        let medium_stats = self.fill_monitor.stats(ConfidenceLevel::Medium);
        if self.fill_monitor.is_critical(ConfidenceLevel::High)
            || self.fill_monitor.is_critical(ConfidenceLevel::Medium)
        {
            error!(
                high_fill_rate = ?high_stats.window_fill_rate,
                medium_fill_rate = ?medium_stats.window_fill_rate,
                "maker fill rate critical"
            );
        }

        // 6. Summary line.
        let executor_stats = self.executor.stats();
        let signal_metrics = self.metrics.signal_metrics();
        let execution_metrics = self.metrics.execution_metrics();
        info!(
            alpha_healthy,
            health_status = report.status.as_str(),
            ic = ?signal_metrics.ic,
            hit_rate = signal_metrics.hit_rate,
            nav = %risk_status.current_nav,
            daily_pnl = %risk_status.daily_pnl,
            maker_fill_rate_high = ?high_stats.window_fill_rate,
            maker_fill_rate_medium = ?medium_stats.window_fill_rate,
            total_signals = executor_stats.total_signals,
            maker_fill_rate = executor_stats.maker_fill_rate(),
            ioc_fill_rate = executor_stats.ioc_fill_rate(),
            skip_rate = executor_stats.skip_rate(),
            avg_slippage_bps = execution_metrics.avg_slippage_bps,
            size_factor = self.size_factor,
            "health check completed"
        );
    }

    fn shutdown_report(&self) {
        let stats = self.executor.stats();
        let attribution = self.attribution.report();
        info!(
            total_signals = stats.total_signals,
            maker_fills = stats.maker_fills,
            ioc_fills = stats.ioc_fills,
            trades = attribution.trade_count,
            total_pnl = %attribution.total,
            realized = %self.positions.total_realized_pnl(),
            "trading engine stopped"
        );
    }

    // Accessors used by the integration harness and the CLI.

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn risk_status(&self) -> crate::risk::RiskStatus {
        self.limits.status()
    }

    pub fn attribution_report(&self) -> crate::analytics::AttributionReport {
        self.attribution.report()
    }

    pub fn executor_stats(&self) -> crate::execution::ExecutorStats {
        self.executor.stats()
    }

    pub fn fill_rate(&self, confidence: ConfidenceLevel) -> Option<f64> {
        self.fill_monitor.fill_rate(confidence)
    }

    pub fn is_breached(&self) -> bool {
        self.limits.is_breached()
    }
}
