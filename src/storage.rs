//! Durable Trade Record
//!
//! SQLite-backed store for execution and attribution rows. This is the
//! engine's durable output: every fill lands here with its signal context and
//! PnL decomposition, and the engine state is reconstructible by replaying
//! the table. WAL mode so readers never block the write path.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::path::Path;
use tracing::{debug, info};

use crate::analytics::TradeAttribution;
use crate::types::{ConfidenceLevel, Millis, Order};

/// One persisted fill with its full context.
#[derive(Debug, Clone)]
pub struct ExecutionRow {
    pub timestamp_ms: Millis,
    pub symbol: String,
    pub side: String,
    pub size: f64,
    pub price: f64,
    pub order_type: String,
    pub status: String,
    pub confidence: String,
    pub signal_value: f64,
    pub slippage_bps: f64,
    pub latency_ms: f64,
    pub alpha: f64,
    pub fee: f64,
    pub slippage: f64,
    pub impact: f64,
    pub rebate: f64,
    pub total: f64,
}

impl ExecutionRow {
    pub fn from_parts(
        order: &Order,
        confidence: ConfidenceLevel,
        signal_value: f64,
        slippage_bps: f64,
        latency_ms: f64,
        attribution: &TradeAttribution,
    ) -> Self {
        let decimal = |value: Decimal| value.to_f64().unwrap_or(0.0);
        Self {
            timestamp_ms: order.created_at,
            symbol: order.symbol.clone(),
            side: order.side.as_str().to_string(),
            size: decimal(order.filled_size),
            price: decimal(order.price),
            order_type: order.order_type.as_str().to_string(),
            status: order.status.as_str().to_string(),
            confidence: confidence.as_str().to_string(),
            signal_value,
            slippage_bps,
            latency_ms,
            alpha: decimal(attribution.alpha),
            fee: decimal(attribution.fee),
            slippage: decimal(attribution.slippage),
            impact: decimal(attribution.impact),
            rebate: decimal(attribution.rebate),
            total: decimal(attribution.total),
        }
    }
}

pub struct TradeRecorder {
    conn: Mutex<Connection>,
}

impl TradeRecorder {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("opening trade db {}", path.as_ref().display()))?;
        Self::init(conn)
    }

    /// In-memory store for tests and dry runs without a db file.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("opening in-memory trade db")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                size REAL NOT NULL,
                price REAL NOT NULL,
                type TEXT NOT NULL,
                status TEXT NOT NULL,
                confidence TEXT NOT NULL,
                signal_value REAL NOT NULL,
                slippage_bps REAL NOT NULL,
                latency_ms REAL NOT NULL,
                alpha REAL NOT NULL,
                fee REAL NOT NULL,
                slippage REAL NOT NULL,
                impact REAL NOT NULL,
                rebate REAL NOT NULL,
                total REAL NOT NULL
            )
            "#,
            [],
        )
        .context("creating executions table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_executions_symbol_ts
             ON executions (symbol, timestamp)",
            [],
        )
        .context("creating executions index")?;

        info!("trade recorder ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn record(&self, row: &ExecutionRow) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO executions (
                timestamp, symbol, side, size, price, type, status,
                confidence, signal_value, slippage_bps, latency_ms,
                alpha, fee, slippage, impact, rebate, total
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
            params![
                row.timestamp_ms,
                row.symbol,
                row.side,
                row.size,
                row.price,
                row.order_type,
                row.status,
                row.confidence,
                row.signal_value,
                row.slippage_bps,
                row.latency_ms,
                row.alpha,
                row.fee,
                row.slippage,
                row.impact,
                row.rebate,
                row.total,
            ],
        )
        .context("inserting execution row")?;
        debug!(symbol = %row.symbol, side = %row.side, "execution persisted");
        Ok(())
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: u64 = conn
            .query_row("SELECT COUNT(*) FROM executions", [], |row| row.get(0))
            .context("counting executions")?;
        Ok(count)
    }

    /// Most recent rows for a symbol, newest first.
    pub fn recent(&self, symbol: &str, limit: usize) -> Result<Vec<ExecutionRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT timestamp, symbol, side, size, price, type, status,
                       confidence, signal_value, slippage_bps, latency_ms,
                       alpha, fee, slippage, impact, rebate, total
                FROM executions
                WHERE symbol = ?1
                ORDER BY timestamp DESC, id DESC
                LIMIT ?2
                "#,
            )
            .context("preparing recent query")?;

        let rows = stmt
            .query_map(params![symbol, limit as i64], |row| {
                Ok(ExecutionRow {
                    timestamp_ms: row.get(0)?,
                    symbol: row.get(1)?,
                    side: row.get(2)?,
                    size: row.get(3)?,
                    price: row.get(4)?,
                    order_type: row.get(5)?,
                    status: row.get(6)?,
                    confidence: row.get(7)?,
                    signal_value: row.get(8)?,
                    slippage_bps: row.get(9)?,
                    latency_ms: row.get(10)?,
                    alpha: row.get(11)?,
                    fee: row.get(12)?,
                    slippage: row.get(13)?,
                    impact: row.get(14)?,
                    rebate: row.get(15)?,
                    total: row.get(16)?,
                })
            })
            .context("querying recent executions")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("reading recent executions")?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderStatus, OrderType, Side};
    use rust_decimal_macros::dec;

    fn sample_row(symbol: &str, ts: Millis) -> ExecutionRow {
        let mut order = Order::new(symbol, Side::Buy, OrderType::Ioc, dec!(100.5), dec!(0.5));
        order.filled_size = dec!(0.5);
        order.status = OrderStatus::Filled;
        order.created_at = ts;
        let attribution = TradeAttribution {
            trade_id: order.id.clone(),
            symbol: symbol.to_string(),
            alpha: dec!(0.35),
            fee: dec!(-0.02),
            slippage: dec!(-0.05),
            impact: dec!(-0.01),
            rebate: Decimal::ZERO,
            total: dec!(0.27),
            timestamp_ms: ts,
        };
        ExecutionRow::from_parts(&order, ConfidenceLevel::High, 0.7, 2.5, 12.0, &attribution)
    }

    #[test]
    fn test_record_and_count() {
        let recorder = TradeRecorder::open_in_memory().unwrap();
        recorder.record(&sample_row("BTC", 1_000)).unwrap();
        recorder.record(&sample_row("BTC", 2_000)).unwrap();
        recorder.record(&sample_row("ETH", 3_000)).unwrap();
        assert_eq!(recorder.count().unwrap(), 3);
    }

    #[test]
    fn test_recent_filters_and_orders() {
        let recorder = TradeRecorder::open_in_memory().unwrap();
        for ts in [1_000, 2_000, 3_000] {
            recorder.record(&sample_row("BTC", ts)).unwrap();
        }
        recorder.record(&sample_row("ETH", 4_000)).unwrap();

        let rows = recorder.recent("BTC", 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp_ms, 3_000);
        assert_eq!(rows[1].timestamp_ms, 2_000);
        assert_eq!(rows[0].confidence, "HIGH");
        assert!((rows[0].total - 0.27).abs() < 1e-9);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.db");
        {
            let recorder = TradeRecorder::open(&path).unwrap();
            recorder.record(&sample_row("BTC", 1_000)).unwrap();
        }
        // Reopen: the row survived.
        let recorder = TradeRecorder::open(&path).unwrap();
        assert_eq!(recorder.count().unwrap(), 1);
    }
}
