//! Engine Error Taxonomy
//!
//! Typed errors for the seams where the caller branches on the failure class.
//! Pre-trade rejections and signal component failures are telemetry, not
//! errors; they only appear here so the router can short-circuit on them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Unrecoverable at startup: bad settings bundle.
    #[error("config error: {0}")]
    Config(String),

    /// Transport-level failure. Recoverable; callers retry with backoff.
    #[error("transport error: {0}")]
    Transport(String),

    /// A second order for the same (symbol, side) while one is live.
    #[error("busy: in-flight order for {symbol} {side}")]
    Busy { symbol: String, side: &'static str },

    /// Pre-trade risk denial. Logged as a decision, never propagated as a
    /// failure.
    #[error("risk rejected: {0}")]
    RiskRejected(String),

    /// The venue rejected a post-only order that would have crossed.
    /// Expected; triggers the IOC fallback path.
    #[error("post-only order would cross")]
    PostOnlyCrossed,

    /// A signal or estimator failed for one tick; contributes zero and the
    /// tick continues.
    #[error("component error: {0}")]
    Component(String),

    /// The risk fuse tripped; the main loop stops after the current tick.
    #[error("risk breach latched: {0}")]
    BreachLatched(String),
}

impl EngineError {
    /// Whether the error is transient and worth a retry at the transport.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transport(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
