//! Risk and Position Core
//!
//! Pre-trade admission, live NAV / drawdown tracking, the per-symbol position
//! ledger, and the TP/SL + max-age closer. Everything here is owned and
//! mutated only by the engine loop task.

mod hard_limits;
mod position;
mod tp_sl;

pub use hard_limits::{HardLimits, RiskStatus};
pub use position::{FillApplication, Position, PositionManager};
pub use tp_sl::{CloseResult, ExitReason, PositionCloser, TpSlManager};
