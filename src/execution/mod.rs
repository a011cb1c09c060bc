//! Execution Layer
//!
//! Hybrid maker-preferred execution: a shallow post-only maker attempt with a
//! confidence-tiered resting timeout, falling back to an IOC taker order when
//! the maker leg times out or the venue rejects the post-only flag.

mod hybrid;
mod ioc;
mod maker;
mod slippage;

pub use hybrid::{ExecutionReport, ExecutorStats, HybridExecutor};
pub use ioc::IocExecutor;
pub use maker::{MakerOutcome, ShallowMakerExecutor};
pub use slippage::{SlippageEstimate, SlippageEstimator};
