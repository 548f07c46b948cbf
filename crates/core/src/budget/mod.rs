//! Shared upstream request budget and gate.
//!
//! One [`UpstreamGate`] exists per process. All discovery runs, regardless
//! of user, draw from the same [`RateBudget`] and worker pool.

mod gate;
mod ledger;
mod types;

pub use gate::UpstreamGate;
pub use ledger::{BudgetLedger, RateBudget};
pub use types::*;
