//! Deterministic multi-category suitability scoring.

mod config;
mod scorer;
mod types;

pub use config::ScoringConfig;
pub use scorer::{rank_order, SuitabilityScorer};
pub use types::*;
