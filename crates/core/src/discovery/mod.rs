//! Freshness-aware discovery.
//!
//! The orchestrator composes the rest of the engine per request:
//! - **Rotation**: diversified queries with resumable per-user cursors
//! - **Gating**: every upstream call goes through the shared budget
//! - **Filtering**: domain rules plus the per-user no-repeat filter
//! - **Scoring**: cached breakdowns keyed by last commit

mod config;
mod filters;
mod orchestrator;
mod types;

pub use config::{DiscoveryConfig, FilterConfig};
pub use filters::{normalize_license, DomainFilter, Rejection};
pub use orchestrator::DiscoveryOrchestrator;
pub use types::{
    CleanupReport, DiscoveryDiagnostics, DiscoveryError, DiscoveryRequest, EngineDiagnostics,
    RankedRepository, RankedResult, RepositoryAnalysis, RunCriteria, StopReason,
};
