//! Types for discovery runs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::budget::{BudgetSnapshot, GateError};
use crate::cache::{CacheError, CacheStats};
use crate::scoring::{ScoreBreakdown, Verdict};
use crate::store::StoreError;
use crate::upstream::{RepositoryCandidate, UpstreamError};

use super::DiscoveryConfig;

/// Errors surfaced by discovery and analysis.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    #[error("Rate limit exceeded: {remaining} remaining, resets at {reset_at}")]
    RateLimitExceeded {
        remaining: u32,
        reset_at: DateTime<Utc>,
    },

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Repository unavailable: {0}")]
    RepositoryUnavailable(String),

    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),

    #[error("Cache inconsistency: {0}")]
    CacheInconsistency(String),

    #[error("User state error: {0}")]
    UserState(#[from] StoreError),

    #[error("Discovery deadline exceeded")]
    DeadlineExceeded,
}

impl From<GateError> for DiscoveryError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::RateLimitExceeded {
                remaining,
                reset_at,
            } => DiscoveryError::RateLimitExceeded {
                remaining,
                reset_at,
            },
            GateError::Upstream(UpstreamError::NotFound(id)) => {
                DiscoveryError::RepositoryUnavailable(id)
            }
            GateError::Upstream(UpstreamError::RateLimited { reset_at }) => {
                DiscoveryError::RateLimitExceeded {
                    remaining: 0,
                    reset_at: reset_at.unwrap_or_else(Utc::now),
                }
            }
            GateError::Upstream(e) => DiscoveryError::UpstreamUnavailable(e.to_string()),
            GateError::Closed => {
                DiscoveryError::UpstreamUnavailable("upstream worker pool closed".to_string())
            }
        }
    }
}

impl From<CacheError> for DiscoveryError {
    fn from(e: CacheError) -> Self {
        DiscoveryError::CacheInconsistency(e.to_string())
    }
}

/// Parameters of one discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    pub user_id: String,
    pub min_stars: u32,
    pub max_stars: u32,
    /// Repositories wanted. Defaults to the configured limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Freshness window. Defaults to the configured window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_days: Option<u32>,
    #[serde(default)]
    pub force_refresh: bool,
    /// Run deadline, capped at the configured one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl DiscoveryRequest {
    pub fn new(user_id: impl Into<String>, min_stars: u32, max_stars: u32) -> Self {
        Self {
            user_id: user_id.into(),
            min_stars,
            max_stars,
            limit: None,
            window_days: None,
            force_refresh: false,
            timeout_ms: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_window_days(mut self, days: u32) -> Self {
        self.window_days = Some(days);
        self
    }

    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Check the request and fill in defaults. Runs before any upstream call.
    pub fn resolve(&self, config: &DiscoveryConfig) -> Result<RunCriteria, DiscoveryError> {
        if self.user_id.trim().is_empty() {
            return Err(DiscoveryError::InvalidCriteria(
                "user id must not be empty".to_string(),
            ));
        }
        if self.min_stars > self.max_stars {
            return Err(DiscoveryError::InvalidCriteria(format!(
                "min_stars ({}) exceeds max_stars ({})",
                self.min_stars, self.max_stars
            )));
        }

        let limit = self.limit.unwrap_or(config.default_limit);
        if limit == 0 || limit > config.max_limit {
            return Err(DiscoveryError::InvalidCriteria(format!(
                "limit must be between 1 and {}",
                config.max_limit
            )));
        }

        let window_days = self.window_days.unwrap_or(config.default_window_days);
        if window_days == 0 || window_days > config.max_window_days {
            return Err(DiscoveryError::InvalidCriteria(format!(
                "window_days must be between 1 and {}",
                config.max_window_days
            )));
        }

        let max_deadline = Duration::from_secs(config.deadline_secs);
        let deadline = match self.timeout_ms {
            Some(0) => {
                return Err(DiscoveryError::InvalidCriteria(
                    "timeout_ms must be positive".to_string(),
                ))
            }
            Some(ms) => Duration::from_millis(ms).min(max_deadline),
            None => max_deadline,
        };

        Ok(RunCriteria {
            limit: limit as usize,
            window_days,
            deadline,
        })
    }
}

/// Validated, defaulted run parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunCriteria {
    pub limit: usize,
    pub window_days: u32,
    pub deadline: Duration,
}

/// Why a discovery run stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    LimitReached,
    #[default]
    StrategiesExhausted,
    RoundCapReached,
    DeadlineExceeded,
    BudgetExhausted,
    UpstreamUnavailable,
}

impl StopReason {
    /// Whether the run ended early and its result may be incomplete.
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            StopReason::DeadlineExceeded
                | StopReason::BudgetExhausted
                | StopReason::UpstreamUnavailable
        )
    }
}

/// Counters describing how a run went.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryDiagnostics {
    pub strategies_consulted: Vec<String>,
    pub rounds: u32,
    /// Upstream calls issued through the gate, retries excluded.
    pub upstream_calls: u32,
    pub candidates_seen: u32,
    pub suppressed_by_freshness: u32,
    pub filtered_out: u32,
    pub cache_hits: u32,
    pub cache_misses: u32,
    pub skipped_unavailable: u32,
    pub limit_satisfied: bool,
    pub partial: bool,
    pub stop_reason: StopReason,
    pub budget_remaining: u32,
    pub elapsed_ms: u64,
}

/// One repository in a ranked result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedRepository {
    pub repository: RepositoryCandidate,
    pub score: ScoreBreakdown,
    pub verdict: Verdict,
    /// Strategy whose page surfaced the repository.
    pub strategy_id: String,
    pub from_cache: bool,
    /// Shown to this user before (stale exposure or forced refresh).
    pub previously_shown: bool,
}

/// Output of a discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub run_id: String,
    pub user_id: String,
    pub repositories: Vec<RankedRepository>,
    pub diagnostics: DiscoveryDiagnostics,
}

/// Output of the single-repository path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryAnalysis {
    pub repository: RepositoryCandidate,
    pub score: ScoreBreakdown,
    pub verdict: Verdict,
    pub suitable: bool,
    pub from_cache: bool,
}

/// Read-only engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDiagnostics {
    pub upstream: String,
    pub budget: BudgetSnapshot,
    pub workers_available: usize,
    pub workers_capacity: usize,
    pub strategies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
}

/// Rows removed by a retention cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub seen_records_removed: u64,
    pub cache_entries_removed: u64,
}
