//! Types for the shared upstream request budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::upstream::UpstreamError;

/// Budget configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Requests per window assumed until upstream reports its own limit.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Below this many remaining requests the budget throttles.
    #[serde(default = "default_low_water")]
    pub low_water: u32,
    /// Length of the quota window in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// How often one call may be deferred before it gives up.
    #[serde(default = "default_max_deferred_retries")]
    pub max_deferred_retries: u32,
    /// Size of the upstream worker pool.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// Cost charged per call before upstream reports real costs.
    #[serde(default = "default_initial_cost_estimate")]
    pub initial_cost_estimate: f64,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_limit() -> u32 {
    5000
}

fn default_low_water() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    3600
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_max_deferred_retries() -> u32 {
    5
}

fn default_max_concurrent_requests() -> usize {
    4
}

fn default_initial_cost_estimate() -> f64 {
    1.0
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            low_water: default_low_water(),
            window_secs: default_window_secs(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_deferred_retries: default_max_deferred_retries(),
            max_concurrent_requests: default_max_concurrent_requests(),
            initial_cost_estimate: default_initial_cost_estimate(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration for transient upstream failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per call, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial delay before first retry in milliseconds (default: 500)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds (default: 10000)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16) as i32;
        let ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exp);
        Duration::from_millis(ms.min(self.max_delay_ms as f64) as u64)
    }
}

/// Budget state. Derived from the remaining count, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetState {
    Available,
    Throttled,
    Exhausted,
}

impl BudgetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetState::Available => "available",
            BudgetState::Throttled => "throttled",
            BudgetState::Exhausted => "exhausted",
        }
    }
}

/// Outcome of asking the budget for permission to make a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetDecision {
    /// Proceed; the estimated cost has been charged.
    Allow,
    /// Wait this long, then ask again.
    Defer(Duration),
    /// No calls until the window resets.
    Exhausted { reset_at: DateTime<Utc> },
}

/// Point-in-time view of the budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    pub state: BudgetState,
    pub remaining: u32,
    pub limit: u32,
    pub low_water: u32,
    pub reset_at: DateTime<Utc>,
    pub average_cost: f64,
    pub throttle_streak: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_allowed_at: Option<DateTime<Utc>>,
}

/// Errors returned by the upstream gate.
#[derive(Debug, Clone, Error)]
pub enum GateError {
    #[error("Rate limit exceeded: {remaining} remaining, resets at {reset_at}")]
    RateLimitExceeded {
        remaining: u32,
        reset_at: DateTime<Utc>,
    },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Upstream worker pool closed")]
    Closed,
}
