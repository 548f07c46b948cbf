//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Discovery runs (outcome, duration, candidates)
//! - Upstream calls through the gate
//! - Analysis cache hits and misses
//! - Shared rate budget state

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts};

use crate::budget::{BudgetSnapshot, BudgetState};

// =============================================================================
// Discovery Metrics
// =============================================================================

/// Discovery runs total by outcome.
pub static DISCOVERY_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reposcout_discovery_runs_total", "Total discovery runs"),
        &["outcome"], // "complete", "partial", "failed"
    )
    .unwrap()
});

/// Discovery run duration in seconds.
pub static DISCOVERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "reposcout_discovery_duration_seconds",
            "Duration of discovery runs",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Repositories returned per discovery run.
pub static DISCOVERY_RESULTS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "reposcout_discovery_results",
            "Number of repositories returned per discovery run",
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Upstream Metrics
// =============================================================================

/// Upstream calls by kind and result.
pub static UPSTREAM_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reposcout_upstream_calls_total", "Total upstream calls"),
        // kind: "search", "repository", "issues"
        // result: "ok", "retry", "error", "rate_limited", "budget_denied"
        &["kind", "result"],
    )
    .unwrap()
});

// =============================================================================
// Cache Metrics
// =============================================================================

/// Analysis cache lookups by result.
pub static ANALYSIS_CACHE: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reposcout_analysis_cache_total",
            "Analysis cache lookups",
        ),
        &["result"], // "hit", "miss", "inconsistent"
    )
    .unwrap()
});

// =============================================================================
// Budget Metrics
// =============================================================================

/// Remaining upstream allowance.
pub static BUDGET_REMAINING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reposcout_budget_remaining",
        "Remaining upstream request allowance",
    )
    .unwrap()
});

/// Budget state (1 for the current state, 0 otherwise).
pub static BUDGET_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("reposcout_budget_state", "Current rate budget state"),
        &["state"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

pub fn record_upstream_call(kind: &str, result: &str) {
    UPSTREAM_CALLS.with_label_values(&[kind, result]).inc();
}

pub fn record_cache_lookup(result: &str) {
    ANALYSIS_CACHE.with_label_values(&[result]).inc();
}

pub fn record_discovery_run(outcome: &str, duration_secs: f64, results: usize) {
    DISCOVERY_RUNS.with_label_values(&[outcome]).inc();
    DISCOVERY_DURATION
        .with_label_values(&[outcome])
        .observe(duration_secs);
    DISCOVERY_RESULTS
        .with_label_values(&[])
        .observe(results as f64);
}

/// Publish the budget snapshot to the gauges.
pub fn record_budget(snapshot: &BudgetSnapshot) {
    BUDGET_REMAINING.set(snapshot.remaining as i64);
    for state in [
        BudgetState::Available,
        BudgetState::Throttled,
        BudgetState::Exhausted,
    ] {
        BUDGET_STATE
            .with_label_values(&[state.as_str()])
            .set(i64::from(state == snapshot.state));
    }
}

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Discovery
        Box::new(DISCOVERY_RUNS.clone()),
        Box::new(DISCOVERY_DURATION.clone()),
        Box::new(DISCOVERY_RESULTS.clone()),
        // Upstream
        Box::new(UPSTREAM_CALLS.clone()),
        // Cache
        Box::new(ANALYSIS_CACHE.clone()),
        // Budget
        Box::new(BUDGET_REMAINING.clone()),
        Box::new(BUDGET_STATE.clone()),
    ]
}
