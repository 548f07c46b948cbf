//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the reposcout server:
//! - HTTP request metrics (latency, counts, auth failures)
//! - Upstream worker pool occupancy (collected dynamically)
//! - Core discovery, cache and budget metrics, registered from `reposcout_core`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "reposcout_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reposcout_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reposcout_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reposcout_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Upstream Pool Metrics (collected dynamically)
// =============================================================================

/// Free upstream worker slots.
pub static UPSTREAM_WORKERS_AVAILABLE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reposcout_upstream_workers_available",
        "Number of idle upstream worker slots",
    )
    .unwrap()
});

/// Upstream worker pool size.
pub static UPSTREAM_WORKERS_CAPACITY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reposcout_upstream_workers_capacity",
        "Size of the upstream worker pool",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();

    // Upstream pool
    registry
        .register(Box::new(UPSTREAM_WORKERS_AVAILABLE.clone()))
        .unwrap();
    registry
        .register(Box::new(UPSTREAM_WORKERS_CAPACITY.clone()))
        .unwrap();

    // Core metrics (discovery, upstream calls, cache, budget)
    for metric in reposcout_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the budget and pool gauges reflect the
/// present moment rather than the last discovery run.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    if let Some(orchestrator) = state.orchestrator() {
        let gate = orchestrator.gate();
        reposcout_core::metrics::record_budget(&gate.snapshot().await);
        UPSTREAM_WORKERS_AVAILABLE.set(gate.available_workers() as i64);
        UPSTREAM_WORKERS_CAPACITY.set(gate.capacity() as i64);
    }
}

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});
static USER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/users/[^/]+").unwrap());
static REPO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/analyze/[^/]+/[^/]+").unwrap());
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace ids with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_RE.replace_all(path, "{id}");
    let result = USER_RE.replace_all(&result, "/users/{user}");
    let result = REPO_RE.replace_all(&result, "/analyze/{owner}/{repo}");
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");
    result.to_string()
}
