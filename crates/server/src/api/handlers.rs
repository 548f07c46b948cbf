use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use reposcout_core::{BudgetSnapshot, BudgetState, SanitizedConfig};
use serde::Serialize;
use std::sync::Arc;

use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while the shared budget is throttled or exhausted.
    pub status: String,
    pub discovery_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetSnapshot>,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let budget = match state.orchestrator() {
        Some(orchestrator) => Some(orchestrator.gate().snapshot().await),
        None => None,
    };
    let status = match &budget {
        Some(snapshot) if snapshot.state != BudgetState::Available => "degraded",
        _ => "ok",
    };

    Json(HealthResponse {
        status: status.to_string(),
        discovery_enabled: budget.is_some(),
        budget,
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
