//! Discovery and analysis API handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use reposcout_core::{
    CleanupReport, DiscoveryOrchestrator, DiscoveryRequest, EngineDiagnostics, RankedResult,
    RepoId, RepositoryAnalysis,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::error::ApiError;
use super::middleware::AuthUser;
use crate::state::AppState;

/// Request body for a discovery run. The user comes from the caller's identity.
#[derive(Debug, Deserialize)]
pub struct DiscoverBody {
    pub min_stars: u32,
    pub max_stars: u32,
    pub limit: Option<u32>,
    pub window_days: Option<u32>,
    #[serde(default)]
    pub force_refresh: bool,
    pub timeout_ms: Option<u64>,
}

impl DiscoverBody {
    fn into_request(self, user_id: String) -> DiscoveryRequest {
        DiscoveryRequest {
            user_id,
            min_stars: self.min_stars,
            max_stars: self.max_stars,
            limit: self.limit,
            window_days: self.window_days,
            force_refresh: self.force_refresh,
            timeout_ms: self.timeout_ms,
        }
    }
}

pub(super) fn engine(state: &AppState) -> Result<&Arc<DiscoveryOrchestrator>, ApiError> {
    state.orchestrator().ok_or(ApiError::Unavailable)
}

/// Run freshness-aware discovery for the calling user.
pub async fn discover(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<DiscoverBody>,
) -> Result<Json<RankedResult>, ApiError> {
    let orchestrator = engine(&state)?;
    let result = orchestrator.discover(body.into_request(user_id)).await?;
    Ok(Json(result))
}

/// Score one repository without touching the caller's exposure history.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<RepositoryAnalysis>, ApiError> {
    let orchestrator = engine(&state)?;
    let repo_id = RepoId::new(&owner, &repo).map_err(ApiError::BadRequest)?;
    let analysis = orchestrator.analyze(&repo_id).await?;
    Ok(Json(analysis))
}

pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EngineDiagnostics>, ApiError> {
    let orchestrator = engine(&state)?;
    Ok(Json(orchestrator.diagnostics().await))
}

/// Purge stale exposure history and sweep the analysis cache.
pub async fn cleanup(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<CleanupReport>, ApiError> {
    let orchestrator = engine(&state)?;
    info!(requested_by = %user_id, "Retention cleanup requested");
    let report = orchestrator.cleanup(&state.config().retention).await?;
    Ok(Json(report))
}
