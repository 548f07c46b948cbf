//! Per-user state API handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use reposcout_core::{validate_user_id, StrategyStatus, UserReset, UserStats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::discovery::engine;
use super::error::ApiError;
use crate::state::AppState;

/// Query parameters for user statistics
#[derive(Debug, Deserialize)]
pub struct StatsParams {
    /// Window for the "shown recently" count. Defaults to the discovery window.
    pub window_days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StrategiesResponse {
    pub user_id: String,
    pub strategies: Vec<StrategyStatus>,
}

#[derive(Debug, Serialize)]
pub struct StrategyResetResponse {
    pub user_id: String,
    pub cursors_reset: usize,
}

fn user_id(raw: &str) -> Result<&str, ApiError> {
    Ok(validate_user_id(raw)?)
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(raw_user): Path<String>,
    Query(params): Query<StatsParams>,
) -> Result<Json<UserStats>, ApiError> {
    let orchestrator = engine(&state)?;
    let user_id = user_id(&raw_user)?;
    let discovery = &state.config().discovery;
    let window_days = params.window_days.unwrap_or(discovery.default_window_days);
    if window_days == 0 || window_days > discovery.max_window_days {
        return Err(ApiError::BadRequest(format!(
            "window_days must be between 1 and {}",
            discovery.max_window_days
        )));
    }
    Ok(Json(orchestrator.user_stats(user_id, window_days)?))
}

/// Forget everything shown to the user and restart all strategies.
pub async fn reset_user(
    State(state): State<Arc<AppState>>,
    Path(raw_user): Path<String>,
) -> Result<Json<UserReset>, ApiError> {
    let orchestrator = engine(&state)?;
    let user_id = user_id(&raw_user)?;
    Ok(Json(orchestrator.reset_user(user_id)?))
}

pub async fn get_strategies(
    State(state): State<Arc<AppState>>,
    Path(raw_user): Path<String>,
) -> Result<Json<StrategiesResponse>, ApiError> {
    let orchestrator = engine(&state)?;
    let user_id = user_id(&raw_user)?;
    let strategies = orchestrator.strategy_status(user_id)?;
    Ok(Json(StrategiesResponse {
        user_id: user_id.to_string(),
        strategies,
    }))
}

/// Clear cursors and exhaustion flags; exposure history is kept.
pub async fn reset_strategies(
    State(state): State<Arc<AppState>>,
    Path(raw_user): Path<String>,
) -> Result<Json<StrategyResetResponse>, ApiError> {
    let orchestrator = engine(&state)?;
    let user_id = user_id(&raw_user)?;
    let cursors_reset = orchestrator.reset_strategies(user_id)?;
    Ok(Json(StrategyResetResponse {
        user_id: user_id.to_string(),
        cursors_reset,
    }))
}
