use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::middleware::{auth_middleware, metrics_middleware};
use super::{discovery, handlers, users};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Routes acting for a user sit behind the authenticator
    let protected = Router::new()
        .route("/config", get(handlers::get_config))
        // Discovery
        .route("/discover", post(discovery::discover))
        .route("/analyze/{owner}/{repo}", get(discovery::analyze))
        .route("/diagnostics", get(discovery::diagnostics))
        // Per-user state
        .route("/users/{user_id}", delete(users::reset_user))
        .route("/users/{user_id}/stats", get(users::get_stats))
        .route("/users/{user_id}/strategies", get(users::get_strategies))
        .route(
            "/users/{user_id}/strategies/reset",
            post(users::reset_strategies),
        )
        // Maintenance
        .route("/maintenance/cleanup", post(discovery::cleanup))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
