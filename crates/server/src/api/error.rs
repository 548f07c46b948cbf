//! Mapping of engine errors onto HTTP responses.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use reposcout_core::{AuthError, DiscoveryError, StoreError};
use serde::Serialize;
use tracing::{error, warn};

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    RateLimited {
        remaining: u32,
        reset_at: DateTime<Utc>,
    },
    BadGateway(String),
    GatewayTimeout,
    /// Discovery is not configured on this instance.
    Unavailable,
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "invalid_criteria",
            ApiError::NotFound(_) => "repository_unavailable",
            ApiError::RateLimited { .. } => "rate_limit_exceeded",
            ApiError::BadGateway(_) => "upstream_unavailable",
            ApiError::GatewayTimeout => "deadline_exceeded",
            ApiError::Unavailable => "discovery_disabled",
            ApiError::Internal(_) => "internal",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(m)
            | ApiError::NotFound(m)
            | ApiError::BadGateway(m)
            | ApiError::Internal(m) => m.clone(),
            ApiError::RateLimited {
                remaining,
                reset_at,
            } => format!(
                "Rate limit exceeded: {} remaining, resets at {}",
                remaining,
                reset_at.to_rfc3339()
            ),
            ApiError::GatewayTimeout => "Discovery deadline exceeded".to_string(),
            ApiError::Unavailable => {
                "Discovery is disabled: no [github] section configured".to_string()
            }
        }
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(e: DiscoveryError) -> Self {
        match e {
            DiscoveryError::InvalidCriteria(m) => ApiError::BadRequest(m),
            DiscoveryError::RepositoryUnavailable(id) => {
                ApiError::NotFound(format!("Repository unavailable: {}", id))
            }
            DiscoveryError::RateLimitExceeded {
                remaining,
                reset_at,
            } => ApiError::RateLimited {
                remaining,
                reset_at,
            },
            DiscoveryError::UpstreamUnavailable(m) => ApiError::BadGateway(m),
            DiscoveryError::DeadlineExceeded => ApiError::GatewayTimeout,
            e @ (DiscoveryError::UserState(_) | DiscoveryError::CacheInconsistency(_)) => {
                error!(error = %e, "Discovery failed on local state");
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        error!(error = %e, "User state store failed");
        ApiError::Internal(e.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (remaining, reset_at) = match &self {
            ApiError::RateLimited {
                remaining,
                reset_at,
            } => (Some(*remaining), Some(*reset_at)),
            _ => (None, None),
        };
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self.message(), "Request failed");
        }

        let body = ErrorResponse {
            error: self.message(),
            kind: self.kind(),
            remaining,
            reset_at,
        };
        let mut response = (status, Json(body)).into_response();

        if let Some(reset_at) = reset_at {
            let wait = (reset_at - Utc::now()).num_seconds().max(0);
            if let Ok(value) = HeaderValue::from_str(&wait.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
