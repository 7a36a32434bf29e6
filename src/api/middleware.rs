//! Security middleware for API authentication.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Security configuration loaded from environment variables.
///
/// With no API key set the server runs open, which is the local-workstation
/// default. Setting a key switches every `/api/v1` route (except the health
/// probe) to require it.
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    /// API key for authentication (from WAYPOINT_API_KEY)
    pub api_key: Option<String>,
    /// Allowed CORS origins (from WAYPOINT_CORS_ORIGINS, comma-separated)
    pub cors_origins: Option<Vec<String>>,
}

impl SecurityConfig {
    /// Load security configuration from environment variables.
    pub fn from_env() -> Self {
        let api_key = std::env::var("WAYPOINT_API_KEY").ok();
        let cors_origins = std::env::var("WAYPOINT_CORS_ORIGINS")
            .ok()
            .map(|s| s.split(',').map(|s| s.trim().to_string()).collect());
        Self {
            api_key,
            cors_origins,
        }
    }

    /// Create a config with no authentication (for local development/testing).
    pub fn disabled() -> Self {
        Self {
            api_key: None,
            cors_origins: None,
        }
    }

    /// Create a config with authentication enabled (for testing).
    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            cors_origins: None,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Reject requests without the configured API key as a bearer token.
/// Health probes pass unauthenticated so deployment checks keep working.
pub async fn require_api_key(
    State(config): State<SecurityConfig>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &config.api_key else {
        return next.run(request).await;
    };
    if request.uri().path().ends_with("/health") {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided == Some(expected.as_str()) {
        next.run(request).await
    } else {
        tracing::warn!(path = %request.uri().path(), "rejected request with missing or bad API key");
        (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
    }
}

/// CORS layer honoring the configured origin allowlist, permissive otherwise.
pub fn cors_layer(config: &SecurityConfig) -> CorsLayer {
    match &config.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new().allow_origin(AllowOrigin::list(origins))
        }
        None => CorsLayer::permissive(),
    }
}
