//! REST API Routes Module
//!
//! - Agent functions under /functions/v1/*
//! - Health checks at /health/*
//! - Metrics at /metrics (when enabled)
//! - CORS on everything

pub mod functions;
pub mod health;

use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn,
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use functions::create_router as functions_router;
pub use health::create_router as health_router;

// ============================================================================
// CORS LAYER
// ============================================================================

/// With no configured origins every origin is allowed.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.is_permissive() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any).allow_headers(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: allowing configured origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins).allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("apikey"),
            HeaderName::from_static("x-client-info"),
        ])
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Complete router with observability and CORS applied.
///
/// Execution order: CORS -> Observability -> Handler
pub fn create_api_router(state: AppState, config: &ApiConfig) -> Router {
    let mut router = Router::new()
        .nest("/functions/v1", functions::create_router())
        .nest("/health", health::create_router());

    if config.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(from_fn(observability_middleware))
        .layer(build_cors_layer(config))
        .with_state(state)
}
