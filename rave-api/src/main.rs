//! RAVE API Server Entry Point
//!
//! Loads configuration, wires the store and providers, and starts the Axum
//! HTTP server.

use std::sync::Arc;

use axum::Router;
use rave_api::telemetry::{init_tracer, TelemetryConfig};
use rave_api::{create_api_router, ApiConfig, ApiError, ApiResult, AppState};
use rave_core::RaveConfig;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env()?;
    init_tracer(&telemetry_config)?;

    let rave_config = Arc::new(RaveConfig::from_env()?);
    let api_config = ApiConfig::from_env()?;

    let state = AppState::from_config(rave_config, &api_config).await?;
    let app: Router = create_api_router(state, &api_config);

    let addr = api_config.bind_addr()?;
    tracing::info!(%addr, store = ?api_config.store, "Starting RAVE API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
