//! RAVE API - HTTP Layer
//!
//! Exposes every agent function as `POST /functions/v1/{function}` with a
//! uniform JSON envelope, plus health checks and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use config::{ApiConfig, StoreBackend};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use state::AppState;
