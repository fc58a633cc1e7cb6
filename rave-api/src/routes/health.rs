//! Health endpoints, no auth.
//!
//! `ready` reports the store round trip and which vendors can be called.
//! It only fails (503) when the store is down: with no provider keys the
//! run history is still served, so the report is `degraded` instead.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use rave_core::ProviderKind;
use serde::Serialize;
use std::time::Instant;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    Ready,
    Degraded,
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreCheck {
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_trip_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderReport {
    /// Vendors holding a credential, in fan-out order.
    pub configured: Vec<ProviderKind>,
    pub primary: ProviderKind,
    pub primary_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub status: Readiness,
    pub store: StoreCheck,
    pub providers: ProviderReport,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

impl ReadinessReport {
    fn http_status(&self) -> StatusCode {
        match self.status {
            Readiness::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Readiness::Ready | Readiness::Degraded => StatusCode::OK,
        }
    }
}

fn readiness_of(store: &StoreCheck, providers: &ProviderReport) -> Readiness {
    if !store.reachable {
        Readiness::Unavailable
    } else if providers.configured.is_empty() {
        Readiness::Degraded
    } else {
        Readiness::Ready
    }
}

async fn ping() -> &'static str {
    "pong"
}

async fn live() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "alive" }))
}

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessReport>) {
    let started = Instant::now();
    let store = match state.agents.store.health_check().await {
        Ok(()) => StoreCheck {
            reachable: true,
            round_trip_ms: Some(started.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            StoreCheck {
                reachable: false,
                round_trip_ms: None,
                error: Some(e.to_string()),
            }
        }
    };

    let registry = &state.agents.providers;
    let configured = registry.configured_kinds();
    let primary = registry.primary_kind();
    let providers = ProviderReport {
        primary_configured: configured.contains(&primary),
        configured,
        primary,
    };

    let report = ReadinessReport {
        status: readiness_of(&store, &providers),
        store,
        providers,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };
    (report.http_status(), Json(report))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(live))
        .route("/ready", get(ready))
}
