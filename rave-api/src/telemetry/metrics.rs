//! Prometheus Metrics Definitions
//!
//! HTTP metrics for the API layer and the `/metrics` scrape handler.

use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
    TEXT_FORMAT,
};

use crate::error::ApiError;

/// HTTP request latency buckets (seconds). Agent actions wait on model
/// calls, so the tail goes well past the usual web range.
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Global metrics instance - initialized on first use
pub static METRICS: Lazy<Result<ApiMetrics, prometheus::Error>> = Lazy::new(ApiMetrics::new);

#[derive(Clone)]
pub struct ApiMetrics {
    /// labels: method, path, status
    pub http_requests_total: CounterVec,

    /// labels: method, path
    pub http_request_duration_seconds: HistogramVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "rave_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )?,
            http_request_duration_seconds: register_histogram_vec!(
                "rave_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )?,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }
}

/// Record a request if the registry came up; otherwise only log.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    match METRICS.as_ref() {
        Ok(metrics) => metrics.record_http_request(method, path, status, duration_secs),
        Err(e) => tracing::debug!(error = %e, "HTTP metrics unavailable"),
    }
}

/// Every family in the default registry: HTTP, provider calls, agent runs
/// and process metrics.
pub fn render() -> Result<Vec<u8>, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(buffer)
}

/// GET /metrics
pub async fn metrics_handler() -> Response {
    match render() {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            ApiError::internal_error(format!("Failed to encode metrics: {}", e)).into_response()
        }
    }
}
