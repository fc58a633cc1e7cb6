//! RAVE Telemetry - Logging and Metrics
//!
//! Structured logging through `tracing-subscriber` and Prometheus metrics
//! for the HTTP layer. Provider and agent-run metrics are registered by
//! their own crates and gathered from the same default registry.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, ApiMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracer, LogFormat, TelemetryConfig};
