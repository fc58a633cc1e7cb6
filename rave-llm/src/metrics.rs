//! Provider call metrics
//!
//! Registered on the default Prometheus registry so the API's `/metrics`
//! endpoint exposes them alongside its own.

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};
use rave_core::ProviderKind;
use std::time::Duration;

/// Provider latency buckets (seconds). Chat completions are slow.
const PROVIDER_LATENCY_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0];

pub static PROVIDER_METRICS: Lazy<Result<ProviderMetrics, prometheus::Error>> =
    Lazy::new(ProviderMetrics::new);

#[derive(Clone)]
pub struct ProviderMetrics {
    /// labels: provider, outcome
    pub calls_total: CounterVec,
    /// labels: provider
    pub call_duration_seconds: HistogramVec,
}

impl ProviderMetrics {
    fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            calls_total: register_counter_vec!(
                "rave_provider_calls_total",
                "Total chat-completion calls by provider and outcome",
                &["provider", "outcome"]
            )?,
            call_duration_seconds: register_histogram_vec!(
                "rave_provider_call_duration_seconds",
                "Chat-completion latency in seconds",
                &["provider"],
                PROVIDER_LATENCY_BUCKETS.to_vec()
            )?,
        })
    }
}

/// Record one call. Registration failures are silently skipped.
pub fn record_call(provider: ProviderKind, outcome: &str, elapsed: Duration) {
    if let Ok(metrics) = PROVIDER_METRICS.as_ref() {
        metrics
            .calls_total
            .with_label_values(&[provider.as_db_str(), outcome])
            .inc();
        metrics
            .call_duration_seconds
            .with_label_values(&[provider.as_db_str()])
            .observe(elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_call_increments_counter() {
        record_call(ProviderKind::Groq, "ok", Duration::from_millis(120));
        let metrics = PROVIDER_METRICS.as_ref().unwrap();
        let count = metrics
            .calls_total
            .with_label_values(&["groq", "ok"])
            .get();
        assert!(count >= 1.0);
    }
}
