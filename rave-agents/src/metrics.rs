//! Agent run metrics

use once_cell::sync::Lazy;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};
use rave_core::{AgentFunction, RunStatus};
use std::time::Duration;

const RUN_DURATION_BUCKETS: &[f64] = &[0.05, 0.25, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

pub static AGENT_METRICS: Lazy<Result<AgentMetrics, prometheus::Error>> =
    Lazy::new(AgentMetrics::new);

#[derive(Clone)]
pub struct AgentMetrics {
    /// labels: function, status
    pub runs_total: CounterVec,
    /// labels: function
    pub run_duration_seconds: HistogramVec,
}

impl AgentMetrics {
    fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            runs_total: register_counter_vec!(
                "rave_agent_runs_total",
                "Finished agent runs by function and status",
                &["function", "status"]
            )?,
            run_duration_seconds: register_histogram_vec!(
                "rave_agent_run_duration_seconds",
                "Agent run wall time in seconds",
                &["function"],
                RUN_DURATION_BUCKETS.to_vec()
            )?,
        })
    }
}

pub fn record_run(function: AgentFunction, status: RunStatus, elapsed: Duration) {
    if let Ok(metrics) = AGENT_METRICS.as_ref() {
        metrics
            .runs_total
            .with_label_values(&[function.as_db_str(), status.as_db_str()])
            .inc();
        metrics
            .run_duration_seconds
            .with_label_values(&[function.as_db_str()])
            .observe(elapsed.as_secs_f64());
    }
}
