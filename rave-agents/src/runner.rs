//! Run lifecycle
//!
//! Begin a run, execute the action, then write the outcome in one
//! `complete_run`. A failed action is recorded as a failed run and its
//! original error is handed back to the caller.

use crate::metrics::record_run;
use crate::AgentContext;
use rave_core::{
    AgentFunction, AgentRun, EntityId, Insight, Issue, MergeCandidate, RaveResult, RunCompletion,
    RunStatus,
};
use serde_json::{json, Map, Value};
use std::future::Future;
use std::time::Instant;

/// What a completed run wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct Finished {
    pub run: AgentRun,
    pub insight: Option<Insight>,
    pub issues: Vec<Issue>,
    pub merge_candidates: Vec<MergeCandidate>,
}

impl Finished {
    /// Response payload: the run's result object plus the run id, status
    /// and every row the run produced.
    pub fn response(&self) -> Value {
        let mut body = match &self.run.result {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other.clone());
                map
            }
        };
        body.insert("run_id".to_string(), json!(self.run.run_id));
        body.insert("status".to_string(), json!(self.run.status));
        if let Some(insight) = &self.insight {
            body.insert("insight".to_string(), json!(insight));
        }
        if !self.issues.is_empty() {
            body.insert("issues".to_string(), json!(self.issues));
        }
        if !self.merge_candidates.is_empty() {
            body.insert("merge_candidates".to_string(), json!(self.merge_candidates));
        }
        Value::Object(body)
    }
}

pub struct Runner<'a> {
    ctx: &'a AgentContext,
    function: AgentFunction,
}

impl<'a> Runner<'a> {
    pub fn new(ctx: &'a AgentContext, function: AgentFunction) -> Self {
        Self { ctx, function }
    }

    /// Execute `work` inside a run record. `work` receives the run id so
    /// the rows it builds can reference it.
    pub async fn run<F, Fut>(&self, action: &str, work: F) -> RaveResult<Finished>
    where
        F: FnOnce(EntityId) -> Fut,
        Fut: Future<Output = RaveResult<RunCompletion>>,
    {
        let run = AgentRun::start(self.function, action);
        let run_id = run.run_id;
        self.ctx.store.begin_run(&run).await?;
        let started = Instant::now();

        let outcome = match work(run_id).await {
            Ok(completion) => {
                let insight = completion.insight.clone();
                let issues = completion.issues.clone();
                let merge_candidates = completion.merge_candidates.clone();
                self.ctx
                    .store
                    .complete_run(run_id, completion)
                    .await
                    .map(|run| Finished {
                        run,
                        insight,
                        issues,
                        merge_candidates,
                    })
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(finished) => {
                record_run(self.function, RunStatus::Completed, started.elapsed());
                tracing::info!(
                    %run_id,
                    function = %self.function,
                    action,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "run completed"
                );
                Ok(finished)
            }
            Err(err) => {
                record_run(self.function, RunStatus::Failed, started.elapsed());
                tracing::warn!(%run_id, function = %self.function, action, error = %err, "run failed");
                let failed = RunCompletion::failed(err.to_string());
                if let Err(store_err) = self.ctx.store.complete_run(run_id, failed).await {
                    tracing::error!(%run_id, error = %store_err, "could not record run failure");
                }
                Err(err)
            }
        }
    }
}
