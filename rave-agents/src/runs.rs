//! agent-runs: run history with staleness-aware status.

use crate::{request, unknown_action, AgentContext};
use chrono::Utc;
use rave_core::{AgentFunction, AgentRun, EntityKind, RaveResult, StorageError, Timestamp};
use serde_json::{json, Value};
use std::time::Duration;

pub const ACTIONS: &[&str] = &["list", "get"];

const FUNCTION: AgentFunction = AgentFunction::AgentRuns;

fn run_view(run: &AgentRun, now: Timestamp, stale_after: Duration) -> Value {
    let mut view = json!(run);
    if let Value::Object(map) = &mut view {
        map.insert(
            "effective_status".to_string(),
            json!(run.effective_status(now, stale_after)),
        );
    }
    view
}

#[tracing::instrument(skip(ctx, body), fields(function = %FUNCTION))]
pub async fn handle(ctx: &AgentContext, action: &str, body: &Value) -> RaveResult<Value> {
    let now = Utc::now();
    let stale_after = ctx.config.run_stale_after;
    match action {
        "list" => {
            let limit = request::u32_in(body, "limit", 1..=500, 50)?;
            let runs = ctx.store.list_runs(limit as usize).await?;
            let views: Vec<Value> = runs.iter().map(|r| run_view(r, now, stale_after)).collect();
            Ok(json!({ "count": views.len(), "runs": views }))
        }
        "get" => {
            let run_id = request::required_id(body, "run_id")?;
            let run = ctx
                .store
                .get_run(run_id)
                .await?
                .ok_or(StorageError::NotFound {
                    entity: EntityKind::Run,
                    id: run_id,
                })?;
            Ok(json!({ "run": run_view(&run, now, stale_after) }))
        }
        other => Err(unknown_action(FUNCTION, other).into()),
    }
}
