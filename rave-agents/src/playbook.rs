//! playbook-agent
//!
//! Turns an editorial or growth goal into a short action plan. Every
//! configured provider drafts one; they vote on the plan's priority and
//! their steps, risks and success metrics are unioned.

use crate::runner::Runner;
use crate::{prompts, request, unknown_action, AgentContext};
use rave_core::{AgentFunction, EntityId, Insight, InsightKind, RaveResult, RunCompletion};
use rave_llm::{ask_for_consensus, OpinionSpec, PromptVars};
use serde::Serialize;
use serde_json::{json, Value};

pub const ACTIONS: &[&str] = &["generate", "list"];

const FUNCTION: AgentFunction = AgentFunction::PlaybookAgent;
const DEFAULT_HORIZON_DAYS: u32 = 30;

/// Priorities a playbook can carry. Anything else is treated as `medium`.
pub const PRIORITIES: &[&str] = &["high", "medium", "low"];

#[derive(Debug, Clone, Serialize)]
pub struct PlaybookBrief {
    pub goal: String,
    pub audience: Option<String>,
    pub constraints: Vec<String>,
    pub horizon_days: u32,
}

impl PlaybookBrief {
    pub fn from_body(body: &Value) -> RaveResult<Self> {
        Ok(Self {
            goal: request::required_str(body, "goal")?,
            audience: request::optional_str(body, "audience")?,
            constraints: request::string_list(body, "constraints")?,
            horizon_days: request::u32_in(body, "horizon_days", 1..=365, DEFAULT_HORIZON_DAYS)?,
        })
    }
}

/// Map a consensus label onto [`PRIORITIES`].
pub fn priority(label: &str) -> &'static str {
    let label = label.trim().to_lowercase();
    PRIORITIES
        .iter()
        .find(|p| **p == label)
        .copied()
        .unwrap_or("medium")
}

#[tracing::instrument(skip(ctx, body), fields(function = %FUNCTION))]
pub async fn handle(ctx: &AgentContext, action: &str, body: &Value) -> RaveResult<Value> {
    match action {
        "generate" => {
            let brief = PlaybookBrief::from_body(body)?;
            let finished = Runner::new(ctx, FUNCTION)
                .run("generate", |run_id| generate_run(ctx, run_id, brief))
                .await?;
            Ok(finished.response())
        }
        "list" => {
            let limit = request::u32_in(body, "limit", 1..=100, 20)?;
            let playbooks = ctx.store.list_insights(Some(FUNCTION), limit as usize).await?;
            Ok(json!({ "count": playbooks.len(), "playbooks": playbooks }))
        }
        other => Err(unknown_action(FUNCTION, other).into()),
    }
}

async fn generate_run(
    ctx: &AgentContext,
    run_id: EntityId,
    brief: PlaybookBrief,
) -> RaveResult<RunCompletion> {
    let tables = ctx.store.table_stats().await?;
    let vars = PromptVars::new()
        .text("goal", brief.goal.as_str())
        .text("audience", brief.audience.as_deref().unwrap_or("general readers"))
        .text("horizon_days", brief.horizon_days.to_string())
        .list("constraints", &brief.constraints)
        .json("table_stats", &tables)?;
    let user = prompts::playbook().render_strict(&vars)?;
    let request = ctx.chat_request(prompts::STRATEGIST_SYSTEM, user);

    let fanout = ctx.fan_out();
    let spec = OpinionSpec::field("priority").with_lists(&["steps", "risks", "metrics"]);
    let consensus = ask_for_consensus(&fanout, &request, &spec).await?;

    let level = priority(&consensus.recommendation);
    let list = |key: &str| consensus.supplementary.get(key).cloned().unwrap_or_default();
    let summary = consensus
        .payload
        .get("summary")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} priority playbook: {}", level, brief.goal));
    let playbook = json!({
        "goal": brief.goal,
        "priority": level,
        "confidence": consensus.confidence,
        "summary": summary,
        "steps": list("steps"),
        "risks": list("risks"),
        "metrics": list("metrics"),
        "agreement": consensus.agreement,
        "contributors": consensus.contributors,
    });

    let insight = Insight::new(
        run_id,
        FUNCTION,
        InsightKind::Playbook,
        consensus.model_label(),
        consensus.confidence,
        summary,
        json!({ "brief": brief, "tables": tables }),
        playbook.clone(),
    );

    let mut result = playbook;
    if let Value::Object(map) = &mut result {
        map.insert("failures".to_string(), json!(consensus.failures));
    }
    Ok(RunCompletion::completed(result)
        .with_stats(json!({
            "providers": fanout.providers().len(),
            "succeeded": consensus.contributors.len(),
            "failed": consensus.failures.len(),
            "horizon_days": brief.horizon_days,
        }))
        .with_insight(insight))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, mock};
    use rave_core::{LlmError, ProviderKind};
    use rave_storage::AgentStore;
    use rave_test_utils::assertions::assert_validation_error;
    use rave_test_utils::{fixtures, InMemoryStore, MockProvider};
    use std::sync::Arc;

    #[test]
    fn test_priority_mapping() {
        assert_eq!(priority(" HIGH"), "high");
        assert_eq!(priority("low"), "low");
        assert_eq!(priority("urgent"), "medium");
    }

    #[tokio::test]
    async fn test_generate_votes_priority_and_unions_steps() {
        let store = fixtures::seeded_store();
        let openai = mock(
            ProviderKind::OpenAi,
            r#"Plan: {"priority": "high", "confidence": 0.6, "steps": ["Audit Detroit labels", "Commission label bios"], "risks": ["Thin sources"]}"#,
        );
        let ctx = context(
            store.clone(),
            &[
                openai.clone(),
                mock(ProviderKind::Anthropic, r#"{"priority": "High", "confidence": 0.8, "summary": "Fill the label gaps", "steps": ["audit detroit labels"], "metrics": ["Label pages per week"]}"#),
                mock(ProviderKind::Gemini, r#"{"priority": "low", "confidence": 0.95, "steps": ["Wait"]}"#),
            ],
        );
        let body = json!({
            "action": "generate",
            "goal": "Grow the label archive",
            "constraints": ["No paid promotion"],
            "horizon_days": 14,
        });
        let response = handle(&ctx, "generate", &body).await.unwrap();

        assert_eq!(response["priority"], "high");
        assert_eq!(response["agreement"], "majority");
        assert!((response["confidence"].as_f64().unwrap() - 0.7).abs() < 1e-9);
        assert_eq!(response["summary"], "Fill the label gaps");
        assert_eq!(
            response["steps"],
            json!(["Audit Detroit labels", "Commission label bios", "Wait"])
        );
        assert_eq!(response["metrics"], json!(["Label pages per week"]));
        assert_eq!(response["status"], "completed");

        let prompt = &openai.requests()[0].user;
        assert!(prompt.starts_with("Draft a 14-day playbook"));
        assert!(prompt.contains("Audience: general readers"));
        assert!(prompt.contains("- No paid promotion"));
        assert!(prompt.contains("canonical_artists"));

        let insight = &store.list_insights(Some(FUNCTION), 1).await.unwrap()[0];
        assert_eq!(insight.kind, InsightKind::Playbook);
        assert_eq!(insight.result["priority"], "high");
        assert_eq!(insight.data_snapshot["brief"]["horizon_days"], 14);
    }

    #[tokio::test]
    async fn test_unknown_priority_falls_back_to_medium() {
        let ctx = context(
            InMemoryStore::new(),
            &[mock(ProviderKind::Groq, r#"{"priority": "asap", "confidence": 0.5}"#)],
        );
        let response = handle(&ctx, "generate", &json!({"goal": "Cover more venues"}))
            .await
            .unwrap();
        assert_eq!(response["priority"], "medium");
        assert_eq!(response["summary"], "medium priority playbook: Cover more venues");
        assert_eq!(response["steps"], json!([]));
    }

    #[tokio::test]
    async fn test_generate_validates_brief() {
        let ctx = context(InMemoryStore::new(), &[]);
        assert_validation_error(&handle(&ctx, "generate", &json!({"audience": "DJs"})).await);
        assert_validation_error(
            &handle(&ctx, "generate", &json!({"goal": "x", "horizon_days": 0})).await,
        );
        assert_validation_error(
            &handle(&ctx, "generate", &json!({"goal": "x", "constraints": "none"})).await,
        );
    }

    #[tokio::test]
    async fn test_failed_generate_leaves_no_playbook() {
        let store = InMemoryStore::new();
        let ctx = context(
            store.clone(),
            &[Arc::new(MockProvider::failing(
                ProviderKind::OpenAi,
                LlmError::Network {
                    provider: ProviderKind::OpenAi,
                    message: "connection refused".to_string(),
                },
            ))],
        );
        assert!(handle(&ctx, "generate", &json!({"goal": "Grow"})).await.is_err());

        let listed = handle(&ctx, "list", &json!({})).await.unwrap();
        assert_eq!(listed["count"], 0);
        assert_eq!(store.run_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_returns_newest_playbooks_first() {
        let store = InMemoryStore::new();
        let ctx = context(
            store.clone(),
            &[mock(ProviderKind::OpenAi, r#"{"priority": "low", "confidence": 0.4}"#)],
        );
        for goal in ["First goal", "Second goal"] {
            handle(&ctx, "generate", &json!({ "goal": goal })).await.unwrap();
        }

        let listed = handle(&ctx, "list", &json!({"limit": 1})).await.unwrap();
        assert_eq!(listed["count"], 1);
        assert_eq!(listed["playbooks"][0]["result"]["goal"], "Second goal");
    }
}
