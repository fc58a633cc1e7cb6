//! youtube-channel-curator

use crate::runner::Runner;
use crate::{prompts, request, unknown_action, AgentContext};
use rave_core::{AgentFunction, EntityId, Insight, InsightKind, RaveResult, RunCompletion};
use rave_llm::{ask_for_consensus, OpinionSpec, PromptVars};
use serde::Serialize;
use serde_json::{json, Value};

pub const ACTIONS: &[&str] = &["evaluate"];

const FUNCTION: AgentFunction = AgentFunction::YoutubeChannelCurator;

/// Verdicts a curator can return. Anything else is treated as `review`.
pub const VERDICTS: &[&str] = &["approve", "reject", "review"];

#[derive(Debug, Clone, Serialize)]
pub struct ChannelSubmission {
    pub channel_title: String,
    pub channel_url: Option<String>,
    pub description: Option<String>,
    pub recent_videos: Vec<String>,
}

impl ChannelSubmission {
    pub fn from_body(body: &Value) -> RaveResult<Self> {
        Ok(Self {
            channel_title: request::required_str(body, "channel_title")?,
            channel_url: request::optional_str(body, "channel_url")?,
            description: request::optional_str(body, "description")?,
            recent_videos: request::string_list(body, "recent_videos")?,
        })
    }
}

/// Map a consensus label onto [`VERDICTS`].
pub fn verdict(label: &str) -> &'static str {
    let label = label.trim().to_lowercase();
    VERDICTS
        .iter()
        .find(|v| **v == label)
        .copied()
        .unwrap_or("review")
}

#[tracing::instrument(skip(ctx, body), fields(function = %FUNCTION))]
pub async fn handle(ctx: &AgentContext, action: &str, body: &Value) -> RaveResult<Value> {
    match action {
        "evaluate" => {
            let submission = ChannelSubmission::from_body(body)?;
            let finished = Runner::new(ctx, FUNCTION)
                .run("evaluate", |run_id| evaluate_run(ctx, run_id, submission))
                .await?;
            Ok(finished.response())
        }
        other => Err(unknown_action(FUNCTION, other).into()),
    }
}

async fn evaluate_run(
    ctx: &AgentContext,
    run_id: EntityId,
    submission: ChannelSubmission,
) -> RaveResult<RunCompletion> {
    let vars = PromptVars::new()
        .text("channel_title", submission.channel_title.as_str())
        .text("channel_url", submission.channel_url.as_deref().unwrap_or("not provided"))
        .text("description", submission.description.as_deref().unwrap_or("not provided"))
        .list("recent_videos", &submission.recent_videos);
    let user = prompts::channel_evaluation().render_strict(&vars)?;
    let request = ctx.chat_request(prompts::CURATOR_SYSTEM, user);

    let fanout = ctx.fan_out();
    let spec = OpinionSpec::field("recommendation").with_lists(&["pros", "cons"]);
    let consensus = ask_for_consensus(&fanout, &request, &spec).await?;

    let decision = verdict(&consensus.recommendation);
    let pros = consensus.supplementary.get("pros").cloned().unwrap_or_default();
    let cons = consensus.supplementary.get("cons").cloned().unwrap_or_default();
    let evaluation = json!({
        "recommendation": decision,
        "confidence": consensus.confidence,
        "pros": pros,
        "cons": cons,
        "agreement": consensus.agreement,
        "contributors": consensus.contributors,
    });

    let insight = Insight::new(
        run_id,
        FUNCTION,
        InsightKind::ChannelEvaluation,
        consensus.model_label(),
        consensus.confidence,
        format!("{}: {}", submission.channel_title, decision),
        json!(submission),
        evaluation.clone(),
    );

    let mut result = evaluation;
    if let Value::Object(map) = &mut result {
        map.insert("failures".to_string(), json!(consensus.failures));
    }
    Ok(RunCompletion::completed(result)
        .with_stats(json!({
            "providers": fanout.providers().len(),
            "succeeded": consensus.contributors.len(),
            "failed": consensus.failures.len(),
        }))
        .with_insight(insight))
}
