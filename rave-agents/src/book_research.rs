//! research-book-metadata
//!
//! Providers vote with the ISBN they report, normalized to ISBN-13, so
//! replies that agree on the edition agree regardless of formatting.

use crate::normalize::{isbn_label, UNKNOWN_ISBN};
use crate::runner::Runner;
use crate::{prompts, request, unknown_action, AgentContext};
use rave_core::{AgentFunction, EntityId, Insight, InsightKind, RaveResult, RunCompletion};
use rave_llm::{ask_for_consensus, OpinionSpec, PromptVars};
use serde_json::{json, Value};

pub const ACTIONS: &[&str] = &["research"];

const FUNCTION: AgentFunction = AgentFunction::ResearchBookMetadata;

#[tracing::instrument(skip(ctx, body), fields(function = %FUNCTION))]
pub async fn handle(ctx: &AgentContext, action: &str, body: &Value) -> RaveResult<Value> {
    match action {
        "research" => {
            let title = request::required_str(body, "title")?;
            let author = request::optional_str(body, "author")?;
            let finished = Runner::new(ctx, FUNCTION)
                .run("research", |run_id| research_run(ctx, run_id, title, author))
                .await?;
            Ok(finished.response())
        }
        other => Err(unknown_action(FUNCTION, other).into()),
    }
}

async fn research_run(
    ctx: &AgentContext,
    run_id: EntityId,
    title: String,
    author: Option<String>,
) -> RaveResult<RunCompletion> {
    let vars = PromptVars::new()
        .text("title", title.as_str())
        .text("author", author.as_deref().unwrap_or("unknown"));
    let user = prompts::book_metadata().render_strict(&vars)?;
    let request = ctx.chat_request(prompts::LIBRARIAN_SYSTEM, user);

    let fanout = ctx.fan_out();
    let consensus = ask_for_consensus(&fanout, &request, &OpinionSpec::derived(isbn_label)).await?;

    let isbn = (consensus.recommendation != UNKNOWN_ISBN).then(|| consensus.recommendation.clone());
    let analysis = consensus
        .payload
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Metadata for \"{}\"", title));

    let insight = Insight::new(
        run_id,
        FUNCTION,
        InsightKind::BookMetadata,
        consensus.model_label(),
        consensus.confidence,
        analysis,
        json!({ "title": title, "author": author }),
        consensus.payload.clone(),
    );
    let result = json!({
        "metadata": consensus.payload,
        "isbn": isbn,
        "confidence": consensus.confidence,
        "agreement": consensus.agreement,
        "contributors": consensus.contributors,
        "failures": consensus.failures,
    });
    Ok(RunCompletion::completed(result)
        .with_stats(json!({
            "providers": fanout.providers().len(),
            "succeeded": consensus.contributors.len(),
            "failed": consensus.failures.len(),
        }))
        .with_insight(insight))
}
