//! doggy-analytics-insights
//!
//! Issue detection is deterministic and runs before any provider call; the
//! providers only judge the overall picture.

use crate::runner::Runner;
use crate::{prompts, request, unknown_action, AgentContext};
use rave_core::{
    AgentFunction, DoggyStats, EntityId, ExtractionError, Insight, InsightKind, Issue,
    IssueSeverity, RaveResult, RunCompletion, ValidationError,
};
use rave_llm::pipeline::{read_confidence, read_strings};
use rave_llm::{ask_for_consensus, call_with_timeout, extract_object, OpinionSpec, ParseResult, PromptVars};
use serde_json::{json, Value};

pub const ACTIONS: &[&str] = &["analyze", "daily-summary", "apply-fix", "issues"];

const FUNCTION: AgentFunction = AgentFunction::DoggyAnalyticsInsights;

pub const LOW_SHARE_RATE: &str = "low_share_rate";
pub const ZERO_DOWNLOADS: &str = "zero_downloads";
pub const TRAFFIC_DROP: &str = "traffic_drop";

/// Day-over-day view loss that counts as a drop.
const DROP_RATIO: f64 = 0.5;
/// View loss beyond which a drop is critical.
const CRITICAL_DROP_RATIO: f64 = 0.8;

#[tracing::instrument(skip(ctx, body), fields(function = %FUNCTION))]
pub async fn handle(ctx: &AgentContext, action: &str, body: &Value) -> RaveResult<Value> {
    match action {
        "analyze" => {
            let days = request::u32_in(body, "days", 1..=90, 7)?;
            analyze(ctx, days).await
        }
        "daily-summary" => {
            let days = request::u32_in(body, "days", 1..=7, 1)?;
            daily_summary(ctx, days).await
        }
        "apply-fix" => {
            let issue_id = request::required_id(body, "issue_id")?;
            let version = request::required_i64(body, "version")?;
            let issue = ctx.store.apply_issue_fix(issue_id, version).await?;
            tracing::info!(%issue_id, version = issue.version, "issue fix applied");
            Ok(json!({ "issue": issue }))
        }
        "issues" => {
            let open_only = request::optional_bool(body, "open_only", true)?;
            let issues = ctx.store.list_issues(open_only).await?;
            Ok(json!({ "count": issues.len(), "issues": issues }))
        }
        other => Err(unknown_action(FUNCTION, other).into()),
    }
}

// ============================================================================
// ISSUE DETECTION
// ============================================================================

/// Issues visible in `stats` (oldest first).
///
/// * `low_share_rate`: shares / views over the window below `share_rate_floor`
/// * `zero_downloads`: a day with views but no downloads
/// * `traffic_drop`: views fell by more than half from the previous day
pub fn detect_issues(run_id: EntityId, stats: &[DoggyStats], share_rate_floor: f64) -> Vec<Issue> {
    let mut issues = Vec::new();

    let views: i64 = stats.iter().map(|d| d.views).sum();
    let shares: i64 = stats.iter().map(|d| d.shares).sum();
    if views > 0 {
        let rate = shares as f64 / views as f64;
        if rate < share_rate_floor {
            issues.push(Issue::new(
                run_id,
                LOW_SHARE_RATE,
                IssueSeverity::Medium,
                format!(
                    "Share rate {:.2}% over {} day(s) is below the {:.2}% floor",
                    rate * 100.0,
                    stats.len(),
                    share_rate_floor * 100.0
                ),
                true,
            ));
        }
    }

    for day in stats.iter().filter(|d| d.views > 0 && d.downloads == 0) {
        issues.push(Issue::new(
            run_id,
            ZERO_DOWNLOADS,
            IssueSeverity::High,
            format!("{}: {} views but no downloads", day.day, day.views),
            false,
        ));
    }

    for pair in stats.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if prev.views <= 0 {
            continue;
        }
        let loss = 1.0 - cur.views as f64 / prev.views as f64;
        if loss > DROP_RATIO {
            let severity = if loss > CRITICAL_DROP_RATIO {
                IssueSeverity::Critical
            } else {
                IssueSeverity::High
            };
            issues.push(Issue::new(
                run_id,
                TRAFFIC_DROP,
                severity,
                format!(
                    "{}: views fell {:.0}% ({} -> {})",
                    cur.day,
                    loss * 100.0,
                    prev.views,
                    cur.views
                ),
                false,
            ));
        }
    }

    issues
}

// ============================================================================
// ANALYZE
// ============================================================================

async fn analyze(ctx: &AgentContext, days: u32) -> RaveResult<Value> {
    let finished = Runner::new(ctx, FUNCTION)
        .run("analyze", |run_id| analyze_run(ctx, run_id, days))
        .await?;
    Ok(finished.response())
}

async fn analyze_run(ctx: &AgentContext, run_id: EntityId, days: u32) -> RaveResult<RunCompletion> {
    let stats = ctx.store.doggy_stats(days).await?;
    if stats.is_empty() {
        tracing::info!(days, "no doggy stats recorded");
        return Ok(RunCompletion::completed(json!({ "days": 0, "issue_count": 0 }))
            .with_stats(json!({ "days": 0, "providers": 0 })));
    }

    let issues = detect_issues(run_id, &stats, ctx.config.share_rate_floor);
    let issue_lines: Vec<String> = issues
        .iter()
        .map(|i| format!("[{}] {}: {}", i.severity, i.code, i.description))
        .collect();
    let vars = PromptVars::new()
        .text("days", stats.len().to_string())
        .json("stats", &stats)?
        .list("issues", &issue_lines);
    let user = prompts::doggy_analysis().render_strict(&vars)?;
    let request = ctx.chat_request(prompts::ANALYST_SYSTEM, user);

    let fanout = ctx.fan_out();
    let spec = OpinionSpec::field("recommendation").with_lists(&["actions"]);
    let consensus = ask_for_consensus(&fanout, &request, &spec).await?;

    let verdict = consensus.recommendation.to_lowercase();
    let actions = consensus.supplementary.get("actions").cloned().unwrap_or_default();
    let summary = consensus
        .payload
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or(&verdict)
        .to_string();
    let codes: Vec<&str> = issues.iter().map(|i| i.code.as_str()).collect();

    let insight = Insight::new(
        run_id,
        FUNCTION,
        InsightKind::Analysis,
        consensus.model_label(),
        consensus.confidence,
        summary,
        json!({ "stats": stats, "detected": codes }),
        json!({
            "recommendation": verdict,
            "confidence": consensus.confidence,
            "agreement": consensus.agreement,
            "actions": actions,
            "contributors": consensus.contributors,
        }),
    );
    let result = json!({
        "days": stats.len(),
        "recommendation": verdict,
        "confidence": consensus.confidence,
        "agreement": consensus.agreement,
        "actions": actions,
        "failures": consensus.failures,
        "issue_count": issues.len(),
    });
    Ok(RunCompletion::completed(result)
        .with_stats(json!({
            "days": stats.len(),
            "providers": fanout.providers().len(),
            "succeeded": consensus.contributors.len(),
            "failed": consensus.failures.len(),
        }))
        .with_insight(insight)
        .with_issues(issues))
}

// ============================================================================
// DAILY SUMMARY
// ============================================================================

async fn daily_summary(ctx: &AgentContext, days: u32) -> RaveResult<Value> {
    let finished = Runner::new(ctx, FUNCTION)
        .run("daily-summary", |run_id| daily_summary_run(ctx, run_id, days))
        .await?;
    Ok(finished.response())
}

async fn daily_summary_run(ctx: &AgentContext, run_id: EntityId, days: u32) -> RaveResult<RunCompletion> {
    let stats = ctx.store.doggy_stats(days).await?;
    if stats.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "days".to_string(),
            reason: "no stats recorded for the requested window".to_string(),
        }
        .into());
    }

    let vars = PromptVars::new()
        .text("days", stats.len().to_string())
        .json("stats", &stats)?;
    let user = prompts::daily_summary().render_strict(&vars)?;
    let request = ctx.chat_request(prompts::ANALYST_SYSTEM, user);
    let primary = ctx.primary()?;
    let completion = call_with_timeout(primary.as_ref(), &request, ctx.config.provider_timeout).await?;

    // Plain prose is accepted as the summary itself.
    let (summary, highlights, confidence) = match extract_object(&completion.text) {
        ParseResult::Ok(object) => {
            let summary = object
                .get("summary")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ExtractionError::Malformed {
                    raw: completion.text.clone(),
                    reason: "reply has no 'summary' string".to_string(),
                })?
                .to_string();
            (
                summary,
                read_strings(object.get("highlights")),
                read_confidence(object.get("confidence")),
            )
        }
        ParseResult::NotFound => (completion.text.trim().to_string(), Vec::new(), 0.0),
        ParseResult::Malformed { raw, reason } => {
            return Err(ExtractionError::Malformed { raw, reason }.into())
        }
    };

    let result = json!({ "summary": summary, "highlights": highlights });
    let insight = Insight::new(
        run_id,
        FUNCTION,
        InsightKind::DailySummary,
        completion.model.clone(),
        confidence,
        summary,
        json!({ "stats": stats }),
        result.clone(),
    )
    .expiring_after(ctx.config.insight_ttl);

    Ok(RunCompletion::completed(result)
        .with_stats(json!({ "days": stats.len(), "provider": completion.provider }))
        .with_insight(insight))
}
