//! artist-db-architect
//!
//! Schema health review and cross-source duplicate detection between the
//! canonical artist table and the DJ directory.

use crate::normalize::artist_key;
use crate::runner::Runner;
use crate::{prompts, request, unknown_action, AgentContext};
use futures_util::stream::{self, StreamExt};
use rave_core::{
    AgentFunction, ArtistRecord, ArtistSource, EntityId, Insight, InsightKind, MergeCandidate,
    MergeStatus, RaveResult, RunCompletion,
};
use rave_llm::{
    ask_for_consensus, call_with_timeout, extract_as, ChatProvider, OpinionSpec, ParseResult,
    PromptVars,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const ACTIONS: &[&str] = &["analyze", "compare_dbs", "recommend", "resolve"];

const FUNCTION: AgentFunction = AgentFunction::ArtistDbArchitect;
const DEFAULT_MAX_PAIRS: u32 = 20;
const MAX_PAIRS_LIMIT: u32 = 200;
/// Pair checks in flight at once against the primary provider.
const PAIR_CONCURRENCY: usize = 4;

#[tracing::instrument(skip(ctx, body), fields(function = %FUNCTION))]
pub async fn handle(ctx: &AgentContext, action: &str, body: &Value) -> RaveResult<Value> {
    match action {
        "analyze" => analyze(ctx).await,
        "compare_dbs" => {
            let max_pairs = request::u32_in(body, "max_pairs", 1..=MAX_PAIRS_LIMIT, DEFAULT_MAX_PAIRS)?;
            compare_dbs(ctx, max_pairs as usize).await
        }
        "recommend" => recommend(ctx).await,
        "resolve" => {
            let candidate_id = request::required_id(body, "candidate_id")?;
            let approve = request::required_bool(body, "approve")?;
            resolve(ctx, candidate_id, approve).await
        }
        other => Err(unknown_action(FUNCTION, other).into()),
    }
}

// ============================================================================
// ANALYZE
// ============================================================================

async fn analyze(ctx: &AgentContext) -> RaveResult<Value> {
    let finished = Runner::new(ctx, FUNCTION)
        .run("analyze", |run_id| analyze_run(ctx, run_id))
        .await?;
    Ok(finished.response())
}

async fn analyze_run(ctx: &AgentContext, run_id: EntityId) -> RaveResult<RunCompletion> {
    let tables = ctx.store.table_stats().await?;
    let vars = PromptVars::new().json("table_stats", &tables)?;
    let user = prompts::schema_health().render_strict(&vars)?;
    let request = ctx.chat_request(prompts::DATA_ARCHITECT_SYSTEM, user);

    let fanout = ctx.fan_out();
    let spec = OpinionSpec::field("recommendation").with_lists(&["issues", "recommendations"]);
    let consensus = ask_for_consensus(&fanout, &request, &spec).await?;

    let health = consensus.recommendation.to_lowercase();
    let summary = consensus
        .payload
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or(&health)
        .to_string();
    let result = json!({
        "health": health,
        "confidence": consensus.confidence,
        "agreement": consensus.agreement,
        "issues": consensus.supplementary.get("issues").cloned().unwrap_or_default(),
        "recommendations": consensus.supplementary.get("recommendations").cloned().unwrap_or_default(),
        "contributors": consensus.contributors,
        "failures": consensus.failures,
    });
    let insight = Insight::new(
        run_id,
        FUNCTION,
        InsightKind::Analysis,
        consensus.model_label(),
        consensus.confidence,
        summary,
        json!({ "tables": tables }),
        result.clone(),
    );
    Ok(RunCompletion::completed(result)
        .with_stats(json!({
            "providers": fanout.providers().len(),
            "succeeded": consensus.contributors.len(),
            "failed": consensus.failures.len(),
        }))
        .with_insight(insight))
}

// ============================================================================
// COMPARE DBS
// ============================================================================

/// Pairs of records with the same matching key, canonical first, in key
/// order. Records whose key is empty never pair.
pub fn pair_by_name(
    canonical: &[ArtistRecord],
    directory: &[ArtistRecord],
) -> Vec<(ArtistRecord, ArtistRecord)> {
    let mut by_key: BTreeMap<String, (Vec<&ArtistRecord>, Vec<&ArtistRecord>)> = BTreeMap::new();
    for record in canonical {
        by_key.entry(artist_key(&record.name)).or_default().0.push(record);
    }
    for record in directory {
        by_key.entry(artist_key(&record.name)).or_default().1.push(record);
    }

    let mut pairs = Vec::new();
    for (key, (left, right)) in by_key {
        if key.is_empty() {
            continue;
        }
        for l in &left {
            for r in &right {
                pairs.push(((*l).clone(), (*r).clone()));
            }
        }
    }
    pairs
}

#[derive(Debug, Deserialize)]
struct SameArtistVerdict {
    same_artist: bool,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

enum PairOutcome {
    Same(MergeCandidate),
    Distinct,
    Skipped(String),
}

/// Ask the primary provider about one pair. Transport errors propagate;
/// an unreadable reply skips the pair.
async fn check_pair(
    ctx: &AgentContext,
    primary: &dyn ChatProvider,
    run_id: EntityId,
    left: &ArtistRecord,
    right: &ArtistRecord,
) -> RaveResult<PairOutcome> {
    let vars = PromptVars::new().json("left", left)?.json("right", right)?;
    let request = ctx.chat_request(prompts::CURATOR_SYSTEM, prompts::same_artist().render_strict(&vars)?);
    let completion = call_with_timeout(primary, &request, ctx.config.provider_timeout).await?;

    let pair = format!("{}/{}", left.record_id, right.record_id);
    Ok(match extract_as::<SameArtistVerdict>(&completion.text) {
        ParseResult::Ok(verdict) if verdict.same_artist => PairOutcome::Same(MergeCandidate::assess(
            run_id,
            left.as_source_record(),
            right.as_source_record(),
            verdict.confidence,
            verdict.reasoning,
            ctx.config.auto_merge_threshold,
        )),
        ParseResult::Ok(_) => PairOutcome::Distinct,
        ParseResult::NotFound => PairOutcome::Skipped(format!("{}: no JSON in reply", pair)),
        ParseResult::Malformed { reason, .. } => PairOutcome::Skipped(format!("{}: {}", pair, reason)),
    })
}

async fn compare_dbs(ctx: &AgentContext, max_pairs: usize) -> RaveResult<Value> {
    let finished = Runner::new(ctx, FUNCTION)
        .run("compare_dbs", |run_id| compare_dbs_run(ctx, run_id, max_pairs))
        .await?;

    let mut response = finished.response();
    if let Value::Object(body) = &mut response {
        body.insert("stats".to_string(), finished.run.stats.clone());
    }
    Ok(response)
}

async fn compare_dbs_run(ctx: &AgentContext, run_id: EntityId, max_pairs: usize) -> RaveResult<RunCompletion> {
    let canonical = ctx.store.list_artists(ArtistSource::Canonical).await?;
    let directory = ctx.store.list_artists(ArtistSource::DjDirectory).await?;
    let pairs = pair_by_name(&canonical, &directory);
    let primary = ctx.primary()?;

    let outcomes: Vec<RaveResult<PairOutcome>> = stream::iter(pairs.iter().take(max_pairs))
        .map(|(left, right)| check_pair(ctx, primary.as_ref(), run_id, left, right))
        .boxed()
        .buffered(PAIR_CONCURRENCY)
        .collect()
        .await;

    let mut candidates = Vec::new();
    let mut distinct = 0usize;
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome? {
            PairOutcome::Same(candidate) => candidates.push(candidate),
            PairOutcome::Distinct => distinct += 1,
            PairOutcome::Skipped(reason) => {
                tracing::warn!(%reason, "pair skipped");
                skipped.push(reason);
            }
        }
    }
    let auto_merged = candidates
        .iter()
        .filter(|c| c.status == MergeStatus::AutoMerged)
        .count();

    let stats = json!({
        "canonical": canonical.len(),
        "dj_directory": directory.len(),
        "pairs_found": pairs.len(),
        "pairs_checked": pairs.len().min(max_pairs),
        "candidates": candidates.len(),
        "auto_merged": auto_merged,
        "pending": candidates.len() - auto_merged,
        "distinct": distinct,
        "skipped": skipped.len(),
    });
    Ok(RunCompletion::completed(json!({ "skipped_pairs": skipped }))
        .with_stats(stats)
        .with_merge_candidates(candidates))
}

// ============================================================================
// REVIEW
// ============================================================================

async fn recommend(ctx: &AgentContext) -> RaveResult<Value> {
    let pending = ctx
        .store
        .list_merge_candidates(Some(MergeStatus::Pending))
        .await?;
    Ok(json!({ "count": pending.len(), "candidates": pending }))
}

async fn resolve(ctx: &AgentContext, candidate_id: EntityId, approve: bool) -> RaveResult<Value> {
    let candidate = ctx.store.resolve_merge_candidate(candidate_id, approve).await?;
    tracing::info!(%candidate_id, status = %candidate.status, "merge candidate resolved");
    Ok(json!({ "candidate": candidate }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, mock};
    use rave_core::{EntityKind, LlmError, ProviderKind, RaveError, RunStatus};
    use rave_storage::AgentStore;
    use rave_test_utils::assertions::{assert_invalid_state, assert_not_found};
    use rave_test_utils::{fixtures, MockProvider};
    use std::sync::Arc;

    #[test]
    fn test_pair_by_name_matches_across_spellings() {
        let pairs = pair_by_name(&fixtures::canonical_artists(), &fixtures::dj_artists());
        let ids: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(l, r)| (l.record_id.as_str(), r.record_id.as_str()))
            .collect();
        assert_eq!(ids, vec![("c-002", "d-102"), ("c-001", "d-101")]);
    }

    #[tokio::test]
    async fn test_compare_dbs_auto_merges_above_threshold() {
        let store = fixtures::seeded_store();
        let primary = Arc::new(MockProvider::replying(
            ProviderKind::OpenAi,
            r#"Looks like it: {"same_artist": true, "confidence": 0.95, "reasoning": "same name"}"#,
        ));
        let ctx = context(store.clone(), &[primary.clone()]);

        let response = invoke_compare(&ctx, json!({"action": "compare_dbs"})).await.unwrap();
        assert_eq!(response["stats"]["pairs_found"], 2);
        assert_eq!(response["stats"]["candidates"], 2);
        assert_eq!(response["stats"]["auto_merged"], 2);
        assert_eq!(response["merge_candidates"].as_array().unwrap().len(), 2);
        assert_eq!(primary.calls(), 2);

        let merged = store
            .list_merge_candidates(Some(MergeStatus::AutoMerged))
            .await
            .unwrap();
        assert_eq!(merged.len(), 2);
        assert!(store
            .list_merge_candidates(Some(MergeStatus::Pending))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_compare_dbs_same_artist_false_is_not_a_candidate() {
        let store = fixtures::seeded_store();
        let ctx = context(
            store.clone(),
            &[mock(ProviderKind::OpenAi, r#"{"same_artist": false, "confidence": 0.9}"#)],
        );
        let response = handle(&ctx, "compare_dbs", &json!({})).await.unwrap();
        assert_eq!(response["stats"]["distinct"], 2);
        assert_eq!(response["stats"]["candidates"], 0);
    }

    #[tokio::test]
    async fn test_compare_dbs_counts_unextractable_pairs_as_skipped() {
        let store = fixtures::seeded_store();
        let ctx = context(
            store.clone(),
            &[mock(ProviderKind::OpenAi, "I cannot tell, sorry.")],
        );
        let response = invoke_compare(&ctx, json!({"action": "compare_dbs", "max_pairs": 1}))
            .await
            .unwrap();
        assert_eq!(response["stats"]["pairs_checked"], 1);
        assert_eq!(response["stats"]["skipped"], 1);
        assert_eq!(response["status"], "completed");
        assert!(store.list_merge_candidates(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compare_dbs_provider_failure_fails_the_run() {
        let store = fixtures::seeded_store();
        let failing = Arc::new(MockProvider::failing(
            ProviderKind::OpenAi,
            LlmError::Http {
                provider: ProviderKind::OpenAi,
                status: 500,
                body: "boom".to_string(),
            },
        ));
        let ctx = context(store.clone(), &[failing]);
        let result = invoke_compare(&ctx, json!({"action": "compare_dbs"})).await;
        assert!(matches!(result, Err(RaveError::Llm(LlmError::Http { status: 500, .. }))));
        let runs = store.list_runs(1).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_analyze_merges_provider_votes() {
        let store = fixtures::seeded_store();
        let ctx = context(
            store.clone(),
            &[
                mock(ProviderKind::OpenAi, r#"{"recommendation": "healthy", "confidence": 0.7, "issues": []}"#),
                mock(ProviderKind::Anthropic, r#"{"recommendation": "Healthy", "confidence": 0.9, "recommendations": ["add index"]}"#),
                mock(ProviderKind::Gemini, "no opinion"),
            ],
        );
        let response = handle(&ctx, "analyze", &json!({})).await.unwrap();
        assert_eq!(response["health"], "healthy");
        assert_eq!(response["agreement"], "unanimous");
        assert!((response["confidence"].as_f64().unwrap() - 0.8).abs() < 1e-9);
        assert_eq!(response["failures"].as_array().unwrap().len(), 1);
        assert_eq!(response["recommendations"], json!(["add index"]));

        let insights = store.list_insights(Some(FUNCTION), 10).await.unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].kind, InsightKind::Analysis);
        assert!(insights[0].model.starts_with("consensus("));
    }

    #[tokio::test]
    async fn test_recommend_and_resolve() {
        let store = fixtures::seeded_store();
        let ctx = context(
            store.clone(),
            &[mock(
                ProviderKind::OpenAi,
                r#"{"same_artist": true, "confidence": 0.5, "reasoning": "maybe"}"#,
            )],
        );
        handle(&ctx, "compare_dbs", &json!({})).await.unwrap();

        let recommended = handle(&ctx, "recommend", &json!({})).await.unwrap();
        assert_eq!(recommended["count"], 2);
        let id = recommended["candidates"][0]["candidate_id"].as_str().unwrap().to_string();

        let resolved = handle(&ctx, "resolve", &json!({"candidate_id": id, "approve": false}))
            .await
            .unwrap();
        assert_eq!(resolved["candidate"]["status"], "rejected");

        let again = handle(&ctx, "resolve", &json!({"candidate_id": id, "approve": true})).await;
        assert_invalid_state(&again);

        let missing = handle(
            &ctx,
            "resolve",
            &json!({"candidate_id": rave_core::new_entity_id().to_string(), "approve": true}),
        )
        .await;
        assert_not_found(&missing, EntityKind::MergeCandidate);
    }

    async fn invoke_compare(ctx: &AgentContext, body: Value) -> RaveResult<Value> {
        handle(ctx, request::action(&body), &body).await
    }
}
