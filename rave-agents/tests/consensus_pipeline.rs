//! End-to-end: prompt, fan-out, extraction, merge and persistence through
//! the public `invoke` entry point.

use rave_agents::{function_by_name, invoke, AgentContext};
use rave_core::{AgentFunction, InsightKind, LlmError, ProviderKind, RunStatus};
use rave_llm::{PromptTemplate, PromptVars};
use rave_storage::AgentStore;
use rave_test_utils::assertions::assert_all_providers_failed;
use rave_test_utils::{fixtures, registry_of, InMemoryStore, MockProvider};
use serde_json::json;
use std::sync::Arc;

fn context(store: &InMemoryStore, mocks: &[Arc<MockProvider>]) -> AgentContext {
    AgentContext::new(
        Arc::new(store.clone()),
        registry_of(ProviderKind::OpenAi, mocks),
        Arc::new(fixtures::test_config()),
    )
}

#[tokio::test]
async fn test_extracted_object_is_persisted_verbatim() {
    assert_eq!(
        PromptTemplate::new("Count: {n}").render(&PromptVars::new().text("n", "42")),
        "Count: 42"
    );

    let store = InMemoryStore::new();
    let ctx = context(
        &store,
        &[Arc::new(MockProvider::replying(ProviderKind::OpenAi, "Sure! {\"count\": 42}"))],
    );
    let function = function_by_name("research-book-metadata").unwrap();
    invoke(&ctx, function, &json!({"action": "research", "title": "Counting"}))
        .await
        .unwrap();

    let insights = store.list_insights(Some(function), 10).await.unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].kind, InsightKind::BookMetadata);
    assert_eq!(insights[0].result, json!({"count": 42}));
}

#[tokio::test]
async fn test_one_rejecting_provider_does_not_block_the_merge() {
    let store = InMemoryStore::new();
    let ctx = context(
        &store,
        &[
            Arc::new(MockProvider::replying(
                ProviderKind::OpenAi,
                r#"{"recommendation": "approve", "confidence": 0.7}"#,
            )),
            Arc::new(MockProvider::failing(
                ProviderKind::Anthropic,
                LlmError::Http {
                    provider: ProviderKind::Anthropic,
                    status: 529,
                    body: "Overloaded".to_string(),
                },
            )),
            Arc::new(MockProvider::replying(
                ProviderKind::Gemini,
                r#"{"recommendation": "approve", "confidence": 0.9}"#,
            )),
        ],
    );
    let response = invoke(
        &ctx,
        AgentFunction::YoutubeChannelCurator,
        &json!({"action": "evaluate", "channel_title": "HÖR Berlin"}),
    )
    .await
    .unwrap();

    assert_eq!(response["recommendation"], "approve");
    assert!((response["confidence"].as_f64().unwrap() - 0.8).abs() < 1e-9);
    let failures = response["failures"].as_array().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["provider"], "anthropic");
    assert!(failures[0]["message"].as_str().unwrap().contains("Overloaded"));
}

#[tokio::test]
async fn test_every_provider_failing_is_reported_and_recorded() {
    let store = InMemoryStore::new();
    let mocks: Vec<Arc<MockProvider>> = ProviderKind::ALL
        .iter()
        .map(|kind| {
            Arc::new(MockProvider::failing(
                *kind,
                LlmError::Network {
                    provider: *kind,
                    message: "connection refused".to_string(),
                },
            ))
        })
        .collect();
    let ctx = context(&store, &mocks);
    let result = invoke(
        &ctx,
        AgentFunction::YoutubeChannelCurator,
        &json!({"action": "evaluate", "channel_title": "Anything"}),
    )
    .await;

    assert_eq!(assert_all_providers_failed(&result), ProviderKind::ALL.len());
    let runs = store.list_runs(5).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(store.list_insights(None, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unconfigured_vendors_name_their_missing_keys() {
    let store = InMemoryStore::new();
    let mocks: Vec<Arc<MockProvider>> = [ProviderKind::OpenAi, ProviderKind::Groq]
        .iter()
        .map(|kind| Arc::new(MockProvider::replying(*kind, "{}").unconfigured()))
        .collect();
    let ctx = context(&store, &mocks);
    let result = invoke(
        &ctx,
        AgentFunction::ArtistDbArchitect,
        &json!({"action": "analyze"}),
    )
    .await;

    assert_eq!(assert_all_providers_failed(&result), 2);
    let message = result.unwrap_err().to_string();
    assert!(message.contains("No API key configured for openai"));
    assert!(message.contains("No API key configured for groq"));
}
