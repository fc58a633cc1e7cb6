//! HTTP-level tests for the RAVE API, driven through `oneshot`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use rave_agents::AgentContext;
use rave_api::{create_api_router, ApiConfig, AppState};
use rave_core::{AgentFunction, AgentRun, Issue, IssueSeverity, LlmError, ProviderKind, RunCompletion};
use rave_storage::AgentStore;
use rave_test_utils::{fixtures, registry_of, InMemoryStore, MockProvider};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

// ============================================================================
// HELPERS
// ============================================================================

fn app_with(store: &InMemoryStore, mocks: &[Arc<MockProvider>]) -> Router {
    let ctx = AgentContext::new(
        Arc::new(store.clone()),
        registry_of(ProviderKind::OpenAi, mocks),
        Arc::new(fixtures::test_config()),
    );
    create_api_router(AppState::new(ctx), &ApiConfig::default())
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn seed_issue(store: &InMemoryStore) -> Issue {
    let run = AgentRun::start(AgentFunction::DoggyAnalyticsInsights, "analyze");
    let issue = Issue::new(
        run.run_id,
        "low_share_rate",
        IssueSeverity::Medium,
        "Share rate fell below the floor",
        true,
    );
    store.begin_run(&run).await.unwrap();
    store
        .complete_run(
            run.run_id,
            RunCompletion::completed(json!({})).with_issues(vec![issue.clone()]),
        )
        .await
        .unwrap();
    issue
}

// ============================================================================
// FUNCTIONS
// ============================================================================

#[tokio::test]
async fn test_evaluate_returns_success_envelope() {
    let store = InMemoryStore::new();
    let app = app_with(
        &store,
        &[Arc::new(MockProvider::replying(
            ProviderKind::OpenAi,
            r#"Verdict: {"recommendation": "approve", "confidence": 0.85, "pros": ["Rare live sets"]}"#,
        ))],
    );
    let (status, body) = send(
        app,
        post(
            "/functions/v1/youtube-channel-curator",
            r#"{"action": "evaluate", "channel_title": "Awakenings"}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["recommendation"], "approve");
    assert_eq!(body["status"], "completed");
    assert!(body["run_id"].is_string());
    assert_eq!(store.run_count().unwrap(), 1);
}

#[tokio::test]
async fn test_unknown_function_is_not_found() {
    let app = app_with(&InMemoryStore::new(), &[]);
    let (status, body) = send(app, post("/functions/v1/spotify-sync", r#"{"action": "run"}"#)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "FUNCTION_NOT_FOUND");
    let valid = body["details"]["valid_functions"].as_array().unwrap();
    assert!(valid.contains(&json!("agent-runs")));
}

#[tokio::test]
async fn test_missing_action_lists_valid_actions() {
    let app = app_with(&InMemoryStore::new(), &[]);
    let (status, body) = send(app, post("/functions/v1/youtube-channel-curator", "")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "UNKNOWN_ACTION");
    assert_eq!(body["details"]["valid_actions"], json!(["evaluate"]));
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = app_with(&InMemoryStore::new(), &[]);
    let (status, body) = send(app, post("/functions/v1/agent-runs", "{action: list")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
    assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON"));
}

#[tokio::test]
async fn test_missing_field_names_the_field() {
    let app = app_with(&InMemoryStore::new(), &[]);
    let (status, body) = send(
        app,
        post("/functions/v1/research-book-metadata", r#"{"action": "research"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_FIELD");
    assert_eq!(body["details"]["field"], "title");
}

#[tokio::test]
async fn test_all_providers_failing_is_a_bad_gateway() {
    let store = InMemoryStore::new();
    let app = app_with(
        &store,
        &[
            Arc::new(MockProvider::failing(
                ProviderKind::OpenAi,
                LlmError::Http {
                    provider: ProviderKind::OpenAi,
                    status: 429,
                    body: "Rate limit reached".to_string(),
                },
            )),
            Arc::new(MockProvider::failing(
                ProviderKind::Anthropic,
                LlmError::Network {
                    provider: ProviderKind::Anthropic,
                    message: "connection reset".to_string(),
                },
            )),
        ],
    );
    let (status, body) = send(
        app,
        post(
            "/functions/v1/research-book-metadata",
            r#"{"action": "research", "title": "Techno Rebels"}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "ALL_PROVIDERS_FAILED");
    let failures = body["details"]["failures"].as_array().unwrap();
    assert_eq!(failures.len(), 2);
    assert!(body["error"].as_str().unwrap().contains("Rate limit reached"));
    assert!(body["error"].as_str().unwrap().contains("connection reset"));
}

#[tokio::test]
async fn test_apply_fix_version_conflict_then_success() {
    let store = InMemoryStore::new();
    let issue = seed_issue(&store).await;

    let stale = json!({"action": "apply-fix", "issue_id": issue.issue_id, "version": 7}).to_string();
    let (status, body) = send(
        app_with(&store, &[]),
        post("/functions/v1/doggy-analytics-insights", &stale),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "VERSION_CONFLICT");
    assert_eq!(body["details"]["actual"], 1);

    let current = json!({"action": "apply-fix", "issue_id": issue.issue_id, "version": 1}).to_string();
    let (status, body) = send(
        app_with(&store, &[]),
        post("/functions/v1/doggy-analytics-insights", &current),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["issue"]["fix_applied"], true);
    assert_eq!(body["issue"]["version"], 2);
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    let app = app_with(&InMemoryStore::new(), &[]);
    let request = json!({"action": "get", "run_id": "0190f5c2-8b1a-7cc3-9a57-0d6a3e1f2b4c"}).to_string();
    let (status, body) = send(app, post("/functions/v1/agent-runs", &request)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "ENTITY_NOT_FOUND");
}

#[tokio::test]
async fn test_catalog_lists_every_function() {
    let app = app_with(&InMemoryStore::new(), &[]);
    let (status, body) = send(app, get("/functions/v1")).await;

    assert_eq!(status, StatusCode::OK);
    let functions = body["functions"].as_array().unwrap();
    assert_eq!(functions.len(), AgentFunction::ALL.len());
    let doggy = functions
        .iter()
        .find(|f| f["name"] == "doggy-analytics-insights")
        .unwrap();
    assert_eq!(
        doggy["actions"],
        json!(["analyze", "daily-summary", "apply-fix", "issues"])
    );
    let playbook = functions
        .iter()
        .find(|f| f["name"] == "playbook-agent")
        .unwrap();
    assert_eq!(playbook["actions"], json!(["generate", "list"]));
}

// ============================================================================
// CORS
// ============================================================================

#[tokio::test]
async fn test_preflight_is_permissive() {
    let app = app_with(&InMemoryStore::new(), &[]);
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/functions/v1/agent-runs")
        .header(header::ORIGIN, "https://rave-kb.dev")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_plain_options_is_answered() {
    let app = app_with(&InMemoryStore::new(), &[]);
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/functions/v1/agent-runs")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// HEALTH & METRICS
// ============================================================================

#[tokio::test]
async fn test_ready_lists_configured_providers() {
    let app = app_with(
        &InMemoryStore::new(),
        &[
            Arc::new(MockProvider::replying(ProviderKind::Groq, "{}")),
            Arc::new(MockProvider::replying(ProviderKind::Gemini, "{}").unconfigured()),
        ],
    );
    let (status, body) = send(app, get("/health/ready")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["providers"]["configured"], json!(["groq"]));
    assert_eq!(body["providers"]["primary"], "openai");
    assert_eq!(body["providers"]["primary_configured"], false);
    assert_eq!(body["store"]["reachable"], true);
}

#[tokio::test]
async fn test_ready_without_providers_is_degraded() {
    let app = app_with(&InMemoryStore::new(), &[]);
    let (status, body) = send(app, get("/health/ready")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_metrics_expose_http_counters() {
    let app = app_with(&InMemoryStore::new(), &[]);
    let ping = app.clone().oneshot(get("/health/ping")).await.unwrap();
    assert_eq!(ping.status(), StatusCode::OK);

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("rave_http_requests_total"));
    assert!(text.contains("/health/ping"));
}

#[tokio::test]
async fn test_metrics_route_can_be_disabled() {
    let ctx = AgentContext::new(
        Arc::new(InMemoryStore::new()),
        registry_of(ProviderKind::OpenAi, &[]),
        Arc::new(fixtures::test_config()),
    );
    let config = ApiConfig {
        metrics_enabled: false,
        ..ApiConfig::default()
    };
    let app = create_api_router(AppState::new(ctx), &config);
    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
