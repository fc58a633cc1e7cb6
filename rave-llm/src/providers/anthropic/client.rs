//! Anthropic Messages API client

use super::types::{Message, MessageRequest, MessageResponse};
use super::API_VERSION;
use crate::providers::{invalid_response, HttpTransport};
use crate::{ChatProvider, ChatRequest, Completion};
use async_trait::async_trait;
use rave_core::{ApiKey, LlmError, ProviderKind, ProviderSettings, RaveResult};
use std::time::Duration;

pub struct AnthropicClient {
    transport: HttpTransport,
    api_key: Option<ApiKey>,
    model: String,
}

impl AnthropicClient {
    pub fn new(settings: &ProviderSettings, timeout: Duration) -> RaveResult<Self> {
        Ok(Self {
            transport: HttpTransport::new(
                ProviderKind::Anthropic,
                &settings.base_url,
                settings.max_concurrent,
                timeout,
            )?,
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl ChatProvider for AnthropicClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: &ChatRequest) -> RaveResult<Completion> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::CredentialMissing {
            provider: ProviderKind::Anthropic,
        })?;

        let body = MessageRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: request.user.clone(),
            }],
            max_tokens: request.max_tokens,
            system: Some(request.system.clone()).filter(|s| !s.is_empty()),
            temperature: Some(request.temperature),
        };
        let response: MessageResponse = self
            .transport
            .post(
                "messages",
                &[("x-api-key", api_key.expose()), ("anthropic-version", API_VERSION)],
                &[],
                &body,
            )
            .await?;

        let text = response.text();
        if text.trim().is_empty() {
            return Err(invalid_response(ProviderKind::Anthropic, "No text content in response"));
        }
        Ok(Completion {
            provider: ProviderKind::Anthropic,
            model: response.model.unwrap_or_else(|| self.model.clone()),
            text,
        })
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.transport.base_url())
            .field("model", &self.model)
            .field("api_key", &self.api_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::fake;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use rave_core::RaveError;
    use serde_json::{json, Value};

    fn settings(base: &str) -> ProviderSettings {
        ProviderSettings::unconfigured(ProviderKind::Anthropic)
            .with_base_url(base)
            .with_api_key("sk-ant-test")
    }

    #[tokio::test]
    async fn test_sends_version_header_and_system_prompt() {
        let router = Router::new().route(
            "/messages",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let version_ok = headers.get("anthropic-version").map(|v| v == API_VERSION) == Some(true);
                let key_ok = headers.get("x-api-key").map(|v| v == "sk-ant-test") == Some(true);
                if !(version_ok && key_ok) {
                    return (StatusCode::BAD_REQUEST, Json(json!({"type": "error", "error": {"type": "invalid_request_error", "message": "bad headers"}})));
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "model": "claude-3-5-sonnet-20241022",
                        "content": [{"type": "text", "text": format!("system was: {}", body["system"].as_str().unwrap_or(""))}],
                        "stop_reason": "end_turn"
                    })),
                )
            }),
        );
        let base = fake::serve(router).await;
        let client = AnthropicClient::new(&settings(&base), Duration::from_secs(5)).unwrap();
        let completion = client
            .complete(&ChatRequest::new("you curate techno", "go"))
            .await
            .unwrap();
        assert_eq!(completion.text, "system was: you curate techno");
        assert_eq!(completion.provider, ProviderKind::Anthropic);
    }

    #[tokio::test]
    async fn test_overloaded_maps_to_http_error() {
        let router = Router::new().route(
            "/messages",
            post(|| async {
                (
                    StatusCode::from_u16(529).unwrap(),
                    Json(json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}})),
                )
            }),
        );
        let base = fake::serve(router).await;
        let client = AnthropicClient::new(&settings(&base), Duration::from_secs(5)).unwrap();
        match client.complete(&ChatRequest::new("s", "u")).await {
            Err(RaveError::Llm(LlmError::Http { status, body, provider })) => {
                assert_eq!(status, 529);
                assert_eq!(body, "Overloaded");
                assert_eq!(provider, ProviderKind::Anthropic);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client = AnthropicClient::new(&settings("http://127.0.0.1:9"), Duration::from_secs(2)).unwrap();
        assert!(matches!(
            client.complete(&ChatRequest::new("s", "u")).await,
            Err(RaveError::Llm(LlmError::Network { .. }))
        ));
    }
}
