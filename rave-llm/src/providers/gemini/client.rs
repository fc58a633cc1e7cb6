//! Gemini `generateContent` client
//!
//! The key travels as the `key` query parameter.

use super::types::{Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig};
use crate::providers::{invalid_response, HttpTransport};
use crate::{ChatProvider, ChatRequest, Completion};
use async_trait::async_trait;
use rave_core::{ApiKey, LlmError, ProviderKind, ProviderSettings, RaveResult};
use std::time::Duration;

pub struct GeminiClient {
    transport: HttpTransport,
    api_key: Option<ApiKey>,
    model: String,
}

impl GeminiClient {
    pub fn new(settings: &ProviderSettings, timeout: Duration) -> RaveResult<Self> {
        Ok(Self {
            transport: HttpTransport::new(
                ProviderKind::Gemini,
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
impl ChatProvider for GeminiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: &ChatRequest) -> RaveResult<Completion> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::CredentialMissing {
            provider: ProviderKind::Gemini,
        })?;

        let body = GenerateContentRequest {
            contents: vec![Content::text(Some("user"), request.user.clone())],
            system_instruction: Some(request.system.clone())
                .filter(|s| !s.is_empty())
                .map(|s| Content::text(None, s)),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };
        let path = format!("models/{}:generateContent", self.model);
        let response: GenerateContentResponse = self
            .transport
            .post(&path, &[], &[("key", api_key.expose())], &body)
            .await?;

        let text = response
            .text()
            .ok_or_else(|| invalid_response(ProviderKind::Gemini, "No candidate text in response"))?;
        Ok(Completion {
            provider: ProviderKind::Gemini,
            model: response.model_version.unwrap_or_else(|| self.model.clone()),
            text,
        })
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
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
    use axum::extract::{Path, Query};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use rave_core::RaveError;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn fake_gemini() -> String {
        let router = Router::new().route(
            "/models/:call",
            post(
                |Path(call): Path<String>,
                 Query(query): Query<HashMap<String, String>>,
                 Json(body): Json<Value>| async move {
                    if query.get("key").map(String::as_str) != Some("gm-key") {
                        return (
                            StatusCode::BAD_REQUEST,
                            Json(json!({"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}})),
                        );
                    }
                    let reply = format!(
                        "{} | {} | {}",
                        call,
                        body["systemInstruction"]["parts"][0]["text"].as_str().unwrap_or(""),
                        body["generationConfig"]["maxOutputTokens"]
                    );
                    (
                        StatusCode::OK,
                        Json(json!({"candidates": [{"content": {"role": "model", "parts": [{"text": reply}]}, "finishReason": "STOP"}]})),
                    )
                },
            ),
        );
        fake::serve(router).await
    }

    #[tokio::test]
    async fn test_generate_content_round_trip() {
        let base = fake_gemini().await;
        let settings = ProviderSettings::unconfigured(ProviderKind::Gemini)
            .with_base_url(base)
            .with_api_key("gm-key");
        let client = GeminiClient::new(&settings, Duration::from_secs(5)).unwrap();
        let mut request = ChatRequest::new("sys", "user");
        request.max_tokens = 256;
        let completion = client.complete(&request).await.unwrap();
        assert_eq!(completion.text, "gemini-1.5-flash:generateContent | sys | 256");
        assert_eq!(completion.model, "gemini-1.5-flash");
    }

    #[tokio::test]
    async fn test_bad_key_maps_vendor_message() {
        let base = fake_gemini().await;
        let settings = ProviderSettings::unconfigured(ProviderKind::Gemini)
            .with_base_url(base)
            .with_api_key("wrong");
        let client = GeminiClient::new(&settings, Duration::from_secs(5)).unwrap();
        match client.complete(&ChatRequest::new("s", "u")).await {
            Err(RaveError::Llm(LlmError::Http { status, body, .. })) => {
                assert_eq!(status, 400);
                assert_eq!(body, "API key not valid");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_blocked_prompt_has_no_text() {
        let response: GenerateContentResponse =
            serde_json::from_value(json!({"candidates": [{"finishReason": "SAFETY"}]})).unwrap();
        assert_eq!(response.text(), None);
    }
}
