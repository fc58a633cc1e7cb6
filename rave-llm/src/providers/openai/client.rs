//! OpenAI-compatible chat client

use super::types::{ChatCompletionRequest, ChatCompletionResponse, Message};
use crate::providers::{invalid_response, HttpTransport};
use crate::{ChatProvider, ChatRequest, Completion};
use async_trait::async_trait;
use rave_core::{ApiKey, LlmError, ProviderKind, ProviderSettings, RaveResult};
use std::time::Duration;

/// Client for `/chat/completions` with Bearer authentication.
pub struct OpenAiClient {
    kind: ProviderKind,
    transport: HttpTransport,
    api_key: Option<ApiKey>,
    model: String,
}

impl OpenAiClient {
    pub fn new(settings: &ProviderSettings, timeout: Duration) -> RaveResult<Self> {
        Ok(Self {
            kind: settings.kind,
            transport: HttpTransport::new(
                settings.kind,
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
impl ChatProvider for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: &ChatRequest) -> RaveResult<Completion> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(LlmError::CredentialMissing { provider: self.kind })?;

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::system(&request.system), Message::user(&request.user)],
            max_tokens: Some(request.max_tokens),
            temperature: Some(request.temperature),
        };
        let bearer = format!("Bearer {}", api_key.expose());
        let response: ChatCompletionResponse = self
            .transport
            .post("chat/completions", &[("Authorization", bearer.as_str())], &[], &body)
            .await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| invalid_response(self.kind, "No completion text in response"))?;

        Ok(Completion {
            provider: self.kind,
            model: response.model.unwrap_or_else(|| self.model.clone()),
            text,
        })
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("kind", &self.kind)
            .field("base_url", &self.transport.base_url())
            .field("model", &self.model)
            .field("api_key", &self.api_key)
            .finish()
    }
}
