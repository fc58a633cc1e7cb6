//! Groq provider
//!
//! Groq serves the OpenAI chat-completions protocol, so it is an
//! [`OpenAiClient`] pointed at Groq's base URL with Groq's credential.

use super::OpenAiClient;
use rave_core::{ProviderKind, ProviderSettings, RaveResult};
use std::time::Duration;

pub fn groq_client(settings: &ProviderSettings, timeout: Duration) -> RaveResult<OpenAiClient> {
    debug_assert_eq!(settings.kind, ProviderKind::Groq);
    OpenAiClient::new(settings, timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::fake;
    use crate::{ChatProvider, ChatRequest};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_groq_speaks_openai_protocol() {
        let router = Router::new().route(
            "/openai/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "model": body["model"],
                    "choices": [{"message": {"content": "{\"recommendation\": \"approve\"}"}}]
                }))
            }),
        );
        let base = format!("{}/openai/v1", fake::serve(router).await);
        let settings = ProviderSettings::unconfigured(ProviderKind::Groq)
            .with_base_url(base)
            .with_api_key("gsk-test");
        let client = groq_client(&settings, Duration::from_secs(5)).unwrap();

        assert_eq!(client.kind(), ProviderKind::Groq);
        let completion = client.complete(&ChatRequest::new("s", "u")).await.unwrap();
        assert_eq!(completion.provider, ProviderKind::Groq);
        assert_eq!(completion.model, "llama-3.3-70b-versatile");
        assert!(completion.text.contains("approve"));
    }
}
