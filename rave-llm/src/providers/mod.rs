//! Chat-completion provider implementations
//!
//! One client per vendor, all sharing [`HttpTransport`] for the request
//! cycle, the concurrency cap and error classification.

pub mod anthropic;
pub mod gemini;
pub mod groq;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use groq::groq_client;
pub use openai::OpenAiClient;

use crate::ChatProvider;
use rave_core::{LlmError, ProviderKind, ProviderSettings, RaveError, RaveResult};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Build the client for `settings.kind`.
pub fn build(settings: &ProviderSettings, timeout: Duration) -> RaveResult<Arc<dyn ChatProvider>> {
    Ok(match settings.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiClient::new(settings, timeout)?),
        ProviderKind::Groq => Arc::new(groq_client(settings, timeout)?),
        ProviderKind::Anthropic => Arc::new(AnthropicClient::new(settings, timeout)?),
        ProviderKind::Gemini => Arc::new(GeminiClient::new(settings, timeout)?),
    })
}

/// `{"error": {"message": ...}}`, shared by all four vendors.
#[derive(Debug, Deserialize)]
struct VendorError {
    error: VendorErrorDetail,
}

#[derive(Debug, Deserialize)]
struct VendorErrorDetail {
    message: String,
}

/// Vendor error message when the body is a known envelope, else the raw body.
pub(crate) fn vendor_message(body: &str) -> String {
    match serde_json::from_str::<VendorError>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().to_string(),
    }
}

pub(crate) fn invalid_response(provider: ProviderKind, reason: impl Into<String>) -> RaveError {
    LlmError::InvalidResponse {
        provider,
        reason: reason.into(),
    }
    .into()
}

/// HTTP plumbing for one vendor.
pub(crate) struct HttpTransport {
    client: Client,
    provider: ProviderKind,
    base_url: String,
    limiter: Arc<Semaphore>,
    timeout: Duration,
}

impl HttpTransport {
    pub(crate) fn new(
        provider: ProviderKind,
        base_url: &str,
        max_concurrent: usize,
        timeout: Duration,
    ) -> RaveResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| LlmError::Network {
            provider,
            message: format!("Failed to build HTTP client: {}", e),
        })?;
        Ok(Self {
            client,
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    fn classify(&self, err: reqwest::Error) -> RaveError {
        if err.is_timeout() {
            LlmError::Timeout {
                provider: self.provider,
                after_ms: self.timeout.as_millis() as u64,
            }
            .into()
        } else {
            LlmError::Network {
                provider: self.provider,
                message: err.to_string(),
            }
            .into()
        }
    }

    /// POST `body` as JSON to `{base_url}/{path}` and decode the reply.
    pub(crate) async fn post<Req, Res>(
        &self,
        path: &str,
        headers: &[(&'static str, &str)],
        query: &[(&'static str, &str)],
        body: &Req,
    ) -> RaveResult<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let _permit = self.limiter.acquire().await.map_err(|e| LlmError::Network {
            provider: self.provider,
            message: format!("Concurrency limiter closed: {}", e),
        })?;

        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut builder = self.client.post(&url).json(body);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        if !query.is_empty() {
            builder = builder.query(query);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        if status.is_success() {
            let text = response.text().await.map_err(|e| self.classify(e))?;
            serde_json::from_str(&text).map_err(|e| {
                invalid_response(self.provider, format!("Failed to parse response: {}", e))
            })
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!(provider = %self.provider, status = status.as_u16(), "provider returned error status");
            Err(LlmError::Http {
                provider: self.provider,
                status: status.as_u16(),
                body: vendor_message(&body),
            }
            .into())
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}
