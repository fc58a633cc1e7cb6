//! Concurrent provider calls
//!
//! Every provider in a fan-out is called at once. Each call carries its own
//! deadline; a late provider is dropped (cancelling its request) and
//! reported as a timeout. One provider failing never fails the others.

use crate::metrics::record_call;
use crate::{ChatProvider, ChatRequest, Completion};
use futures_util::future::join_all;
use rave_core::{LlmError, ProviderFailure, ProviderKind, RaveError, RaveResult};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Call one provider under a deadline.
#[tracing::instrument(skip(provider, request), fields(provider = %provider.kind(), model = provider.model()))]
pub async fn call_with_timeout(
    provider: &dyn ChatProvider,
    request: &ChatRequest,
    timeout: Duration,
) -> RaveResult<Completion> {
    let kind = provider.kind();
    let started = Instant::now();
    let outcome = match tokio::time::timeout(timeout, provider.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout {
            provider: kind,
            after_ms: timeout.as_millis() as u64,
        }
        .into()),
    };
    let elapsed = started.elapsed();

    match &outcome {
        Ok(completion) => {
            record_call(kind, "ok", elapsed);
            tracing::debug!(
                latency_ms = elapsed.as_millis() as u64,
                chars = completion.text.len(),
                "provider call succeeded"
            );
        }
        Err(err) => {
            record_call(kind, outcome_label(err), elapsed);
            tracing::warn!(
                latency_ms = elapsed.as_millis() as u64,
                error = %err,
                "provider call failed"
            );
        }
    }
    outcome
}

fn outcome_label(err: &RaveError) -> &'static str {
    match err {
        RaveError::Llm(LlmError::Timeout { .. }) => "timeout",
        RaveError::Llm(LlmError::CredentialMissing { .. }) => "no_credential",
        RaveError::Llm(LlmError::Http { .. }) => "http_error",
        RaveError::Llm(LlmError::Network { .. }) => "network_error",
        RaveError::Llm(LlmError::InvalidResponse { .. }) => "invalid_response",
        _ => "error",
    }
}

/// Message recorded for a failed provider, without the `RaveError` prefix.
pub(crate) fn failure_message(err: &RaveError) -> String {
    match err {
        RaveError::Llm(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

/// What a fan-out produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanOutReport {
    /// Successful replies, in provider order.
    pub completions: Vec<Completion>,
    /// Failed providers, in provider order.
    pub failures: Vec<ProviderFailure>,
}

impl FanOutReport {
    pub fn is_empty(&self) -> bool {
        self.completions.is_empty()
    }

    /// Fail with every provider error when nothing succeeded.
    pub fn require_any(self) -> RaveResult<Self> {
        if self.completions.is_empty() {
            return Err(LlmError::AllProvidersFailed {
                failures: self.failures,
            }
            .into());
        }
        Ok(self)
    }

    pub fn succeeded(&self) -> Vec<ProviderKind> {
        self.completions.iter().map(|c| c.provider).collect()
    }
}

/// A set of providers called together.
#[derive(Clone)]
pub struct FanOut {
    providers: Vec<Arc<dyn ChatProvider>>,
    timeout: Duration,
}

impl FanOut {
    pub fn new(providers: Vec<Arc<dyn ChatProvider>>, timeout: Duration) -> Self {
        Self { providers, timeout }
    }

    pub fn providers(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run(&self, request: &ChatRequest) -> FanOutReport {
        let calls = self
            .providers
            .iter()
            .map(|provider| call_with_timeout(provider.as_ref(), request, self.timeout));
        let results = join_all(calls).await;

        let mut report = FanOutReport::default();
        for (provider, result) in self.providers.iter().zip(results) {
            match result {
                Ok(completion) => report.completions.push(completion),
                Err(err) => report
                    .failures
                    .push(ProviderFailure::new(provider.kind(), failure_message(&err))),
            }
        }
        tracing::info!(
            providers = self.providers.len(),
            succeeded = report.completions.len(),
            failed = report.failures.len(),
            "fan-out finished"
        );
        report
    }
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("providers", &self.providers())
            .field("timeout", &self.timeout)
            .finish()
    }
}
