//! RAVE LLM - Provider Abstraction Layer
//!
//! Chat-completion providers behind one async trait, plus the pieces the
//! agents assemble around them: prompt templates, JSON extraction from
//! free-text replies, concurrent fan-out and consensus merging.

use async_trait::async_trait;
use rave_core::{GenerationDefaults, LlmError, ProviderKind, RaveConfig, RaveResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod consensus;
pub mod extract;
pub mod fanout;
pub mod metrics;
pub mod pipeline;
pub mod prompt;
pub mod providers;

pub use consensus::{merge, Agreement, Consensus, Opinion, TieBreak};
pub use extract::{extract_as, extract_json, extract_object, ParseResult};
pub use fanout::{call_with_timeout, FanOut, FanOutReport};
pub use pipeline::{ask_for_consensus, opinion_from_completion, LabelSource, OpinionSpec};
pub use prompt::{PromptTemplate, PromptVars};

// ============================================================================
// CHAT PROVIDER TRAIT
// ============================================================================

/// A single-turn chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        let defaults = GenerationDefaults::default();
        Self {
            system: system.into(),
            user: user.into(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        }
    }

    pub fn with_generation(mut self, generation: &GenerationDefaults) -> Self {
        self.temperature = generation.temperature;
        self.max_tokens = generation.max_tokens;
        self
    }
}

/// The text a provider replied with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub provider: ProviderKind,
    pub model: String,
    pub text: String,
}

/// Trait for chat-completion providers.
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model(&self) -> &str;

    /// Whether a credential is present. Unconfigured providers fail every
    /// call with `CredentialMissing` without touching the network.
    fn is_configured(&self) -> bool {
        true
    }

    async fn complete(&self, request: &ChatRequest) -> RaveResult<Completion>;
}

// ============================================================================
// PROVIDER REGISTRY
// ============================================================================

/// Providers in configured order, plus which one is primary.
/// Providers must be explicitly registered or built from config.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ChatProvider>>,
    primary: ProviderKind,
}

impl ProviderRegistry {
    pub fn new(primary: ProviderKind) -> Self {
        Self {
            providers: Vec::new(),
            primary,
        }
    }

    /// Build an HTTP client for every vendor in `config.providers`.
    pub fn from_config(config: &RaveConfig) -> RaveResult<Self> {
        let mut registry = Self::new(config.primary_provider);
        for settings in &config.providers {
            let provider = providers::build(settings, config.provider_timeout)?;
            registry.register(provider);
        }
        Ok(registry)
    }

    /// Register a provider. Replaces one of the same kind in place.
    pub fn register(&mut self, provider: Arc<dyn ChatProvider>) {
        match self.providers.iter_mut().find(|p| p.kind() == provider.kind()) {
            Some(slot) => *slot = provider,
            None => self.providers.push(provider),
        }
    }

    pub fn get(&self, kind: ProviderKind) -> RaveResult<Arc<dyn ChatProvider>> {
        self.providers
            .iter()
            .find(|p| p.kind() == kind)
            .cloned()
            .ok_or_else(|| LlmError::ProviderNotConfigured { provider: kind }.into())
    }

    pub fn primary_kind(&self) -> ProviderKind {
        self.primary
    }

    pub fn primary(&self) -> RaveResult<Arc<dyn ChatProvider>> {
        self.get(self.primary)
    }

    pub fn all(&self) -> &[Arc<dyn ChatProvider>] {
        &self.providers
    }

    /// Providers with a credential, in registration order.
    pub fn configured(&self) -> Vec<Arc<dyn ChatProvider>> {
        self.providers
            .iter()
            .filter(|p| p.is_configured())
            .cloned()
            .collect()
    }

    pub fn configured_kinds(&self) -> Vec<ProviderKind> {
        self.configured().iter().map(|p| p.kind()).collect()
    }

    /// The requested subset, in the order asked for.
    pub fn select(&self, kinds: &[ProviderKind]) -> RaveResult<Vec<Arc<dyn ChatProvider>>> {
        kinds.iter().map(|kind| self.get(*kind)).collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<String> = self
            .providers
            .iter()
            .map(|p| format!("{}({})", p.kind(), p.model()))
            .collect();
        f.debug_struct("ProviderRegistry")
            .field("providers", &kinds)
            .field("primary", &self.primary)
            .finish()
    }
}
