//! RAVE Agents - Agent Functions
//!
//! One module per edge function. Every function takes a JSON body whose
//! `action` field picks the operation:
//! - `artist-db-architect`: schema health, cross-source duplicate detection
//! - `doggy-analytics-insights`: share/download analytics and issues
//! - `playbook-agent`: action plans for editorial and growth goals
//! - `research-book-metadata`: multi-provider book lookup
//! - `youtube-channel-curator`: channel listing decisions
//! - `agent-runs`: run history
//!
//! Actions that call providers run inside a [`Runner`], so each one leaves
//! exactly one run record behind.

use rave_core::{AgentFunction, RaveConfig, RaveResult, ValidationError};
use rave_llm::{ChatProvider, ChatRequest, FanOut, ProviderRegistry};
use rave_storage::AgentStore;
use serde_json::Value;
use std::sync::Arc;

pub mod artist_architect;
pub mod book_research;
pub mod channel_curator;
pub mod doggy_insights;
pub mod metrics;
pub mod normalize;
pub mod playbook;
pub mod prompts;
pub mod request;
pub mod runner;
pub mod runs;

pub use runner::{Finished, Runner};

// ============================================================================
// CONTEXT
// ============================================================================

/// Everything an agent action may touch.
#[derive(Clone)]
pub struct AgentContext {
    pub store: Arc<dyn AgentStore>,
    pub providers: ProviderRegistry,
    pub config: Arc<RaveConfig>,
}

impl AgentContext {
    pub fn new(store: Arc<dyn AgentStore>, providers: ProviderRegistry, config: Arc<RaveConfig>) -> Self {
        Self {
            store,
            providers,
            config,
        }
    }

    /// Every configured provider, in registration order.
    ///
    /// With none configured, every registered provider is used, so the
    /// resulting failure names each missing credential.
    pub fn fan_out(&self) -> FanOut {
        let mut providers = self.providers.configured();
        if providers.is_empty() {
            providers = self.providers.all().to_vec();
        }
        FanOut::new(providers, self.config.provider_timeout)
    }

    /// Provider for single-provider actions.
    pub fn primary(&self) -> RaveResult<Arc<dyn ChatProvider>> {
        self.providers.primary()
    }

    /// Request with the configured generation defaults.
    pub fn chat_request(&self, system: &str, user: String) -> ChatRequest {
        ChatRequest::new(system, user).with_generation(&self.config.generation)
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("providers", &self.providers)
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

/// Valid actions for a function.
pub fn actions(function: AgentFunction) -> &'static [&'static str] {
    match function {
        AgentFunction::ArtistDbArchitect => artist_architect::ACTIONS,
        AgentFunction::DoggyAnalyticsInsights => doggy_insights::ACTIONS,
        AgentFunction::PlaybookAgent => playbook::ACTIONS,
        AgentFunction::ResearchBookMetadata => book_research::ACTIONS,
        AgentFunction::YoutubeChannelCurator => channel_curator::ACTIONS,
        AgentFunction::AgentRuns => runs::ACTIONS,
    }
}

pub(crate) fn unknown_action(function: AgentFunction, action: &str) -> ValidationError {
    ValidationError::UnknownAction {
        function,
        action: action.to_string(),
        valid: actions(function).iter().map(|a| a.to_string()).collect(),
    }
}

/// Resolve a function by its route name.
pub fn function_by_name(name: &str) -> RaveResult<AgentFunction> {
    AgentFunction::from_db_str(name).map_err(|_| {
        ValidationError::UnknownFunction {
            name: name.to_string(),
        }
        .into()
    })
}

/// Run `body.action` on `function`. The result is a JSON object.
pub async fn invoke(ctx: &AgentContext, function: AgentFunction, body: &Value) -> RaveResult<Value> {
    let action = request::action(body);
    match function {
        AgentFunction::ArtistDbArchitect => artist_architect::handle(ctx, action, body).await,
        AgentFunction::DoggyAnalyticsInsights => doggy_insights::handle(ctx, action, body).await,
        AgentFunction::PlaybookAgent => playbook::handle(ctx, action, body).await,
        AgentFunction::ResearchBookMetadata => book_research::handle(ctx, action, body).await,
        AgentFunction::YoutubeChannelCurator => channel_curator::handle(ctx, action, body).await,
        AgentFunction::AgentRuns => runs::handle(ctx, action, body).await,
    }
}
