//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use rave_agents::AgentContext;
use rave_core::RaveConfig;
use rave_llm::ProviderRegistry;
use rave_storage::{AgentStore, DbConfig, InMemoryStore, PgStore};

use crate::config::{ApiConfig, StoreBackend};
use crate::error::ApiResult;

#[derive(Clone, Debug)]
pub struct AppState {
    pub agents: AgentContext,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(agents: AgentContext) -> Self {
        Self {
            agents,
            start_time: Instant::now(),
        }
    }

    /// Wire the store and provider registry described by the configuration.
    pub async fn from_config(config: Arc<RaveConfig>, api: &ApiConfig) -> ApiResult<Self> {
        let store = open_store(api.store).await?;
        let providers = ProviderRegistry::from_config(&config)?;
        let configured = providers.configured_kinds();
        if configured.is_empty() {
            tracing::warn!("No provider API keys configured; agent actions will fail");
        } else {
            tracing::info!(providers = ?configured, primary = %config.primary_provider, "Providers configured");
        }
        Ok(Self::new(AgentContext::new(store, providers, config)))
    }
}

async fn open_store(backend: StoreBackend) -> ApiResult<Arc<dyn AgentStore>> {
    match backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; records are lost on restart");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let db_config = DbConfig::from_env()?;
            let store = PgStore::from_config(&db_config)?;
            store.migrate().await?;
            tracing::info!(
                host = %db_config.host,
                dbname = %db_config.dbname,
                pool_size = store.pool_size(),
                "Connected to PostgreSQL"
            );
            Ok(Arc::new(store))
        }
    }
}
