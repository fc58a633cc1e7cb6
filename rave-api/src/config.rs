//! API Configuration Module
//!
//! Server-level settings: where to listen, which store to use, CORS and
//! whether `/metrics` is exposed. Agent behaviour lives in
//! [`rave_core::RaveConfig`].

use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::{ApiError, ApiResult};

// ============================================================================
// STORE BACKEND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Process-local store, lost on restart.
    #[default]
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => Err(ApiError::invalid_input(format!(
                "Invalid RAVE_STORE value '{}': expected memory or postgres",
                other
            ))),
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_host: String,
    pub port: u16,

    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins.
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    pub store: StoreBackend,

    /// Expose `GET /metrics`.
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            store: StoreBackend::Memory,
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `RAVE_API_BIND`: Listen address (default: 0.0.0.0)
    /// - `PORT` or `RAVE_API_PORT`: Listen port (default: 3000)
    /// - `RAVE_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `RAVE_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `RAVE_STORE`: `memory` or `postgres` (default: memory)
    /// - `RAVE_METRICS_ENABLED`: "true"/"1" or "false"/"0" (default: true)
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let port = match get("PORT").or_else(|| get("RAVE_API_PORT")) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", raw)))?,
            None => defaults.port,
        };

        let cors_origins = get("RAVE_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_max_age_secs = get("RAVE_CORS_MAX_AGE_SECS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.cors_max_age_secs);

        let store = match get("RAVE_STORE") {
            Some(raw) => raw.parse()?,
            None => defaults.store,
        };

        let metrics_enabled = get("RAVE_METRICS_ENABLED")
            .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1"))
            .unwrap_or(defaults.metrics_enabled);

        Ok(Self {
            bind_host: get("RAVE_API_BIND").unwrap_or(defaults.bind_host),
            port,
            cors_origins,
            cors_max_age_secs,
            store,
            metrics_enabled,
        })
    }

    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
    }

    /// Whether any origin may call the API.
    pub fn is_permissive(&self) -> bool {
        self.cors_origins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.store, StoreBackend::Memory);
        assert!(config.is_permissive());
        assert!(config.metrics_enabled);
        assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn test_port_prefers_platform_variable() {
        let config =
            ApiConfig::from_lookup(lookup(&[("PORT", "8080"), ("RAVE_API_PORT", "9090")])).unwrap();
        assert_eq!(config.port, 8080);

        let config = ApiConfig::from_lookup(lookup(&[("RAVE_API_PORT", "9090")])).unwrap();
        assert_eq!(config.port, 9090);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(ApiConfig::from_lookup(lookup(&[("PORT", "eighty")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[("RAVE_STORE", "redis")])).is_err());

        let config = ApiConfig {
            bind_host: "not a host".to_string(),
            ..Default::default()
        };
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_cors_and_store() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("RAVE_CORS_ORIGINS", "https://rave-kb.dev, ,https://admin.rave-kb.dev"),
            ("RAVE_STORE", "Postgres"),
            ("RAVE_METRICS_ENABLED", "false"),
        ]))
        .unwrap();
        assert_eq!(
            config.cors_origins,
            vec!["https://rave-kb.dev", "https://admin.rave-kb.dev"]
        );
        assert!(!config.is_permissive());
        assert_eq!(config.store, StoreBackend::Postgres);
        assert!(!config.metrics_enabled);
    }
}
