//! Configuration types
//!
//! `RaveConfig` is built once at process start and handed to the provider
//! registry, the agents and the store. Nothing below the binary reads the
//! environment directly.

use crate::{ConfigError, ProviderKind, RaveResult};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Provider API key. Redacted in `Debug` output.
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into_boxed_str()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for ApiKey {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Settings for one AI vendor.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    /// `None` means calls fail fast with `CredentialMissing`.
    pub api_key: Option<ApiKey>,
    pub model: String,
    pub base_url: String,
    /// Maximum in-flight requests to this vendor.
    pub max_concurrent: usize,
}

impl ProviderSettings {
    /// Vendor defaults without a credential.
    pub fn unconfigured(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: None,
            model: kind.default_model().to_string(),
            base_url: kind.default_base_url().to_string(),
            max_concurrent: 8,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(ApiKey::new(key));
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Default generation parameters for agent prompts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationDefaults {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

/// Master configuration struct.
#[derive(Debug, Clone)]
pub struct RaveConfig {
    /// All vendors, in fan-out order. The order is also the consensus
    /// tie-break order.
    pub providers: Vec<ProviderSettings>,
    /// Vendor used by single-provider actions.
    pub primary_provider: ProviderKind,
    /// Deadline for each provider call.
    pub provider_timeout: Duration,
    pub generation: GenerationDefaults,
    /// Merge candidates at or above this confidence are merged without review.
    pub auto_merge_threshold: f64,
    /// A run still `running` after this long is reported as stale.
    pub run_stale_after: Duration,
    /// Doggy share rate (shares / views) below which an issue is raised.
    pub share_rate_floor: f64,
    /// Lifetime of expiring insights such as daily summaries.
    pub insight_ttl: Duration,
}

impl Default for RaveConfig {
    fn default() -> Self {
        Self {
            providers: ProviderKind::ALL
                .iter()
                .map(|kind| ProviderSettings::unconfigured(*kind))
                .collect(),
            primary_provider: ProviderKind::OpenAi,
            provider_timeout: Duration::from_secs(30),
            generation: GenerationDefaults::default(),
            auto_merge_threshold: 0.9,
            run_stale_after: Duration::from_secs(900),
            share_rate_floor: 0.02,
            insight_ttl: Duration::from_secs(24 * 3600),
        }
    }
}

impl RaveConfig {
    /// Create RaveConfig from environment variables.
    ///
    /// Environment variables:
    /// - `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `GEMINI_API_KEY`, `GROQ_API_KEY`
    /// - `RAVE_<VENDOR>_MODEL`, `RAVE_<VENDOR>_BASE_URL`, `RAVE_<VENDOR>_MAX_CONCURRENT`
    /// - `RAVE_PRIMARY_PROVIDER` (default: openai)
    /// - `RAVE_PROVIDER_TIMEOUT_SECS` (default: 30)
    /// - `RAVE_TEMPERATURE` (default: 0.3), `RAVE_MAX_TOKENS` (default: 2000)
    /// - `RAVE_AUTO_MERGE_THRESHOLD` (default: 0.9)
    /// - `RAVE_RUN_STALE_AFTER_SECS` (default: 900)
    /// - `RAVE_SHARE_RATE_FLOOR` (default: 0.02)
    /// - `RAVE_INSIGHT_TTL_HOURS` (default: 24)
    pub fn from_env() -> RaveResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or empty keys take defaults;
    /// set-but-unparsable keys are errors.
    pub fn from_lookup<F>(lookup: F) -> RaveResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let mut providers = Vec::with_capacity(ProviderKind::ALL.len());
        for kind in ProviderKind::ALL {
            let prefix = format!("RAVE_{}", kind.as_db_str().to_uppercase());
            let mut settings = ProviderSettings::unconfigured(*kind);
            if let Some(key) = get(kind.api_key_env()) {
                settings = settings.with_api_key(key);
            }
            if let Some(model) = get(&format!("{}_MODEL", prefix)) {
                settings.model = model;
            }
            if let Some(url) = get(&format!("{}_BASE_URL", prefix)) {
                settings.base_url = url.trim_end_matches('/').to_string();
            }
            settings.max_concurrent = parse_or(
                &format!("{}_MAX_CONCURRENT", prefix),
                get(&format!("{}_MAX_CONCURRENT", prefix)),
                settings.max_concurrent,
            )?;
            providers.push(settings);
        }

        let config = Self {
            providers,
            primary_provider: parse_or(
                "RAVE_PRIMARY_PROVIDER",
                get("RAVE_PRIMARY_PROVIDER"),
                defaults.primary_provider,
            )?,
            provider_timeout: Duration::from_secs(parse_or(
                "RAVE_PROVIDER_TIMEOUT_SECS",
                get("RAVE_PROVIDER_TIMEOUT_SECS"),
                defaults.provider_timeout.as_secs(),
            )?),
            generation: GenerationDefaults {
                temperature: parse_or(
                    "RAVE_TEMPERATURE",
                    get("RAVE_TEMPERATURE"),
                    defaults.generation.temperature,
                )?,
                max_tokens: parse_or(
                    "RAVE_MAX_TOKENS",
                    get("RAVE_MAX_TOKENS"),
                    defaults.generation.max_tokens,
                )?,
            },
            auto_merge_threshold: parse_or(
                "RAVE_AUTO_MERGE_THRESHOLD",
                get("RAVE_AUTO_MERGE_THRESHOLD"),
                defaults.auto_merge_threshold,
            )?,
            run_stale_after: Duration::from_secs(parse_or(
                "RAVE_RUN_STALE_AFTER_SECS",
                get("RAVE_RUN_STALE_AFTER_SECS"),
                defaults.run_stale_after.as_secs(),
            )?),
            share_rate_floor: parse_or(
                "RAVE_SHARE_RATE_FLOOR",
                get("RAVE_SHARE_RATE_FLOOR"),
                defaults.share_rate_floor,
            )?,
            insight_ttl: hours(
                "RAVE_INSIGHT_TTL_HOURS",
                get("RAVE_INSIGHT_TTL_HOURS"),
                defaults.insight_ttl,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that parsing alone cannot.
    pub fn validate(&self) -> RaveResult<()> {
        if self.provider_timeout.is_zero() {
            return Err(invalid("provider_timeout", "0", "must be greater than zero"));
        }
        if self.run_stale_after.is_zero() || self.run_stale_after > MAX_RUN_STALE_AFTER {
            return Err(invalid(
                "run_stale_after",
                &format!("{}s", self.run_stale_after.as_secs()),
                "must be between 1 second and 7 days",
            ));
        }
        if self.insight_ttl.is_zero() || self.insight_ttl > MAX_INSIGHT_TTL {
            return Err(invalid(
                "insight_ttl",
                &format!("{}s", self.insight_ttl.as_secs()),
                "must be between 1 second and 365 days",
            ));
        }
        if !(0.0..=1.0).contains(&self.auto_merge_threshold) {
            return Err(invalid(
                "auto_merge_threshold",
                &self.auto_merge_threshold.to_string(),
                "must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.share_rate_floor) {
            return Err(invalid(
                "share_rate_floor",
                &self.share_rate_floor.to_string(),
                "must be within [0, 1]",
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(invalid(
                "temperature",
                &self.generation.temperature.to_string(),
                "must be within [0, 2]",
            ));
        }
        if self.generation.max_tokens == 0 {
            return Err(invalid("max_tokens", "0", "must be greater than zero"));
        }
        for settings in &self.providers {
            if settings.max_concurrent == 0 {
                return Err(invalid(
                    &format!("{}.max_concurrent", settings.kind),
                    "0",
                    "must be greater than zero",
                ));
            }
        }
        if self.provider(self.primary_provider).is_none() {
            return Err(ConfigError::MissingRequired {
                field: format!("providers.{}", self.primary_provider),
            }
            .into());
        }
        Ok(())
    }

    /// Settings for one vendor.
    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.kind == kind)
    }

    /// Mutable settings for one vendor.
    pub fn provider_mut(&mut self, kind: ProviderKind) -> Option<&mut ProviderSettings> {
        self.providers.iter_mut().find(|p| p.kind == kind)
    }

    /// Vendors that have a credential, in fan-out order.
    pub fn configured_providers(&self) -> Vec<ProviderKind> {
        self.providers
            .iter()
            .filter(|p| p.is_configured())
            .map(|p| p.kind)
            .collect()
    }
}

/// Longest accepted staleness window for running runs.
pub const MAX_RUN_STALE_AFTER: Duration = Duration::from_secs(7 * 24 * 3600);

/// Longest accepted lifetime for expiring insights.
pub const MAX_INSIGHT_TTL: Duration = Duration::from_secs(365 * 24 * 3600);

/// Parse a whole number of hours.
fn hours(field: &str, raw: Option<String>, default: Duration) -> RaveResult<Duration> {
    let count = parse_or::<u64>(field, raw, default.as_secs() / 3600)?;
    count
        .checked_mul(3600)
        .map(Duration::from_secs)
        .ok_or_else(|| invalid(field, &count.to_string(), "too many hours"))
}

fn invalid(field: &str, value: &str, reason: &str) -> crate::RaveError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

fn parse_or<T>(field: &str, raw: Option<String>, default: T) -> RaveResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| invalid(field, &value, &e.to_string())),
    }
}
