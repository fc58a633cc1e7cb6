//! RAVE Test Utilities
//!
//! Shared test infrastructure for the RAVE workspace:
//! - Scripted mock chat providers
//! - Proptest generators for opinions and source records
//! - Fixtures for artists, doggy stats and configuration
//! - Assertions on the error taxonomy

pub use rave_storage::InMemoryStore;

pub use rave_core::{
    AgentFunction, ArtistRecord, ArtistSource, DoggyStats, EntityKind, LlmError, ProviderKind,
    RaveConfig, RaveError, RaveResult, StorageError, ValidationError,
};
pub use rave_llm::{ChatProvider, ChatRequest, Completion, ProviderRegistry};

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// MOCK PROVIDERS
// ============================================================================

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Error(LlmError),
    /// Sleep, then answer with the text.
    Delayed(Duration, String),
}

/// Chat provider that plays back a script.
///
/// Call `n` gets reply `n`; once the script runs out the last reply repeats.
/// Every request is recorded.
#[derive(Debug)]
pub struct MockProvider {
    kind: ProviderKind,
    model: String,
    configured: bool,
    script: Vec<MockReply>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    pub fn new(kind: ProviderKind, script: Vec<MockReply>) -> Self {
        Self {
            kind,
            model: format!("mock-{}", kind),
            configured: true,
            script,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(kind: ProviderKind, text: impl Into<String>) -> Self {
        Self::new(kind, vec![MockReply::Text(text.into())])
    }

    pub fn failing(kind: ProviderKind, error: LlmError) -> Self {
        Self::new(kind, vec![MockReply::Error(error)])
    }

    pub fn delayed(kind: ProviderKind, delay: Duration, text: impl Into<String>) -> Self {
        Self::new(kind, vec![MockReply::Delayed(delay, text.into())])
    }

    /// Append a reply to the script.
    pub fn then(mut self, reply: MockReply) -> Self {
        self.script.push(reply);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Behave like a vendor without an API key.
    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    /// Number of `complete` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Copies of every request received, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn next_reply(&self) -> Option<MockReply> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .get(n)
            .or_else(|| self.script.last())
            .cloned()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn complete(&self, request: &ChatRequest) -> RaveResult<Completion> {
        if !self.configured {
            return Err(LlmError::CredentialMissing {
                provider: self.kind,
            }
            .into());
        }
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let text = match self.next_reply() {
            Some(MockReply::Text(text)) => text,
            Some(MockReply::Error(error)) => return Err(error.into()),
            Some(MockReply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                text
            }
            None => {
                return Err(LlmError::InvalidResponse {
                    provider: self.kind,
                    reason: "empty mock script".to_string(),
                }
                .into())
            }
        };
        Ok(Completion {
            provider: self.kind,
            model: self.model.clone(),
            text,
        })
    }
}

/// Register mocks in the given order. Keep the `Arc`s to inspect calls.
pub fn registry_of(primary: ProviderKind, mocks: &[Arc<MockProvider>]) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new(primary);
    for mock in mocks {
        registry.register(mock.clone() as Arc<dyn ChatProvider>);
    }
    registry
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;
    use rave_llm::Opinion;

    pub fn arb_provider_kind() -> impl Strategy<Value = ProviderKind> {
        prop::sample::select(ProviderKind::ALL.to_vec())
    }

    /// Confidence including out-of-range values the clamp must absorb.
    pub fn arb_raw_confidence() -> impl Strategy<Value = f64> {
        prop_oneof![
            8 => 0.0f64..=1.0,
            1 => -5.0f64..0.0,
            1 => 1.0f64..5.0,
        ]
    }

    /// A label from a small vocabulary, in random case with padding.
    pub fn arb_label() -> impl Strategy<Value = String> {
        (
            prop::sample::select(vec!["approve", "reject", "review"]),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(label, upper, padded)| {
                let label = if upper {
                    label.to_uppercase()
                } else {
                    label.to_string()
                };
                if padded {
                    format!("  {} ", label)
                } else {
                    label
                }
            })
    }

    pub fn arb_opinion() -> impl Strategy<Value = Opinion> {
        (
            arb_provider_kind(),
            arb_label(),
            arb_raw_confidence(),
            prop::collection::vec("[a-z]{3,8}", 0..4),
        )
            .prop_map(|(kind, label, confidence, pros)| {
                Opinion::new(kind, kind.default_model(), label, confidence).with_list("pros", pros)
            })
    }

    pub fn arb_artist_name() -> impl Strategy<Value = String> {
        "(The |DJ )?[A-Z][a-z]{2,9}( [A-Z][a-z]{2,9})?"
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use chrono::NaiveDate;

    /// Default config with a fake key for every vendor.
    pub fn test_config() -> RaveConfig {
        let mut config = RaveConfig::default();
        for settings in &mut config.providers {
            let key = format!("test-{}-key", settings.kind);
            *settings = settings.clone().with_api_key(key);
        }
        config.provider_timeout = Duration::from_secs(2);
        config
    }

    pub fn artist(source: ArtistSource, record_id: &str, name: &str) -> ArtistRecord {
        ArtistRecord {
            source,
            record_id: record_id.to_string(),
            name: name.to_string(),
            country: None,
            genres: vec!["techno".to_string()],
        }
    }

    /// Canonical artists. "Surgeon" and "Jeff Mills" also appear in the
    /// DJ directory under different spellings.
    pub fn canonical_artists() -> Vec<ArtistRecord> {
        vec![
            artist(ArtistSource::Canonical, "c-001", "Surgeon"),
            artist(ArtistSource::Canonical, "c-002", "Jeff Mills"),
            artist(ArtistSource::Canonical, "c-003", "Paula Temple"),
        ]
    }

    pub fn dj_artists() -> Vec<ArtistRecord> {
        vec![
            artist(ArtistSource::DjDirectory, "d-101", "DJ Surgeon"),
            artist(ArtistSource::DjDirectory, "d-102", "jeff  mills"),
            artist(ArtistSource::DjDirectory, "d-103", "Rebekah"),
        ]
    }

    pub fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, n).unwrap_or_default()
    }

    /// Seven healthy days starting 2024-03-01.
    pub fn healthy_week() -> Vec<DoggyStats> {
        (1..=7)
            .map(|n| DoggyStats {
                day: day(n),
                views: 1000,
                shares: 80,
                downloads: 40,
                unique_visitors: 600,
            })
            .collect()
    }

    /// Healthy week whose last day has views but no shares or downloads,
    /// and a traffic drop of more than half.
    pub fn troubled_week() -> Vec<DoggyStats> {
        let mut week = healthy_week();
        if let Some(last) = week.last_mut() {
            last.views = 300;
            last.shares = 0;
            last.downloads = 0;
            last.unique_visitors = 200;
        }
        week
    }

    /// Store seeded with both artist sources and the healthy week.
    pub fn seeded_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        let mut artists = canonical_artists();
        artists.extend(dj_artists());
        store
            .seed_artists(artists)
            .and_then(|_| store.seed_doggy_stats(healthy_week()))
            .unwrap_or_else(|e| panic!("seeding in-memory store: {}", e));
        store
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    use super::*;

    pub fn assert_not_found<T: std::fmt::Debug>(result: &RaveResult<T>, entity: EntityKind) {
        match result {
            Err(RaveError::Storage(StorageError::NotFound { entity: e, .. })) => {
                assert_eq!(*e, entity, "wrong entity in NotFound")
            }
            other => panic!("expected NotFound({}), got {:?}", entity, other),
        }
    }

    pub fn assert_validation_error<T: std::fmt::Debug>(result: &RaveResult<T>) {
        assert!(
            matches!(result, Err(RaveError::Validation(_))),
            "expected validation error, got {:?}",
            result
        );
    }

    pub fn assert_version_conflict<T: std::fmt::Debug>(result: &RaveResult<T>) {
        assert!(
            matches!(
                result,
                Err(RaveError::Storage(StorageError::VersionConflict { .. }))
            ),
            "expected version conflict, got {:?}",
            result
        );
    }

    pub fn assert_invalid_state<T: std::fmt::Debug>(result: &RaveResult<T>) {
        assert!(
            matches!(
                result,
                Err(RaveError::Storage(StorageError::InvalidState { .. }))
            ),
            "expected invalid state, got {:?}",
            result
        );
    }

    /// Assert every vendor failed and return how many failures were listed.
    pub fn assert_all_providers_failed<T: std::fmt::Debug>(result: &RaveResult<T>) -> usize {
        match result {
            Err(RaveError::Llm(LlmError::AllProvidersFailed { failures })) => failures.len(),
            other => panic!("expected AllProvidersFailed, got {:?}", other),
        }
    }
}
