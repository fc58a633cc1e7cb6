//! RAVE Core - Entity Types
//!
//! Pure data structures shared by every crate: identifiers, enums, the
//! persisted records, the error taxonomy and the configuration struct.
//! No I/O lives here.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;

pub use config::{ApiKey, GenerationDefaults, ProviderSettings, RaveConfig};
pub use entities::{
    clamp_confidence, AgentRun, ArtistRecord, DoggyStats, Insight, Issue, MergeCandidate,
    RunCompletion, SourceRecord, TableStat,
};
pub use enums::{
    AgentFunction, ArtistSource, EffectiveRunStatus, EntityKind, EnumParseError, InsightKind,
    IssueSeverity, MergeStatus, ProviderKind, RunStatus,
};
pub use error::{
    ConfigError, ExtractionError, LlmError, PromptError, ProviderFailure, RaveError, RaveResult,
    StorageError, ValidationError,
};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_are_time_ordered() {
        let a = new_entity_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_entity_id();
        assert!(a < b);
        assert_eq!(a.get_version_num(), 7);
    }
}
