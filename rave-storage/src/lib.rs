//! RAVE Storage - Agent Store Trait and Implementations
//!
//! `AgentStore` is the only way agents touch persistent state. Reads cover
//! the source tables agents analyse and the records they produced; writes
//! are limited to the run lifecycle and the two human-driven mutations
//! (applying an issue fix, resolving a merge candidate).

use async_trait::async_trait;
use rave_core::{
    AgentFunction, AgentRun, ArtistRecord, ArtistSource, DoggyStats, EntityId, Insight, Issue,
    MergeCandidate, MergeStatus, RaveResult, RunCompletion, TableStat,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::{DbConfig, PgStore};

/// Tables reported by `table_stats`, in report order.
pub const TABLES: &[&str] = &[
    "canonical_artists",
    "dj_artists",
    "doggy_daily_stats",
    "agent_runs",
    "agent_insights",
    "agent_issues",
    "merge_candidates",
];

/// Persistence for agent functions.
///
/// Every completion is a single atomic write: the run's terminal status and
/// all rows the run produced land together or not at all.
#[async_trait]
pub trait AgentStore: Send + Sync {
    // ========================================================================
    // HEALTH
    // ========================================================================

    /// Verify the backend is reachable.
    async fn health_check(&self) -> RaveResult<()>;

    // ========================================================================
    // SOURCE DATA
    // ========================================================================

    /// Row counts for every table in [`TABLES`].
    async fn table_stats(&self) -> RaveResult<Vec<TableStat>>;

    /// All artists from one source, ordered by record id.
    async fn list_artists(&self, source: ArtistSource) -> RaveResult<Vec<ArtistRecord>>;

    /// The most recent `days` days of stats, oldest first.
    async fn doggy_stats(&self, days: u32) -> RaveResult<Vec<DoggyStats>>;

    // ========================================================================
    // AGENT OUTPUT (READ)
    // ========================================================================

    async fn get_run(&self, run_id: EntityId) -> RaveResult<Option<AgentRun>>;

    /// Newest first.
    async fn list_runs(&self, limit: usize) -> RaveResult<Vec<AgentRun>>;

    /// Newest first, optionally restricted to one function.
    async fn list_insights(
        &self,
        function: Option<AgentFunction>,
        limit: usize,
    ) -> RaveResult<Vec<Insight>>;

    async fn get_issue(&self, issue_id: EntityId) -> RaveResult<Option<Issue>>;

    /// Newest first. `open_only` drops issues whose fix was applied.
    async fn list_issues(&self, open_only: bool) -> RaveResult<Vec<Issue>>;

    /// Highest confidence first.
    async fn list_merge_candidates(
        &self,
        status: Option<MergeStatus>,
    ) -> RaveResult<Vec<MergeCandidate>>;

    // ========================================================================
    // RUN LIFECYCLE
    // ========================================================================

    /// Record a freshly started run.
    async fn begin_run(&self, run: &AgentRun) -> RaveResult<()>;

    /// Finish a `running` run and persist everything it produced.
    ///
    /// # Errors
    /// * `StorageError::NotFound` - no such run
    /// * `StorageError::InvalidState` - the run already finished
    async fn complete_run(&self, run_id: EntityId, completion: RunCompletion)
        -> RaveResult<AgentRun>;

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Mark an issue's fix as applied.
    ///
    /// # Errors
    /// * `StorageError::VersionConflict` - `expected_version` is stale
    /// * `StorageError::InvalidState` - not auto-fixable, or already fixed
    async fn apply_issue_fix(&self, issue_id: EntityId, expected_version: i64)
        -> RaveResult<Issue>;

    /// Approve or reject a pending merge candidate.
    async fn resolve_merge_candidate(
        &self,
        candidate_id: EntityId,
        approve: bool,
    ) -> RaveResult<MergeCandidate>;
}
