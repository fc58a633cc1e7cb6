//! Persisted records and read models

use crate::{
    new_entity_id, AgentFunction, ArtistSource, EffectiveRunStatus, EntityId, InsightKind,
    IssueSeverity, MergeStatus, RunStatus, Timestamp,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Clamp a self-reported confidence into [0, 1]. NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ============================================================================
// AGENT RUN
// ============================================================================

/// One invocation of an agent function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    pub run_id: EntityId,
    pub function: AgentFunction,
    pub action: String,
    pub status: RunStatus,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub stats: JsonValue,
    pub result: JsonValue,
    pub error: Option<String>,
}

impl AgentRun {
    /// A fresh `running` record.
    pub fn start(function: AgentFunction, action: impl Into<String>) -> Self {
        Self {
            run_id: new_entity_id(),
            function,
            action: action.into(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            stats: JsonValue::Object(Default::default()),
            result: JsonValue::Null,
            error: None,
        }
    }

    /// Status as seen by readers. A run left `running` longer than
    /// `stale_after` is reported as `Stale`.
    pub fn effective_status(&self, now: Timestamp, stale_after: Duration) -> EffectiveRunStatus {
        match self.status {
            RunStatus::Completed => EffectiveRunStatus::Completed,
            RunStatus::Failed => EffectiveRunStatus::Failed,
            RunStatus::Running => {
                let age = now.signed_duration_since(self.started_at);
                match chrono::Duration::from_std(stale_after) {
                    Ok(limit) if age > limit => EffectiveRunStatus::Stale,
                    _ => EffectiveRunStatus::Running,
                }
            }
        }
    }

    /// Apply a completion in place. Callers check the status first.
    pub fn finish(&mut self, completion: &RunCompletion, at: Timestamp) {
        self.status = completion.status;
        self.finished_at = Some(at);
        self.result = completion.result.clone();
        self.stats = completion.stats.clone();
        self.error = completion.error.clone();
    }
}

/// Everything a run produces, written in one atomic step together with the
/// terminal status.
#[derive(Debug, Clone, PartialEq)]
pub struct RunCompletion {
    pub status: RunStatus,
    pub result: JsonValue,
    pub stats: JsonValue,
    pub error: Option<String>,
    pub insight: Option<Insight>,
    pub issues: Vec<Issue>,
    pub merge_candidates: Vec<MergeCandidate>,
}

impl RunCompletion {
    pub fn completed(result: JsonValue) -> Self {
        Self {
            status: RunStatus::Completed,
            result,
            stats: JsonValue::Object(Default::default()),
            error: None,
            insight: None,
            issues: Vec::new(),
            merge_candidates: Vec::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            result: JsonValue::Null,
            stats: JsonValue::Object(Default::default()),
            error: Some(error.into()),
            insight: None,
            issues: Vec::new(),
            merge_candidates: Vec::new(),
        }
    }

    pub fn with_stats(mut self, stats: JsonValue) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_insight(mut self, insight: Insight) -> Self {
        self.insight = Some(insight);
        self
    }

    pub fn with_issues(mut self, issues: Vec<Issue>) -> Self {
        self.issues = issues;
        self
    }

    pub fn with_merge_candidates(mut self, candidates: Vec<MergeCandidate>) -> Self {
        self.merge_candidates = candidates;
        self
    }
}

// ============================================================================
// INSIGHT
// ============================================================================

/// A single provider's or a consensus's output. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub insight_id: EntityId,
    pub run_id: EntityId,
    pub function: AgentFunction,
    pub kind: InsightKind,
    /// Model name, or `consensus(a+b)` when several providers contributed.
    pub model: String,
    pub confidence: f64,
    pub analysis: String,
    /// Inputs the prompt was built from.
    pub data_snapshot: JsonValue,
    /// The extracted (or merged) structured value.
    pub result: JsonValue,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl Insight {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: EntityId,
        function: AgentFunction,
        kind: InsightKind,
        model: impl Into<String>,
        confidence: f64,
        analysis: impl Into<String>,
        data_snapshot: JsonValue,
        result: JsonValue,
    ) -> Self {
        Self {
            insight_id: new_entity_id(),
            run_id,
            function,
            kind,
            model: model.into(),
            confidence: clamp_confidence(confidence),
            analysis: analysis.into(),
            data_snapshot,
            result,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    /// Expire `ttl` after creation. A TTL past the representable range
    /// leaves the insight without an expiry.
    pub fn expiring_after(mut self, ttl: Duration) -> Self {
        self.expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.created_at.checked_add_signed(ttl));
        self
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

// ============================================================================
// ISSUE
// ============================================================================

/// A detected anomaly. The only mutation is applying its fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub issue_id: EntityId,
    pub run_id: EntityId,
    pub code: String,
    pub severity: IssueSeverity,
    pub description: String,
    pub auto_fixable: bool,
    pub fix_applied: bool,
    /// Optimistic concurrency token, bumped on every update.
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Issue {
    pub fn new(
        run_id: EntityId,
        code: impl Into<String>,
        severity: IssueSeverity,
        description: impl Into<String>,
        auto_fixable: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            issue_id: new_entity_id(),
            run_id,
            code: code.into(),
            severity,
            description: description.into(),
            auto_fixable,
            fix_applied: false,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// MERGE CANDIDATES
// ============================================================================

/// One side of a merge candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source: ArtistSource,
    pub record_id: String,
    pub name: String,
}

/// Two differently-sourced records that may describe the same entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeCandidate {
    pub candidate_id: EntityId,
    pub run_id: EntityId,
    pub left: SourceRecord,
    pub right: SourceRecord,
    pub confidence: f64,
    pub reasoning: String,
    pub status: MergeStatus,
    pub created_at: Timestamp,
}

impl MergeCandidate {
    /// Build a candidate; it is auto-merged iff `confidence >= threshold`.
    pub fn assess(
        run_id: EntityId,
        left: SourceRecord,
        right: SourceRecord,
        confidence: f64,
        reasoning: impl Into<String>,
        threshold: f64,
    ) -> Self {
        let confidence = clamp_confidence(confidence);
        let status = if confidence >= threshold {
            MergeStatus::AutoMerged
        } else {
            MergeStatus::Pending
        };
        Self {
            candidate_id: new_entity_id(),
            run_id,
            left,
            right,
            confidence,
            reasoning: reasoning.into(),
            status,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// READ MODELS
// ============================================================================

/// Artist row from either source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRecord {
    pub source: ArtistSource,
    pub record_id: String,
    pub name: String,
    pub country: Option<String>,
    pub genres: Vec<String>,
}

impl ArtistRecord {
    pub fn as_source_record(&self) -> SourceRecord {
        SourceRecord {
            source: self.source,
            record_id: self.record_id.clone(),
            name: self.name.clone(),
        }
    }
}

/// One day of doggy gamification counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoggyStats {
    pub day: NaiveDate,
    pub views: i64,
    pub shares: i64,
    pub downloads: i64,
    pub unique_visitors: i64,
}

impl DoggyStats {
    /// Shares per view; `None` without views.
    pub fn share_rate(&self) -> Option<f64> {
        if self.views > 0 {
            Some(self.shares as f64 / self.views as f64)
        } else {
            None
        }
    }
}

/// Row count of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStat {
    pub table: String,
    pub rows: i64,
}
