//! In-memory agent store
//!
//! Every table lives behind one lock, so a completion is validated and
//! applied under a single write guard.

use crate::{AgentStore, TABLES};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rave_core::{
    AgentFunction, AgentRun, ArtistRecord, ArtistSource, DoggyStats, EntityId, EntityKind,
    Insight, Issue, MergeCandidate, MergeStatus, RaveResult, RunCompletion, RunStatus,
    StorageError, TableStat,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Tables {
    canonical_artists: BTreeMap<String, ArtistRecord>,
    dj_artists: BTreeMap<String, ArtistRecord>,
    doggy_daily_stats: BTreeMap<NaiveDate, DoggyStats>,
    runs: HashMap<EntityId, AgentRun>,
    insights: HashMap<EntityId, Insight>,
    issues: HashMap<EntityId, Issue>,
    merge_candidates: HashMap<EntityId, MergeCandidate>,
}

impl Tables {
    fn artists(&self, source: ArtistSource) -> &BTreeMap<String, ArtistRecord> {
        match source {
            ArtistSource::Canonical => &self.canonical_artists,
            ArtistSource::DjDirectory => &self.dj_artists,
        }
    }

    fn artists_mut(&mut self, source: ArtistSource) -> &mut BTreeMap<String, ArtistRecord> {
        match source {
            ArtistSource::Canonical => &mut self.canonical_artists,
            ArtistSource::DjDirectory => &mut self.dj_artists,
        }
    }

    fn row_count(&self, table: &str) -> usize {
        match table {
            "canonical_artists" => self.canonical_artists.len(),
            "dj_artists" => self.dj_artists.len(),
            "doggy_daily_stats" => self.doggy_daily_stats.len(),
            "agent_runs" => self.runs.len(),
            "agent_insights" => self.insights.len(),
            "agent_issues" => self.issues.len(),
            "merge_candidates" => self.merge_candidates.len(),
            _ => 0,
        }
    }
}

/// Store used by tests and by `RAVE_STORE=memory`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RaveResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StorageError::LockPoisoned.into())
    }

    fn write(&self) -> RaveResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StorageError::LockPoisoned.into())
    }

    /// Insert or replace source artists.
    pub fn seed_artists(&self, records: Vec<ArtistRecord>) -> RaveResult<()> {
        let mut tables = self.write()?;
        for record in records {
            tables
                .artists_mut(record.source)
                .insert(record.record_id.clone(), record);
        }
        Ok(())
    }

    /// Insert or replace daily stats.
    pub fn seed_doggy_stats(&self, stats: Vec<DoggyStats>) -> RaveResult<()> {
        let mut tables = self.write()?;
        for day in stats {
            tables.doggy_daily_stats.insert(day.day, day);
        }
        Ok(())
    }

    pub fn run_count(&self) -> RaveResult<usize> {
        Ok(self.read()?.runs.len())
    }
}

fn newest_first<T, K: Ord>(items: &mut [T], key: impl Fn(&T) -> K) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl AgentStore for InMemoryStore {
    async fn health_check(&self) -> RaveResult<()> {
        self.read().map(|_| ())
    }

    async fn table_stats(&self) -> RaveResult<Vec<TableStat>> {
        let tables = self.read()?;
        Ok(TABLES
            .iter()
            .map(|table| TableStat {
                table: table.to_string(),
                rows: tables.row_count(table) as i64,
            })
            .collect())
    }

    async fn list_artists(&self, source: ArtistSource) -> RaveResult<Vec<ArtistRecord>> {
        Ok(self.read()?.artists(source).values().cloned().collect())
    }

    async fn doggy_stats(&self, days: u32) -> RaveResult<Vec<DoggyStats>> {
        let tables = self.read()?;
        let mut recent: Vec<DoggyStats> = tables
            .doggy_daily_stats
            .values()
            .rev()
            .take(days as usize)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn get_run(&self, run_id: EntityId) -> RaveResult<Option<AgentRun>> {
        Ok(self.read()?.runs.get(&run_id).cloned())
    }

    async fn list_runs(&self, limit: usize) -> RaveResult<Vec<AgentRun>> {
        let mut runs: Vec<AgentRun> = self.read()?.runs.values().cloned().collect();
        newest_first(&mut runs, |r| (r.started_at, r.run_id));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn list_insights(
        &self,
        function: Option<AgentFunction>,
        limit: usize,
    ) -> RaveResult<Vec<Insight>> {
        let mut insights: Vec<Insight> = self
            .read()?
            .insights
            .values()
            .filter(|i| function.map_or(true, |f| i.function == f))
            .cloned()
            .collect();
        newest_first(&mut insights, |i| (i.created_at, i.insight_id));
        insights.truncate(limit);
        Ok(insights)
    }

    async fn get_issue(&self, issue_id: EntityId) -> RaveResult<Option<Issue>> {
        Ok(self.read()?.issues.get(&issue_id).cloned())
    }

    async fn list_issues(&self, open_only: bool) -> RaveResult<Vec<Issue>> {
        let mut issues: Vec<Issue> = self
            .read()?
            .issues
            .values()
            .filter(|i| !open_only || !i.fix_applied)
            .cloned()
            .collect();
        newest_first(&mut issues, |i| (i.created_at, i.issue_id));
        Ok(issues)
    }

    async fn list_merge_candidates(
        &self,
        status: Option<MergeStatus>,
    ) -> RaveResult<Vec<MergeCandidate>> {
        let mut candidates: Vec<MergeCandidate> = self
            .read()?
            .merge_candidates
            .values()
            .filter(|c| status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
        Ok(candidates)
    }

    async fn begin_run(&self, run: &AgentRun) -> RaveResult<()> {
        let mut tables = self.write()?;
        if tables.runs.contains_key(&run.run_id) {
            return Err(StorageError::AlreadyExists {
                entity: EntityKind::Run,
                id: run.run_id,
            }
            .into());
        }
        tables.runs.insert(run.run_id, run.clone());
        Ok(())
    }

    async fn complete_run(
        &self,
        run_id: EntityId,
        completion: RunCompletion,
    ) -> RaveResult<AgentRun> {
        let mut tables = self.write()?;

        // Validate everything before the first mutation.
        let status = tables
            .runs
            .get(&run_id)
            .map(|r| r.status)
            .ok_or(StorageError::NotFound {
                entity: EntityKind::Run,
                id: run_id,
            })?;
        if status != RunStatus::Running {
            return Err(StorageError::InvalidState {
                entity: EntityKind::Run,
                id: run_id,
                reason: format!("run is already {}", status),
            }
            .into());
        }
        if let Some(insight) = &completion.insight {
            if tables.insights.contains_key(&insight.insight_id) {
                return Err(StorageError::AlreadyExists {
                    entity: EntityKind::Insight,
                    id: insight.insight_id,
                }
                .into());
            }
        }
        if let Some(issue) = completion
            .issues
            .iter()
            .find(|i| tables.issues.contains_key(&i.issue_id))
        {
            return Err(StorageError::AlreadyExists {
                entity: EntityKind::Issue,
                id: issue.issue_id,
            }
            .into());
        }
        if let Some(candidate) = completion
            .merge_candidates
            .iter()
            .find(|c| tables.merge_candidates.contains_key(&c.candidate_id))
        {
            return Err(StorageError::AlreadyExists {
                entity: EntityKind::MergeCandidate,
                id: candidate.candidate_id,
            }
            .into());
        }

        let finished = {
            let run = tables.runs.get_mut(&run_id).ok_or(StorageError::NotFound {
                entity: EntityKind::Run,
                id: run_id,
            })?;
            run.finish(&completion, Utc::now());
            run.clone()
        };
        let RunCompletion {
            insight,
            issues,
            merge_candidates,
            ..
        } = completion;
        if let Some(insight) = insight {
            tables.insights.insert(insight.insight_id, insight);
        }
        for issue in issues {
            tables.issues.insert(issue.issue_id, issue);
        }
        for candidate in merge_candidates {
            tables.merge_candidates.insert(candidate.candidate_id, candidate);
        }
        Ok(finished)
    }

    async fn apply_issue_fix(&self, issue_id: EntityId, expected_version: i64) -> RaveResult<Issue> {
        let mut tables = self.write()?;
        let issue = tables.issues.get_mut(&issue_id).ok_or(StorageError::NotFound {
            entity: EntityKind::Issue,
            id: issue_id,
        })?;
        check_fixable(issue, expected_version)?;
        issue.fix_applied = true;
        issue.version += 1;
        issue.updated_at = Utc::now();
        Ok(issue.clone())
    }

    async fn resolve_merge_candidate(
        &self,
        candidate_id: EntityId,
        approve: bool,
    ) -> RaveResult<MergeCandidate> {
        let mut tables = self.write()?;
        let candidate = tables
            .merge_candidates
            .get_mut(&candidate_id)
            .ok_or(StorageError::NotFound {
                entity: EntityKind::MergeCandidate,
                id: candidate_id,
            })?;
        check_pending(candidate)?;
        candidate.status = if approve {
            MergeStatus::Approved
        } else {
            MergeStatus::Rejected
        };
        Ok(candidate.clone())
    }
}

/// Shared by both stores: version first, then state.
pub(crate) fn check_fixable(issue: &Issue, expected_version: i64) -> RaveResult<()> {
    if issue.version != expected_version {
        return Err(StorageError::VersionConflict {
            entity: EntityKind::Issue,
            id: issue.issue_id,
            expected: expected_version,
            actual: issue.version,
        }
        .into());
    }
    if !issue.auto_fixable {
        return Err(StorageError::InvalidState {
            entity: EntityKind::Issue,
            id: issue.issue_id,
            reason: "issue is not auto-fixable".to_string(),
        }
        .into());
    }
    if issue.fix_applied {
        return Err(StorageError::InvalidState {
            entity: EntityKind::Issue,
            id: issue.issue_id,
            reason: "fix already applied".to_string(),
        }
        .into());
    }
    Ok(())
}

pub(crate) fn check_pending(candidate: &MergeCandidate) -> RaveResult<()> {
    if candidate.status != MergeStatus::Pending {
        return Err(StorageError::InvalidState {
            entity: EntityKind::MergeCandidate,
            id: candidate.candidate_id,
            reason: format!("candidate is already {}", candidate.status),
        }
        .into());
    }
    Ok(())
}
