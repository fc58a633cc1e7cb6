//! PostgreSQL agent store
//!
//! Pooled with deadpool-postgres. `complete_run` and `apply_issue_fix` run
//! inside a transaction and lock the row they change (`FOR UPDATE`).

use crate::memory::{check_fixable, check_pending};
use crate::{AgentStore, TABLES};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use rave_core::{
    AgentFunction, AgentRun, ArtistRecord, ArtistSource, ConfigError, DoggyStats, EntityId,
    EntityKind, EnumParseError, Insight, Issue, MergeCandidate, MergeStatus, RaveError,
    RaveResult, RunCompletion, RunStatus, SourceRecord, StorageError, TableStat,
};
use std::str::FromStr;
use std::time::Duration;
use tokio_postgres::types::FromSql;
use tokio_postgres::{NoTls, Row};

/// Schema applied by [`PgStore::migrate`].
pub const SCHEMA_SQL: &str = include_str!("../sql/schema.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// How long to wait for a pooled connection
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "rave".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Environment variables: `RAVE_DB_HOST`, `RAVE_DB_PORT`, `RAVE_DB_NAME`,
    /// `RAVE_DB_USER`, `RAVE_DB_PASSWORD`, `RAVE_DB_POOL_SIZE`,
    /// `RAVE_DB_TIMEOUT_SECS`.
    pub fn from_env() -> RaveResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> RaveResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Ok(Self {
            host: get("RAVE_DB_HOST").unwrap_or(defaults.host),
            port: parse_var("RAVE_DB_PORT", get("RAVE_DB_PORT"), defaults.port)?,
            dbname: get("RAVE_DB_NAME").unwrap_or(defaults.dbname),
            user: get("RAVE_DB_USER").unwrap_or(defaults.user),
            password: lookup("RAVE_DB_PASSWORD").unwrap_or_default(),
            max_size: parse_var("RAVE_DB_POOL_SIZE", get("RAVE_DB_POOL_SIZE"), defaults.max_size)?,
            timeout: Duration::from_secs(parse_var(
                "RAVE_DB_TIMEOUT_SECS",
                get("RAVE_DB_TIMEOUT_SECS"),
                defaults.timeout.as_secs(),
            )?),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> RaveResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut pool = PoolConfig::new(self.max_size.max(1));
        pool.timeouts.wait = Some(self.timeout);
        pool.timeouts.create = Some(self.timeout);
        cfg.pool = Some(pool);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| backend(format!("Failed to create pool: {}", e)))
    }
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("max_size", &self.max_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn parse_var<T: FromStr>(field: &str, raw: Option<String>, default: T) -> RaveResult<T> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| {
            ConfigError::InvalidValue {
                field: field.to_string(),
                value,
                reason: "not a valid number".to_string(),
            }
            .into()
        }),
    }
}

// ============================================================================
// ROW CONVERSION
// ============================================================================

fn backend(reason: impl std::fmt::Display) -> RaveError {
    StorageError::Backend {
        reason: reason.to_string(),
    }
    .into()
}

fn col<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> RaveResult<T> {
    row.try_get(name).map_err(backend)
}

fn enum_col<T>(row: &Row, name: &str) -> RaveResult<T>
where
    T: FromStr<Err = EnumParseError>,
{
    let raw: String = col(row, name)?;
    raw.parse().map_err(backend)
}

const RUN_COLUMNS: &str =
    "run_id, function, action, status, started_at, finished_at, stats, result, error";
const INSIGHT_COLUMNS: &str = "insight_id, run_id, function, kind, model, confidence, analysis, \
     data_snapshot, result, expires_at, created_at";
const ISSUE_COLUMNS: &str = "issue_id, run_id, code, severity, description, auto_fixable, \
     fix_applied, version, created_at, updated_at";
const CANDIDATE_COLUMNS: &str = "candidate_id, run_id, left_source, left_record_id, left_name, \
     right_source, right_record_id, right_name, confidence, reasoning, status, created_at";

fn run_from_row(row: &Row) -> RaveResult<AgentRun> {
    Ok(AgentRun {
        run_id: col(row, "run_id")?,
        function: enum_col(row, "function")?,
        action: col(row, "action")?,
        status: enum_col(row, "status")?,
        started_at: col(row, "started_at")?,
        finished_at: col(row, "finished_at")?,
        stats: col(row, "stats")?,
        result: col(row, "result")?,
        error: col(row, "error")?,
    })
}

fn insight_from_row(row: &Row) -> RaveResult<Insight> {
    Ok(Insight {
        insight_id: col(row, "insight_id")?,
        run_id: col(row, "run_id")?,
        function: enum_col(row, "function")?,
        kind: enum_col(row, "kind")?,
        model: col(row, "model")?,
        confidence: col(row, "confidence")?,
        analysis: col(row, "analysis")?,
        data_snapshot: col(row, "data_snapshot")?,
        result: col(row, "result")?,
        expires_at: col(row, "expires_at")?,
        created_at: col(row, "created_at")?,
    })
}

fn issue_from_row(row: &Row) -> RaveResult<Issue> {
    Ok(Issue {
        issue_id: col(row, "issue_id")?,
        run_id: col(row, "run_id")?,
        code: col(row, "code")?,
        severity: enum_col(row, "severity")?,
        description: col(row, "description")?,
        auto_fixable: col(row, "auto_fixable")?,
        fix_applied: col(row, "fix_applied")?,
        version: col(row, "version")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn candidate_from_row(row: &Row) -> RaveResult<MergeCandidate> {
    Ok(MergeCandidate {
        candidate_id: col(row, "candidate_id")?,
        run_id: col(row, "run_id")?,
        left: SourceRecord {
            source: enum_col(row, "left_source")?,
            record_id: col(row, "left_record_id")?,
            name: col(row, "left_name")?,
        },
        right: SourceRecord {
            source: enum_col(row, "right_source")?,
            record_id: col(row, "right_record_id")?,
            name: col(row, "right_name")?,
        },
        confidence: col(row, "confidence")?,
        reasoning: col(row, "reasoning")?,
        status: enum_col(row, "status")?,
        created_at: col(row, "created_at")?,
    })
}

fn artist_from_row(source: ArtistSource, row: &Row) -> RaveResult<ArtistRecord> {
    Ok(ArtistRecord {
        source,
        record_id: col(row, "record_id")?,
        name: col(row, "name")?,
        country: col(row, "country")?,
        genres: col(row, "genres")?,
    })
}

fn stats_from_row(row: &Row) -> RaveResult<DoggyStats> {
    Ok(DoggyStats {
        day: col(row, "day")?,
        views: col(row, "views")?,
        shares: col(row, "shares")?,
        downloads: col(row, "downloads")?,
        unique_visitors: col(row, "unique_visitors")?,
    })
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// ============================================================================
// STORE
// ============================================================================

/// Store backed by a deadpool-postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> RaveResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn conn(&self) -> RaveResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(backend)
    }

    /// Apply [`SCHEMA_SQL`]. Safe to run repeatedly.
    pub async fn migrate(&self) -> RaveResult<()> {
        let conn = self.conn().await?;
        conn.batch_execute(SCHEMA_SQL).await.map_err(backend)?;
        tracing::info!("schema applied");
        Ok(())
    }

    /// Insert or replace source artists.
    pub async fn upsert_artists(&self, records: &[ArtistRecord]) -> RaveResult<()> {
        let conn = self.conn().await?;
        for record in records {
            let sql = format!(
                "INSERT INTO {} (record_id, name, country, genres) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (record_id) DO UPDATE SET name = EXCLUDED.name, \
                 country = EXCLUDED.country, genres = EXCLUDED.genres",
                record.source.table_name()
            );
            conn.execute(
                sql.as_str(),
                &[&record.record_id, &record.name, &record.country, &record.genres],
            )
            .await
            .map_err(backend)?;
        }
        Ok(())
    }

    /// Insert or replace daily stats.
    pub async fn upsert_doggy_stats(&self, stats: &[DoggyStats]) -> RaveResult<()> {
        let conn = self.conn().await?;
        for day in stats {
            conn.execute(
                "INSERT INTO doggy_daily_stats (day, views, shares, downloads, unique_visitors) \
                 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (day) DO UPDATE SET \
                 views = EXCLUDED.views, shares = EXCLUDED.shares, \
                 downloads = EXCLUDED.downloads, unique_visitors = EXCLUDED.unique_visitors",
                &[&day.day, &day.views, &day.shares, &day.downloads, &day.unique_visitors],
            )
            .await
            .map_err(backend)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("pool_size", &self.pool_size())
            .finish()
    }
}

#[async_trait]
impl AgentStore for PgStore {
    async fn health_check(&self) -> RaveResult<()> {
        let conn = self.conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(backend)?;
        Ok(())
    }

    async fn table_stats(&self) -> RaveResult<Vec<TableStat>> {
        let conn = self.conn().await?;
        let mut stats = Vec::with_capacity(TABLES.len());
        for table in TABLES {
            // Table names come from a fixed list, never from input.
            let row = conn
                .query_one(format!("SELECT count(*) AS rows FROM {}", table).as_str(), &[])
                .await
                .map_err(backend)?;
            stats.push(TableStat {
                table: table.to_string(),
                rows: col(&row, "rows")?,
            });
        }
        Ok(stats)
    }

    async fn list_artists(&self, source: ArtistSource) -> RaveResult<Vec<ArtistRecord>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT record_id, name, country, genres FROM {} ORDER BY record_id",
            source.table_name()
        );
        let rows = conn.query(sql.as_str(), &[]).await.map_err(backend)?;
        rows.iter().map(|row| artist_from_row(source, row)).collect()
    }

    async fn doggy_stats(&self, days: u32) -> RaveResult<Vec<DoggyStats>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT day, views, shares, downloads, unique_visitors FROM doggy_daily_stats \
                 ORDER BY day DESC LIMIT $1",
                &[&i64::from(days)],
            )
            .await
            .map_err(backend)?;
        let mut stats = rows.iter().map(stats_from_row).collect::<RaveResult<Vec<_>>>()?;
        stats.reverse();
        Ok(stats)
    }

    async fn get_run(&self, run_id: EntityId) -> RaveResult<Option<AgentRun>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {} FROM agent_runs WHERE run_id = $1", RUN_COLUMNS);
        let row = conn.query_opt(sql.as_str(), &[&run_id]).await.map_err(backend)?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn list_runs(&self, limit: usize) -> RaveResult<Vec<AgentRun>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM agent_runs ORDER BY started_at DESC, run_id DESC LIMIT $1",
            RUN_COLUMNS
        );
        let rows = conn
            .query(sql.as_str(), &[&limit_param(limit)])
            .await
            .map_err(backend)?;
        rows.iter().map(run_from_row).collect()
    }

    async fn list_insights(
        &self,
        function: Option<AgentFunction>,
        limit: usize,
    ) -> RaveResult<Vec<Insight>> {
        let conn = self.conn().await?;
        let function = function.map(|f| f.as_db_str());
        let sql = format!(
            "SELECT {} FROM agent_insights WHERE ($1::TEXT IS NULL OR function = $1) \
             ORDER BY created_at DESC, insight_id DESC LIMIT $2",
            INSIGHT_COLUMNS
        );
        let rows = conn
            .query(sql.as_str(), &[&function, &limit_param(limit)])
            .await
            .map_err(backend)?;
        rows.iter().map(insight_from_row).collect()
    }

    async fn get_issue(&self, issue_id: EntityId) -> RaveResult<Option<Issue>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {} FROM agent_issues WHERE issue_id = $1", ISSUE_COLUMNS);
        let row = conn.query_opt(sql.as_str(), &[&issue_id]).await.map_err(backend)?;
        row.as_ref().map(issue_from_row).transpose()
    }

    async fn list_issues(&self, open_only: bool) -> RaveResult<Vec<Issue>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM agent_issues WHERE (NOT $1 OR NOT fix_applied) \
             ORDER BY created_at DESC, issue_id DESC",
            ISSUE_COLUMNS
        );
        let rows = conn.query(sql.as_str(), &[&open_only]).await.map_err(backend)?;
        rows.iter().map(issue_from_row).collect()
    }

    async fn list_merge_candidates(
        &self,
        status: Option<MergeStatus>,
    ) -> RaveResult<Vec<MergeCandidate>> {
        let conn = self.conn().await?;
        let status = status.map(|s| s.as_db_str());
        let sql = format!(
            "SELECT {} FROM merge_candidates WHERE ($1::TEXT IS NULL OR status = $1) \
             ORDER BY confidence DESC, candidate_id",
            CANDIDATE_COLUMNS
        );
        let rows = conn.query(sql.as_str(), &[&status]).await.map_err(backend)?;
        rows.iter().map(candidate_from_row).collect()
    }

    #[tracing::instrument(skip(self, run), fields(run_id = %run.run_id, function = %run.function))]
    async fn begin_run(&self, run: &AgentRun) -> RaveResult<()> {
        let conn = self.conn().await?;
        let inserted = conn
            .execute(
                "INSERT INTO agent_runs (run_id, function, action, status, started_at, \
                 finished_at, stats, result, error) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 ON CONFLICT (run_id) DO NOTHING",
                &[
                    &run.run_id,
                    &run.function.as_db_str(),
                    &run.action,
                    &run.status.as_db_str(),
                    &run.started_at,
                    &run.finished_at,
                    &run.stats,
                    &run.result,
                    &run.error,
                ],
            )
            .await
            .map_err(backend)?;
        if inserted == 0 {
            return Err(StorageError::AlreadyExists {
                entity: EntityKind::Run,
                id: run.run_id,
            }
            .into());
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, completion), fields(status = %completion.status))]
    async fn complete_run(
        &self,
        run_id: EntityId,
        completion: RunCompletion,
    ) -> RaveResult<AgentRun> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(backend)?;

        let current = tx
            .query_opt("SELECT status FROM agent_runs WHERE run_id = $1 FOR UPDATE", &[&run_id])
            .await
            .map_err(backend)?
            .ok_or(StorageError::NotFound {
                entity: EntityKind::Run,
                id: run_id,
            })?;
        let status: RunStatus = enum_col(&current, "status")?;
        if status != RunStatus::Running {
            return Err(StorageError::InvalidState {
                entity: EntityKind::Run,
                id: run_id,
                reason: format!("run is already {}", status),
            }
            .into());
        }

        let sql = format!(
            "UPDATE agent_runs SET status = $2, finished_at = now(), result = $3, stats = $4, \
             error = $5 WHERE run_id = $1 RETURNING {}",
            RUN_COLUMNS
        );
        let row = tx
            .query_one(
                sql.as_str(),
                &[
                    &run_id,
                    &completion.status.as_db_str(),
                    &completion.result,
                    &completion.stats,
                    &completion.error,
                ],
            )
            .await
            .map_err(backend)?;
        let finished = run_from_row(&row)?;

        if let Some(i) = &completion.insight {
            tx.execute(
                "INSERT INTO agent_insights (insight_id, run_id, function, kind, model, \
                 confidence, analysis, data_snapshot, result, expires_at, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                &[
                    &i.insight_id,
                    &i.run_id,
                    &i.function.as_db_str(),
                    &i.kind.as_db_str(),
                    &i.model,
                    &i.confidence,
                    &i.analysis,
                    &i.data_snapshot,
                    &i.result,
                    &i.expires_at,
                    &i.created_at,
                ],
            )
            .await
            .map_err(backend)?;
        }

        for issue in &completion.issues {
            tx.execute(
                "INSERT INTO agent_issues (issue_id, run_id, code, severity, description, \
                 auto_fixable, fix_applied, version, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                &[
                    &issue.issue_id,
                    &issue.run_id,
                    &issue.code,
                    &issue.severity.as_db_str(),
                    &issue.description,
                    &issue.auto_fixable,
                    &issue.fix_applied,
                    &issue.version,
                    &issue.created_at,
                    &issue.updated_at,
                ],
            )
            .await
            .map_err(backend)?;
        }

        for c in &completion.merge_candidates {
            tx.execute(
                "INSERT INTO merge_candidates (candidate_id, run_id, left_source, left_record_id, \
                 left_name, right_source, right_record_id, right_name, confidence, reasoning, \
                 status, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
                &[
                    &c.candidate_id,
                    &c.run_id,
                    &c.left.source.as_db_str(),
                    &c.left.record_id,
                    &c.left.name,
                    &c.right.source.as_db_str(),
                    &c.right.record_id,
                    &c.right.name,
                    &c.confidence,
                    &c.reasoning,
                    &c.status.as_db_str(),
                    &c.created_at,
                ],
            )
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(finished)
    }

    #[tracing::instrument(skip(self))]
    async fn apply_issue_fix(&self, issue_id: EntityId, expected_version: i64) -> RaveResult<Issue> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(backend)?;

        let sql = format!(
            "SELECT {} FROM agent_issues WHERE issue_id = $1 FOR UPDATE",
            ISSUE_COLUMNS
        );
        let row = tx
            .query_opt(sql.as_str(), &[&issue_id])
            .await
            .map_err(backend)?
            .ok_or(StorageError::NotFound {
                entity: EntityKind::Issue,
                id: issue_id,
            })?;
        check_fixable(&issue_from_row(&row)?, expected_version)?;

        let sql = format!(
            "UPDATE agent_issues SET fix_applied = TRUE, version = version + 1, \
             updated_at = now() WHERE issue_id = $1 RETURNING {}",
            ISSUE_COLUMNS
        );
        let row = tx.query_one(sql.as_str(), &[&issue_id]).await.map_err(backend)?;
        let updated = issue_from_row(&row)?;
        tx.commit().await.map_err(backend)?;
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    async fn resolve_merge_candidate(
        &self,
        candidate_id: EntityId,
        approve: bool,
    ) -> RaveResult<MergeCandidate> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(backend)?;

        let sql = format!(
            "SELECT {} FROM merge_candidates WHERE candidate_id = $1 FOR UPDATE",
            CANDIDATE_COLUMNS
        );
        let row = tx
            .query_opt(sql.as_str(), &[&candidate_id])
            .await
            .map_err(backend)?
            .ok_or(StorageError::NotFound {
                entity: EntityKind::MergeCandidate,
                id: candidate_id,
            })?;
        check_pending(&candidate_from_row(&row)?)?;

        let status = if approve {
            MergeStatus::Approved
        } else {
            MergeStatus::Rejected
        };
        let sql = format!(
            "UPDATE merge_candidates SET status = $2 WHERE candidate_id = $1 RETURNING {}",
            CANDIDATE_COLUMNS
        );
        let row = tx
            .query_one(sql.as_str(), &[&candidate_id, &status.as_db_str()])
            .await
            .map_err(backend)?;
        let resolved = candidate_from_row(&row)?;
        tx.commit().await.map_err(backend)?;
        Ok(resolved)
    }
}
