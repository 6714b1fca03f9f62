//! SQLite storage layer for repository snapshots
//!
//! This module handles persistent storage of:
//! - Repositories and their branches
//! - Append-only analysis snapshots
//! - Historical metric time series
//! - Cache bookkeeping entries
//!
//! The store does not arbitrate between concurrent writers of the same
//! (repository, branch) key. At most one writer per key is assumed, enforced
//! by SQLite's transaction isolation for a single database file.

mod cleanup;
mod schema;

pub use cleanup::{CleanupOptions, CleanupReport};
pub use schema::SCHEMA;

use crate::error::{Result, SyncError};
use crate::model::{
    Analysis, AnalysisSnapshot, Branch, BranchInfo, CacheEntry, HistoricalMetric, Repository,
    RepositoryFields,
};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Database connection wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

/// Format a timestamp for storage
pub(crate) fn to_sql_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a stored timestamp
pub(crate) fn from_sql_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn from_sql_ts_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(from_sql_ts).transpose()
}

/// Start of the window `age` long that ends at `now`; the earliest representable
/// time when the window reaches past it
pub(crate) fn age_cutoff(now: DateTime<Utc>, age: Option<Duration>) -> DateTime<Utc> {
    age.and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Cutoff `amount` units before now, rejecting negative ages
pub(crate) fn checked_cutoff(
    field: &str,
    amount: i64,
    unit: fn(i64) -> Option<Duration>,
) -> Result<String> {
    if amount < 0 {
        return Err(SyncError::validation(format!("{field} must not be negative")));
    }
    Ok(to_sql_ts(&age_cutoff(Utc::now(), unit(amount))))
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SyncError::validation(format!("{field} is required")));
    }
    Ok(())
}

const REPOSITORY_COLUMNS: &str = "id, url, name, owner, default_branch, total_size, file_count, created_at, last_analyzed";

const BRANCH_COLUMNS: &str =
    "id, repo_id, name, commit_sha, is_default, last_commit_date, last_analyzed, updated_at";

const ANALYSIS_COLUMNS: &str = "a.id, a.branch_id, a.repo_id, b.name, a.commit_sha, a.analysis_timestamp, \
     a.file_tree, a.technologies, a.metrics, a.scores, a.issues, a.ai_summary, \
     a.ai_grading_explanation, a.created_at";

const CACHE_COLUMNS: &str = "id, cache_key, repo_id, branch_name, commit_sha, path, size_bytes, \
     created_at, last_accessed, expires_at, access_count";

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn initialize(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SyncError::Poisoned)
    }

    // ==================== Repositories ====================

    /// Insert a repository or update its mutable fields
    ///
    /// Supplying `analyzed_at` advances `last_analyzed`; it never moves backwards.
    pub fn upsert_repository(&self, id: &str, fields: &RepositoryFields) -> Result<Repository> {
        require("repository id", id)?;

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO repositories (
                id, url, name, owner, default_branch, total_size, file_count,
                created_at, last_analyzed
            ) VALUES (?1, COALESCE(?2, ''), ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                url = COALESCE(?2, url),
                name = COALESCE(?3, name),
                owner = COALESCE(?4, owner),
                default_branch = COALESCE(?5, default_branch),
                total_size = COALESCE(?6, total_size),
                file_count = COALESCE(?7, file_count),
                last_analyzed = CASE
                    WHEN ?9 IS NOT NULL AND (last_analyzed IS NULL OR last_analyzed < ?9) THEN ?9
                    ELSE last_analyzed
                END
            "#,
            params![
                id,
                fields.url,
                fields.name,
                fields.owner,
                fields.default_branch,
                fields.total_size,
                fields.file_count,
                to_sql_ts(&Utc::now()),
                fields.analyzed_at.as_ref().map(to_sql_ts),
            ],
        )?;

        query_repository(&conn, id)?.ok_or_else(|| SyncError::not_found("repository", id))
    }

    /// Get a repository by id
    pub fn get_repository(&self, id: &str) -> Result<Option<Repository>> {
        let conn = self.conn()?;
        query_repository(&conn, id)
    }

    /// All repositories, ordered by id
    pub fn list_repositories(&self) -> Result<Vec<Repository>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPOSITORY_COLUMNS} FROM repositories ORDER BY id"
        ))?;

        let rows = stmt.query_map([], RepositoryRow::from_row)?;

        let mut repos = Vec::new();
        for row in rows {
            repos.push(row?.into_repository()?);
        }

        Ok(repos)
    }

    /// Delete a repository together with its branches and analyses
    pub fn delete_repository(&self, id: &str) -> Result<bool> {
        let count = self
            .conn()?
            .execute("DELETE FROM repositories WHERE id = ?1", params![id])?;

        Ok(count > 0)
    }

    // ==================== Branches ====================

    /// Insert a branch or update it, keyed on (repository, name)
    ///
    /// A missing `last_commit_date` or `last_analyzed` keeps the stored value.
    pub fn upsert_branch(&self, repo_id: &str, info: &BranchInfo) -> Result<Branch> {
        require("repository id", repo_id)?;
        require("branch name", &info.name)?;
        require("commit sha", &info.commit_sha)?;

        let conn = self.conn()?;
        if query_repository(&conn, repo_id)?.is_none() {
            return Err(SyncError::not_found("repository", repo_id));
        }

        let now = to_sql_ts(&Utc::now());
        conn.execute(
            r#"
            INSERT INTO branches (
                repo_id, name, commit_sha, is_default, last_commit_date,
                last_analyzed, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            ON CONFLICT(repo_id, name) DO UPDATE SET
                commit_sha = excluded.commit_sha,
                is_default = excluded.is_default,
                last_commit_date = COALESCE(excluded.last_commit_date, last_commit_date),
                last_analyzed = COALESCE(excluded.last_analyzed, last_analyzed),
                updated_at = excluded.updated_at
            "#,
            params![
                repo_id,
                info.name,
                info.commit_sha,
                info.is_default,
                info.last_commit_date.as_ref().map(to_sql_ts),
                info.last_analyzed.as_ref().map(to_sql_ts),
                now,
            ],
        )?;

        query_branch(&conn, repo_id, &info.name)?
            .ok_or_else(|| SyncError::not_found("branch", format!("{repo_id}:{}", info.name)))
    }

    /// Get a branch by repository and name
    pub fn get_branch(&self, repo_id: &str, name: &str) -> Result<Option<Branch>> {
        let conn = self.conn()?;
        query_branch(&conn, repo_id, name)
    }

    /// All branches of a repository, ordered by name
    pub fn get_branches(&self, repo_id: &str) -> Result<Vec<Branch>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {BRANCH_COLUMNS} FROM branches WHERE repo_id = ?1 ORDER BY name"
        ))?;

        let rows = stmt.query_map(params![repo_id], BranchRow::from_row)?;

        let mut branches = Vec::new();
        for row in rows {
            branches.push(row?.into_branch()?);
        }

        Ok(branches)
    }

    /// Set (or clear, with `None`) the branch's last-analyzed pointer
    ///
    /// Returns false if the branch does not exist.
    pub fn update_branch_analysis_time(
        &self,
        repo_id: &str,
        name: &str,
        analyzed_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let count = self.conn()?.execute(
            "UPDATE branches SET last_analyzed = ?1, updated_at = ?2 WHERE repo_id = ?3 AND name = ?4",
            params![
                analyzed_at.as_ref().map(to_sql_ts),
                to_sql_ts(&Utc::now()),
                repo_id,
                name
            ],
        )?;

        Ok(count > 0)
    }

    // ==================== Analyses ====================

    /// Append an analysis snapshot and return its row id
    ///
    /// The branch row is created on first analysis, with its pointer set to
    /// the snapshot's timestamp. Existing branch pointers are left alone.
    pub fn insert_analysis(&self, snapshot: &AnalysisSnapshot) -> Result<i64> {
        require("repository id", &snapshot.repo_id)?;
        require("branch name", &snapshot.branch_name)?;
        require("commit sha", &snapshot.commit_sha)?;
        let analyzed_at = snapshot
            .analysis_timestamp
            .ok_or_else(|| SyncError::validation("analysis timestamp is required"))?;

        let file_tree = serde_json::to_string(&snapshot.file_tree)?;
        let technologies = serde_json::to_string(&snapshot.technologies)?;
        let metrics = serde_json::to_string(&snapshot.metrics)?;
        let scores = serde_json::to_string(&snapshot.scores)?;
        let issues = serde_json::to_string(&snapshot.issues)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if query_repository(&tx, &snapshot.repo_id)?.is_none() {
            return Err(SyncError::not_found("repository", &snapshot.repo_id));
        }

        let now = to_sql_ts(&Utc::now());
        let analyzed_at = to_sql_ts(&analyzed_at);

        let branch_id = match query_branch(&tx, &snapshot.repo_id, &snapshot.branch_name)? {
            Some(branch) => branch.id,
            None => {
                tx.execute(
                    r#"
                    INSERT INTO branches (
                        repo_id, name, commit_sha, is_default, last_commit_date,
                        last_analyzed, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, 0, NULL, ?4, ?5, ?5)
                    "#,
                    params![
                        snapshot.repo_id,
                        snapshot.branch_name,
                        snapshot.commit_sha,
                        analyzed_at,
                        now
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.execute(
            r#"
            INSERT INTO analyses (
                repo_id, branch_id, commit_sha, analysis_timestamp, file_tree,
                technologies, metrics, scores, issues, ai_summary,
                ai_grading_explanation, overall_score, overall_grade, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                snapshot.repo_id,
                branch_id,
                snapshot.commit_sha,
                analyzed_at,
                file_tree,
                technologies,
                metrics,
                scores,
                issues,
                snapshot.ai_summary,
                snapshot.ai_grading_explanation,
                snapshot.scores.overall_score,
                snapshot.scores.overall_grade,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.commit()?;
        Ok(id)
    }

    /// The most recent analysis of a branch, optionally at an exact commit
    pub fn get_latest_analysis(
        &self,
        repo_id: &str,
        branch_name: &str,
        commit_sha: Option<&str>,
    ) -> Result<Option<Analysis>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    r#"
                    SELECT {ANALYSIS_COLUMNS}
                    FROM analyses a JOIN branches b ON a.branch_id = b.id
                    WHERE b.repo_id = ?1 AND b.name = ?2
                      AND (?3 IS NULL OR a.commit_sha = ?3)
                    ORDER BY a.analysis_timestamp DESC, a.id DESC
                    LIMIT 1
                    "#
                ),
                params![repo_id, branch_name, commit_sha],
                AnalysisRow::from_row,
            )
            .optional()?;

        row.map(AnalysisRow::into_analysis).transpose()
    }

    /// Up to `limit` analyses of a branch, newest first
    pub fn get_analysis_history(
        &self,
        repo_id: &str,
        branch_name: &str,
        limit: usize,
    ) -> Result<Vec<Analysis>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {ANALYSIS_COLUMNS}
            FROM analyses a JOIN branches b ON a.branch_id = b.id
            WHERE b.repo_id = ?1 AND b.name = ?2
            ORDER BY a.analysis_timestamp DESC, a.id DESC
            LIMIT ?3
            "#
        ))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![repo_id, branch_name, limit], AnalysisRow::from_row)?;

        let mut analyses = Vec::new();
        for row in rows {
            analyses.push(row?.into_analysis()?);
        }

        Ok(analyses)
    }

    // ==================== Historical Metrics ====================

    /// Append one metric data point
    pub fn record_historical_metric(
        &self,
        branch_id: i64,
        metric_name: &str,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<i64> {
        require("metric name", metric_name)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO historical_metrics (branch_id, metric_name, value, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![branch_id, metric_name, value, to_sql_ts(&timestamp)],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Project the numeric fields of a snapshot into the metric time series
    pub fn record_analysis_metrics(&self, branch_id: i64, snapshot: &AnalysisSnapshot) -> Result<usize> {
        let timestamp = snapshot
            .analysis_timestamp
            .ok_or_else(|| SyncError::validation("analysis timestamp is required"))?;
        let timestamp = to_sql_ts(&timestamp);

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let values = snapshot.metric_values();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO historical_metrics (branch_id, metric_name, value, timestamp) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (name, value) in &values {
                stmt.execute(params![branch_id, name, value, timestamp])?;
            }
        }

        tx.commit()?;
        Ok(values.len())
    }

    /// Metric points of a branch recorded within the last `days_back` days, oldest first
    pub fn get_historical_metrics(
        &self,
        repo_id: &str,
        branch_name: &str,
        days_back: i64,
    ) -> Result<Vec<HistoricalMetric>> {
        let cutoff = checked_cutoff("days back", days_back, Duration::try_days)?;

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT m.id, m.branch_id, m.metric_name, m.value, m.timestamp
            FROM historical_metrics m JOIN branches b ON m.branch_id = b.id
            WHERE b.repo_id = ?1 AND b.name = ?2 AND m.timestamp >= ?3
            ORDER BY m.timestamp, m.id
            "#,
        )?;

        let rows = stmt.query_map(params![repo_id, branch_name, cutoff], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut metrics = Vec::new();
        for row in rows {
            let (id, branch_id, metric_name, value, timestamp) = row?;
            metrics.push(HistoricalMetric {
                id,
                branch_id,
                metric_name,
                value,
                timestamp: from_sql_ts(&timestamp)?,
            });
        }

        Ok(metrics)
    }

    // ==================== Cache Entries ====================

    /// Register a cached artifact, or bump the access count of a known one
    pub fn register_cache_entry(&self, entry: &NewCacheEntry) -> Result<CacheEntry> {
        require("cache key", &entry.cache_key)?;
        require("repository id", &entry.repo_id)?;

        let now = Utc::now();
        let expires_at = match entry.ttl_hours {
            Some(hours) => {
                let expires = Duration::try_hours(hours)
                    .and_then(|ttl| now.checked_add_signed(ttl))
                    .ok_or_else(|| SyncError::validation(format!("cache ttl of {hours} hours is out of range")))?;
                Some(to_sql_ts(&expires))
            }
            None => None,
        };
        let now = to_sql_ts(&now);

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO cache_entries (
                cache_key, repo_id, branch_name, commit_sha, path, size_bytes,
                created_at, last_accessed, expires_at, access_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8, 1)
            ON CONFLICT(cache_key) DO UPDATE SET
                path = excluded.path,
                size_bytes = excluded.size_bytes,
                last_accessed = excluded.last_accessed,
                expires_at = excluded.expires_at,
                access_count = access_count + 1
            "#,
            params![
                entry.cache_key,
                entry.repo_id,
                entry.branch_name,
                entry.commit_sha,
                entry.path,
                entry.size_bytes,
                now,
                expires_at,
            ],
        )?;

        query_cache_entry(&conn, &entry.cache_key)?
            .ok_or_else(|| SyncError::not_found("cache entry", &entry.cache_key))
    }

    /// Look up a cache entry, recording the access
    pub fn get_cache_entry(&self, cache_key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE cache_entries SET last_accessed = ?1, access_count = access_count + 1 WHERE cache_key = ?2",
            params![to_sql_ts(&Utc::now()), cache_key],
        )?;

        query_cache_entry(&conn, cache_key)
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
            Ok(n as usize)
        };

        let repositories = count("repositories")?;
        let branches = count("branches")?;
        let analyses = count("analyses")?;
        let historical_metrics = count("historical_metrics")?;
        let cache = query_cache_stats(&conn)?;

        Ok(DatabaseStats {
            repositories,
            branches,
            analyses,
            historical_metrics,
            cache_entries: cache.entries,
            cache_bytes: cache.total_bytes,
        })
    }

    /// Size of the cache bookkeeping, counting entries past their expiry
    pub fn cache_stats(&self) -> Result<CacheStats> {
        let conn = self.conn()?;
        query_cache_stats(&conn)
    }
}

fn query_cache_stats(conn: &Connection) -> Result<CacheStats> {
    let now = to_sql_ts(&Utc::now());
    let (entries, total_bytes, expired): (i64, i64, i64) = conn.query_row(
        r#"
        SELECT COUNT(*),
               COALESCE(SUM(size_bytes), 0),
               COALESCE(SUM(CASE WHEN expires_at IS NOT NULL AND expires_at <= ?1 THEN 1 ELSE 0 END), 0)
        FROM cache_entries
        "#,
        params![now],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    Ok(CacheStats {
        entries: entries.max(0) as usize,
        total_bytes: total_bytes.max(0) as u64,
        expired: expired.max(0) as usize,
    })
}

/// Cache bookkeeping totals
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub expired: usize,
}

/// A cache artifact to register
#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    pub cache_key: String,
    pub repo_id: String,
    pub branch_name: String,
    pub commit_sha: String,
    pub path: Option<String>,
    pub size_bytes: i64,
    /// Expire the entry this many hours after registration
    pub ttl_hours: Option<i64>,
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseStats {
    pub repositories: usize,
    pub branches: usize,
    pub analyses: usize,
    pub historical_metrics: usize,
    pub cache_entries: usize,
    pub cache_bytes: u64,
}

fn query_repository(conn: &Connection, id: &str) -> Result<Option<Repository>> {
    let row = conn
        .query_row(
            &format!("SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE id = ?1"),
            params![id],
            RepositoryRow::from_row,
        )
        .optional()?;

    row.map(RepositoryRow::into_repository).transpose()
}

fn query_branch(conn: &Connection, repo_id: &str, name: &str) -> Result<Option<Branch>> {
    let row = conn
        .query_row(
            &format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE repo_id = ?1 AND name = ?2"),
            params![repo_id, name],
            BranchRow::from_row,
        )
        .optional()?;

    row.map(BranchRow::into_branch).transpose()
}

fn query_cache_entry(conn: &Connection, cache_key: &str) -> Result<Option<CacheEntry>> {
    let row = conn
        .query_row(
            &format!("SELECT {CACHE_COLUMNS} FROM cache_entries WHERE cache_key = ?1"),
            params![cache_key],
            CacheRow::from_row,
        )
        .optional()?;

    row.map(CacheRow::into_entry).transpose()
}

// Internal row types for database mapping

struct RepositoryRow {
    id: String,
    url: String,
    name: Option<String>,
    owner: Option<String>,
    default_branch: Option<String>,
    total_size: Option<i64>,
    file_count: Option<i64>,
    created_at: String,
    last_analyzed: Option<String>,
}

impl RepositoryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            url: row.get(1)?,
            name: row.get(2)?,
            owner: row.get(3)?,
            default_branch: row.get(4)?,
            total_size: row.get(5)?,
            file_count: row.get(6)?,
            created_at: row.get(7)?,
            last_analyzed: row.get(8)?,
        })
    }

    fn into_repository(self) -> Result<Repository> {
        Ok(Repository {
            id: self.id,
            url: self.url,
            name: self.name,
            owner: self.owner,
            default_branch: self.default_branch,
            total_size: self.total_size,
            file_count: self.file_count,
            created_at: from_sql_ts(&self.created_at)?,
            last_analyzed: from_sql_ts_opt(self.last_analyzed)?,
        })
    }
}

struct BranchRow {
    id: i64,
    repo_id: String,
    name: String,
    commit_sha: String,
    is_default: bool,
    last_commit_date: Option<String>,
    last_analyzed: Option<String>,
    updated_at: String,
}

impl BranchRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            repo_id: row.get(1)?,
            name: row.get(2)?,
            commit_sha: row.get(3)?,
            is_default: row.get(4)?,
            last_commit_date: row.get(5)?,
            last_analyzed: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_branch(self) -> Result<Branch> {
        Ok(Branch {
            id: self.id,
            repo_id: self.repo_id,
            name: self.name,
            commit_sha: self.commit_sha,
            is_default: self.is_default,
            last_commit_date: from_sql_ts_opt(self.last_commit_date)?,
            last_analyzed: from_sql_ts_opt(self.last_analyzed)?,
            updated_at: from_sql_ts(&self.updated_at)?,
        })
    }
}

struct AnalysisRow {
    id: i64,
    branch_id: i64,
    repo_id: String,
    branch_name: String,
    commit_sha: String,
    analysis_timestamp: String,
    file_tree: String,
    technologies: String,
    metrics: String,
    scores: String,
    issues: String,
    ai_summary: Option<String>,
    ai_grading_explanation: Option<String>,
    created_at: String,
}

impl AnalysisRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            branch_id: row.get(1)?,
            repo_id: row.get(2)?,
            branch_name: row.get(3)?,
            commit_sha: row.get(4)?,
            analysis_timestamp: row.get(5)?,
            file_tree: row.get(6)?,
            technologies: row.get(7)?,
            metrics: row.get(8)?,
            scores: row.get(9)?,
            issues: row.get(10)?,
            ai_summary: row.get(11)?,
            ai_grading_explanation: row.get(12)?,
            created_at: row.get(13)?,
        })
    }

    fn into_analysis(self) -> Result<Analysis> {
        let snapshot = AnalysisSnapshot {
            repo_id: self.repo_id,
            branch_name: self.branch_name,
            commit_sha: self.commit_sha,
            analysis_timestamp: Some(from_sql_ts(&self.analysis_timestamp)?),
            file_tree: serde_json::from_str(&self.file_tree)?,
            technologies: serde_json::from_str(&self.technologies)?,
            metrics: serde_json::from_str(&self.metrics)?,
            scores: serde_json::from_str(&self.scores)?,
            issues: serde_json::from_str(&self.issues)?,
            ai_summary: self.ai_summary,
            ai_grading_explanation: self.ai_grading_explanation,
        };

        Ok(Analysis {
            id: self.id,
            branch_id: self.branch_id,
            snapshot,
            created_at: from_sql_ts(&self.created_at)?,
        })
    }
}

struct CacheRow {
    id: i64,
    cache_key: String,
    repo_id: String,
    branch_name: String,
    commit_sha: String,
    path: Option<String>,
    size_bytes: i64,
    created_at: String,
    last_accessed: String,
    expires_at: Option<String>,
    access_count: i64,
}

impl CacheRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            cache_key: row.get(1)?,
            repo_id: row.get(2)?,
            branch_name: row.get(3)?,
            commit_sha: row.get(4)?,
            path: row.get(5)?,
            size_bytes: row.get(6)?,
            created_at: row.get(7)?,
            last_accessed: row.get(8)?,
            expires_at: row.get(9)?,
            access_count: row.get(10)?,
        })
    }

    fn into_entry(self) -> Result<CacheEntry> {
        Ok(CacheEntry {
            id: self.id,
            cache_key: self.cache_key,
            repo_id: self.repo_id,
            branch_name: self.branch_name,
            commit_sha: self.commit_sha,
            path: self.path,
            size_bytes: self.size_bytes,
            created_at: from_sql_ts(&self.created_at)?,
            last_accessed: from_sql_ts(&self.last_accessed)?,
            expires_at: from_sql_ts_opt(self.expires_at)?,
            access_count: self.access_count,
        })
    }
}
