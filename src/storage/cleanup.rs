//! Age-based cleanup of stored records
//!
//! Each category runs in its own transaction. A failure in one category
//! leaves the categories already cleaned committed.

use super::{checked_cutoff, to_sql_ts, Database};
use crate::error::{Result, SyncError};
use chrono::{Duration, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// Age thresholds for cleanup; `None` skips the category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupOptions {
    /// Repositories neither analyzed nor created within this many hours
    pub repository_max_age_hours: Option<i64>,
    /// Analyses older than this many days
    pub analysis_max_age_days: Option<i64>,
    /// Cache entries expired, or not accessed within this many hours
    pub cache_max_age_hours: Option<i64>,
}

/// Number of rows deleted per category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub repositories: usize,
    pub analyses: usize,
    pub cache_entries: usize,
}

impl CleanupOptions {
    pub fn validate(&self) -> Result<()> {
        let ages = [
            ("repository max age", self.repository_max_age_hours),
            ("analysis max age", self.analysis_max_age_days),
            ("cache max age", self.cache_max_age_hours),
        ];
        for (field, age) in ages {
            if age.is_some_and(|age| age < 0) {
                return Err(SyncError::validation(format!("{field} must not be negative")));
            }
        }
        Ok(())
    }
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.repositories + self.analyses + self.cache_entries
    }
}

impl Database {
    /// Delete old repositories, analyses and cache entries
    ///
    /// Negative ages are rejected before anything is deleted.
    pub fn cleanup(&self, options: &CleanupOptions) -> Result<CleanupReport> {
        options.validate()?;
        let mut report = CleanupReport::default();

        if let Some(hours) = options.repository_max_age_hours {
            report.repositories = self.cleanup_old_repositories(hours)?;
        }
        if let Some(days) = options.analysis_max_age_days {
            report.analyses = self.cleanup_old_analyses(days)?;
        }
        if let Some(hours) = options.cache_max_age_hours {
            report.cache_entries = self.cleanup_stale_cache_entries(hours)?;
        }

        tracing::info!(
            repositories = report.repositories,
            analyses = report.analyses,
            cache_entries = report.cache_entries,
            "Cleanup finished"
        );

        Ok(report)
    }

    /// Remove repositories whose last activity is older than `max_age_hours`
    pub fn cleanup_old_repositories(&self, max_age_hours: i64) -> Result<usize> {
        let cutoff = checked_cutoff("repository max age", max_age_hours, Duration::try_hours)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let count = tx.execute(
            "DELETE FROM repositories WHERE COALESCE(last_analyzed, created_at) < ?1",
            params![cutoff],
        )?;
        tx.commit()?;

        Ok(count)
    }

    /// Remove analyses recorded more than `max_age_days` ago
    pub fn cleanup_old_analyses(&self, max_age_days: i64) -> Result<usize> {
        let cutoff = checked_cutoff("analysis max age", max_age_days, Duration::try_days)?;

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let count = tx.execute(
            "DELETE FROM analyses WHERE analysis_timestamp < ?1",
            params![cutoff],
        )?;
        tx.commit()?;

        Ok(count)
    }

    /// Remove expired cache entries and ones idle for more than `max_age_hours`
    pub fn cleanup_stale_cache_entries(&self, max_age_hours: i64) -> Result<usize> {
        let cutoff = checked_cutoff("cache max age", max_age_hours, Duration::try_hours)?;
        let now = Utc::now();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let count = tx.execute(
            r#"
            DELETE FROM cache_entries
            WHERE last_accessed < ?1 OR (expires_at IS NOT NULL AND expires_at < ?2)
            "#,
            params![cutoff, to_sql_ts(&now)],
        )?;
        tx.commit()?;

        Ok(count)
    }
}
