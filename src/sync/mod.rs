//! Synchronization of incoming branch metadata and analysis results
//!
//! This module is the writer path into the snapshot store for contested
//! (repository, branch) keys:
//! - Arbitrating incoming versions through the conflict resolver
//! - Holding unresolved conflicts for an operator
//! - Retrying idempotent writes on transient storage errors

mod conflict;
mod resolver;

pub use conflict::{Conflict, ConflictPayload, ConflictStatus, ConflictSummary};
pub use resolver::{incoming_wins, ConflictResolver, ConflictStrategy, Resolution, Versioned};

use crate::error::{Result, SyncError};
use crate::model::{AnalysisSnapshot, BranchInfo, RepositoryFields};
use crate::storage::Database;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Outcome of one sync call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The incoming (or merged) version was written
    Applied,
    /// The stored version was newer and stays
    KeptLocal,
    /// Divergence was recorded as a conflict; nothing was written
    Pending,
}

impl SyncOutcome {
    /// True unless the update awaits manual resolution
    pub fn is_synced(self) -> bool {
        !matches!(self, SyncOutcome::Pending)
    }
}

/// Result of syncing an analysis snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnalysisSyncResult {
    /// Row id of the inserted analysis; always present
    pub analysis_id: i64,
    /// Whether the branch's last-analyzed pointer advanced
    pub pointer: SyncOutcome,
}

/// Per-branch status within a batch sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchSyncStatus {
    Applied,
    KeptLocal,
    Pending,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchSyncResult {
    pub branch: String,
    #[serde(flatten)]
    pub status: BranchSyncStatus,
}

/// Results of `sync_multiple_branches`, one entry per submitted branch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSyncReport {
    pub total: usize,
    pub synced: usize,
    pub conflicts: usize,
    pub failed: usize,
    pub results: Vec<BranchSyncResult>,
}

/// Sync configuration state for reporting
#[derive(Debug, Clone, Serialize)]
pub struct SyncStats {
    pub strategy: ConflictStrategy,
    pub pending_conflicts: usize,
    pub conflicts: Vec<ConflictSummary>,
}

/// Bounded retry for transient storage errors
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Run `op`, retrying while it fails transiently; `op` must be idempotent
    fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!("{} failed (attempt {}): {}", what, attempt, e);
                    std::thread::sleep(self.backoff);
                }
                other => return other,
            }
        }
    }
}

/// Applies incoming updates to the store under a conflict strategy
pub struct SyncService {
    db: Arc<Database>,
    resolver: ConflictResolver,
    retry: RetryPolicy,
    /// Pending conflicts; the lock also serializes each read-resolve-write
    conflicts: Mutex<Vec<Conflict>>,
}

impl SyncService {
    pub fn new(db: Arc<Database>, strategy: ConflictStrategy) -> Self {
        Self {
            db,
            resolver: ConflictResolver::new(strategy),
            retry: RetryPolicy::default(),
            conflicts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.resolver.strategy()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Conflict>>> {
        self.conflicts.lock().map_err(|_| SyncError::Poisoned)
    }

    /// Sync one branch's metadata against the stored record
    pub fn sync_branch_metadata(&self, repo_id: &str, branch: &BranchInfo) -> Result<SyncOutcome> {
        let mut conflicts = self.lock()?;
        self.sync_branch_locked(&mut conflicts, repo_id, branch)
    }

    fn sync_branch_locked(
        &self,
        conflicts: &mut Vec<Conflict>,
        repo_id: &str,
        branch: &BranchInfo,
    ) -> Result<SyncOutcome> {
        if repo_id.trim().is_empty() {
            return Err(SyncError::validation("repository id is required"));
        }

        let local = self.db.get_branch(repo_id, &branch.name)?.map(|b| b.info());

        match self.resolver.resolve(local.as_ref(), branch)? {
            Resolution::Apply(version) => {
                self.retry
                    .run("branch upsert", || self.db.upsert_branch(repo_id, &version))?;
                tracing::debug!("Synced branch {}:{} at {}", repo_id, version.name, version.commit_sha);
                Ok(SyncOutcome::Applied)
            }
            Resolution::KeepLocal => {
                tracing::debug!(
                    "Kept stored branch {}:{}, incoming version is older",
                    repo_id,
                    branch.name
                );
                Ok(SyncOutcome::KeptLocal)
            }
            Resolution::Conflict => {
                let Some(local) = local else {
                    return Err(SyncError::not_found("branch", format!("{repo_id}:{}", branch.name)));
                };
                let conflict = Conflict::branch(repo_id, local, branch.clone());
                tracing::warn!(
                    "Conflict on {}: {} ({} pending)",
                    conflict.entity_id(),
                    conflict.reason,
                    conflicts.len() + 1
                );
                conflicts.push(conflict);
                Ok(SyncOutcome::Pending)
            }
        }
    }

    /// Store an analysis snapshot and advance the branch pointer if it wins
    ///
    /// The analysis row is always inserted. Only the branch's and the
    /// repository's `last_analyzed` pointers are subject to resolution.
    pub fn sync_analysis_result(
        &self,
        repo_id: &str,
        snapshot: &AnalysisSnapshot,
    ) -> Result<AnalysisSyncResult> {
        if snapshot.repo_id != repo_id {
            return Err(SyncError::validation(format!(
                "snapshot belongs to {:?}, not {:?}",
                snapshot.repo_id, repo_id
            )));
        }
        snapshot.validate()?;

        let mut conflicts = self.lock()?;

        let previous = self
            .db
            .get_latest_analysis(repo_id, &snapshot.branch_name, None)?
            .map(|a| a.snapshot);

        let analysis_id = self.db.insert_analysis(snapshot)?;

        let branch = self
            .db
            .get_branch(repo_id, &snapshot.branch_name)?
            .ok_or_else(|| SyncError::not_found("branch", format!("{repo_id}:{}", snapshot.branch_name)))?;
        if let Err(e) = self.db.record_analysis_metrics(branch.id, snapshot) {
            tracing::warn!("Failed to record historical metrics for analysis {}: {}", analysis_id, e);
        }

        let pointer = match self.resolver.resolve(previous.as_ref(), snapshot)? {
            Resolution::Apply(version) => {
                self.advance_pointer(repo_id, &snapshot.branch_name, version.analysis_timestamp)?;
                SyncOutcome::Applied
            }
            Resolution::KeepLocal => SyncOutcome::KeptLocal,
            Resolution::Conflict => match previous {
                Some(local) => {
                    let conflict = Conflict::analysis(local, snapshot.clone());
                    tracing::warn!("Conflict on {}: {}", conflict.entity_id(), conflict.reason);
                    conflicts.push(conflict);
                    SyncOutcome::Pending
                }
                None => SyncOutcome::Applied,
            },
        };

        tracing::info!(
            "Stored analysis {} for {}:{} at {} (pointer: {:?})",
            analysis_id,
            repo_id,
            snapshot.branch_name,
            snapshot.commit_sha,
            pointer
        );

        Ok(AnalysisSyncResult {
            analysis_id,
            pointer,
        })
    }

    /// Move the branch and repository last-analyzed pointers forward to `analyzed_at`
    ///
    /// A pointer already at a later time is left alone.
    fn advance_pointer(
        &self,
        repo_id: &str,
        branch_name: &str,
        analyzed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let branch = self
            .db
            .get_branch(repo_id, branch_name)?
            .ok_or_else(|| SyncError::not_found("branch", format!("{repo_id}:{branch_name}")))?;

        if let Some(current) = branch.last_analyzed {
            if analyzed_at.map_or(true, |at| at < current) {
                tracing::debug!(
                    "Pointer of {}:{} already at {}, not moving back",
                    repo_id,
                    branch_name,
                    current
                );
                return Ok(());
            }
        }

        let updated = self.retry.run("pointer update", || {
            self.db
                .update_branch_analysis_time(repo_id, branch_name, analyzed_at)
        })?;
        if !updated {
            return Err(SyncError::not_found("branch", format!("{repo_id}:{branch_name}")));
        }

        let fields = RepositoryFields {
            analyzed_at,
            ..Default::default()
        };
        self.retry
            .run("repository upsert", || self.db.upsert_repository(repo_id, &fields))?;

        Ok(())
    }

    /// Sync every branch in the list; each entry has an independent outcome
    pub fn sync_multiple_branches(&self, repo_id: &str, branches: &[BranchInfo]) -> BatchSyncReport {
        let mut report = BatchSyncReport {
            total: branches.len(),
            ..Default::default()
        };

        for branch in branches {
            let status = match self.sync_branch_metadata(repo_id, branch) {
                Ok(SyncOutcome::Applied) => BranchSyncStatus::Applied,
                Ok(SyncOutcome::KeptLocal) => BranchSyncStatus::KeptLocal,
                Ok(SyncOutcome::Pending) => BranchSyncStatus::Pending,
                Err(e) => {
                    tracing::warn!("Failed to sync branch {}:{}: {}", repo_id, branch.name, e);
                    BranchSyncStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };

            match status {
                BranchSyncStatus::Applied | BranchSyncStatus::KeptLocal => report.synced += 1,
                BranchSyncStatus::Pending => report.conflicts += 1,
                BranchSyncStatus::Failed { .. } => report.failed += 1,
            }

            report.results.push(BranchSyncResult {
                branch: branch.name.clone(),
                status,
            });
        }

        report
    }

    /// Clear a branch's last-analyzed pointer so it is treated as stale
    pub fn mark_for_refresh(&self, repo_id: &str, branch_name: &str) -> Result<()> {
        let _guard = self.lock()?;
        let updated = self.retry.run("pointer reset", || {
            self.db.update_branch_analysis_time(repo_id, branch_name, None)
        })?;
        if !updated {
            return Err(SyncError::not_found("branch", format!("{repo_id}:{branch_name}")));
        }

        tracing::info!("Marked {}:{} for refresh", repo_id, branch_name);
        Ok(())
    }

    /// Snapshot of the pending conflicts, in detection order
    pub fn get_conflicts(&self) -> Result<Vec<Conflict>> {
        Ok(self.lock()?.clone())
    }

    /// Apply one side of the conflict at `index` and remove it from the list
    pub fn resolve_conflict(&self, index: usize, use_local: bool) -> Result<Conflict> {
        let mut conflicts = self.lock()?;
        let conflict = conflicts
            .get(index)
            .ok_or_else(|| SyncError::not_found("conflict", index.to_string()))?;

        match &conflict.payload {
            ConflictPayload::Branch {
                repo_id,
                local,
                incoming,
            } => {
                let chosen = if use_local { local } else { incoming };
                self.retry
                    .run("branch upsert", || self.db.upsert_branch(repo_id, chosen))?;
            }
            ConflictPayload::Analysis { local, incoming } => {
                let chosen = if use_local { local } else { incoming };
                self.advance_pointer(
                    &chosen.repo_id,
                    &chosen.branch_name,
                    chosen.analysis_timestamp,
                )?;
            }
        }

        let mut resolved = conflicts.remove(index);
        resolved.status = if use_local {
            ConflictStatus::ResolvedLocal
        } else {
            ConflictStatus::ResolvedRemote
        };

        tracing::info!(
            "Resolved conflict on {} ({})",
            resolved.entity_id(),
            resolved.status
        );
        Ok(resolved)
    }

    /// Drop every pending conflict without applying either side
    pub fn clear_conflicts(&self) -> Result<usize> {
        let mut conflicts = self.lock()?;
        let count = conflicts.len();
        conflicts.clear();
        Ok(count)
    }

    pub fn sync_stats(&self) -> Result<SyncStats> {
        let conflicts = self.lock()?;
        Ok(SyncStats {
            strategy: self.strategy(),
            pending_conflicts: conflicts.len(),
            conflicts: conflicts.iter().map(Conflict::summary).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::thread;

    fn service(strategy: ConflictStrategy) -> SyncService {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.upsert_repository("r1", &RepositoryFields::default()).unwrap();
        SyncService::new(db, strategy)
    }

    fn hours_ago(h: i64) -> DateTime<Utc> {
        Utc::now() - ChronoDuration::hours(h)
    }

    fn busy() -> SyncError {
        SyncError::Storage(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ))
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            backoff: Duration::ZERO,
        }
    }

    #[test]
    fn test_retry_recovers_from_transient_errors() {
        let mut attempts = 0;
        let value = quick_retry()
            .run("write", || {
                attempts += 1;
                if attempts <= 2 {
                    Err(busy())
                } else {
                    Ok(attempts)
                }
            })
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(attempts, 3);
    }

    #[test]
    fn test_retry_gives_up_after_max_retries() {
        let mut attempts = 0;
        let result: Result<()> = quick_retry().run("write", || {
            attempts += 1;
            Err(busy())
        });
        assert!(result.unwrap_err().is_transient());
        assert_eq!(attempts, 4);
    }

    #[test]
    fn test_retry_skips_permanent_errors() {
        let mut attempts = 0;
        let result: Result<()> = quick_retry().run("write", || {
            attempts += 1;
            Err(SyncError::validation("commit sha is required"))
        });
        assert!(matches!(result, Err(SyncError::Validation(_))));
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_first_write_applies() {
        let sync = service(ConflictStrategy::Manual);
        let info = BranchInfo::new("main", "abc").committed_at(hours_ago(1));

        assert_eq!(
            sync.sync_branch_metadata("r1", &info).unwrap(),
            SyncOutcome::Applied
        );
        let stored = sync.database().get_branch("r1", "main").unwrap().unwrap();
        assert_eq!(stored.info(), info);
    }

    #[test]
    fn test_latest_wins_concurrent_writers() {
        let sync = Arc::new(service(ConflictStrategy::LatestWins));
        let t = hours_ago(1);
        let older = BranchInfo::new("main", "aaa").committed_at(t);
        let newer = BranchInfo::new("main", "bbb")
            .committed_at(t + ChronoDuration::seconds(1))
            .default_branch();

        let handles: Vec<_> = [older, newer.clone()]
            .into_iter()
            .map(|info| {
                let sync = Arc::clone(&sync);
                thread::spawn(move || sync.sync_branch_metadata("r1", &info).unwrap())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_synced());
        }

        let stored = sync.database().get_branch("r1", "main").unwrap().unwrap();
        assert_eq!(stored.info(), newer);
    }

    #[test]
    fn test_latest_wins_keeps_newer_local() {
        let sync = service(ConflictStrategy::LatestWins);
        let newer = BranchInfo::new("main", "bbb").committed_at(hours_ago(1));
        let older = BranchInfo::new("main", "aaa").committed_at(hours_ago(2));

        sync.sync_branch_metadata("r1", &newer).unwrap();
        assert_eq!(
            sync.sync_branch_metadata("r1", &older).unwrap(),
            SyncOutcome::KeptLocal
        );
        let stored = sync.database().get_branch("r1", "main").unwrap().unwrap();
        assert_eq!(stored.commit_sha, "bbb");
    }

    #[test]
    fn test_merge_never_pends() {
        let sync = service(ConflictStrategy::Merge);
        sync.sync_branch_metadata("r1", &BranchInfo::new("main", "aaa").committed_at(hours_ago(2)))
            .unwrap();
        let outcome = sync
            .sync_branch_metadata("r1", &BranchInfo::new("main", "bbb").committed_at(hours_ago(1)))
            .unwrap();

        assert_eq!(outcome, SyncOutcome::Applied);
        assert!(sync.get_conflicts().unwrap().is_empty());
        assert_eq!(
            sync.database().get_branch("r1", "main").unwrap().unwrap().commit_sha,
            "bbb"
        );
    }

    #[test]
    fn test_manual_conflict_is_not_applied() {
        let sync = service(ConflictStrategy::Manual);
        let first = BranchInfo::new("main", "aaa").committed_at(hours_ago(2));
        let second = BranchInfo::new("main", "bbb").committed_at(hours_ago(1));

        sync.sync_branch_metadata("r1", &first).unwrap();
        let outcome = sync.sync_branch_metadata("r1", &second).unwrap();
        assert_eq!(outcome, SyncOutcome::Pending);
        assert!(!outcome.is_synced());

        let stored = sync.database().get_branch("r1", "main").unwrap().unwrap();
        assert_eq!(stored.commit_sha, "aaa");

        let conflicts = sync.get_conflicts().unwrap();
        assert_eq!(conflicts.len(), 1);
        let ConflictPayload::Branch { local, incoming, .. } = &conflicts[0].payload else {
            panic!("expected a branch conflict");
        };
        assert_eq!(local.commit_sha, "aaa");
        assert_eq!(incoming.commit_sha, "bbb");
    }

    #[test]
    fn test_resolve_conflict_applies_chosen_side() {
        let sync = service(ConflictStrategy::Manual);
        sync.sync_branch_metadata("r1", &BranchInfo::new("main", "aaa")).unwrap();
        sync.sync_branch_metadata("r1", &BranchInfo::new("main", "bbb")).unwrap();
        sync.sync_branch_metadata("r1", &BranchInfo::new("main", "ccc")).unwrap();
        assert_eq!(sync.get_conflicts().unwrap().len(), 2);

        let resolved = sync.resolve_conflict(1, false).unwrap();
        assert_eq!(resolved.status, ConflictStatus::ResolvedRemote);
        assert_eq!(
            sync.database().get_branch("r1", "main").unwrap().unwrap().commit_sha,
            "ccc"
        );

        let resolved = sync.resolve_conflict(0, true).unwrap();
        assert_eq!(resolved.status, ConflictStatus::ResolvedLocal);
        assert_eq!(
            sync.database().get_branch("r1", "main").unwrap().unwrap().commit_sha,
            "aaa"
        );

        let err = sync.resolve_conflict(0, true).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_batch_sync_continues_past_failures() {
        let sync = service(ConflictStrategy::Manual);
        sync.sync_branch_metadata("r1", &BranchInfo::new("dev", "aaa")).unwrap();

        let report = sync.sync_multiple_branches(
            "r1",
            &[
                BranchInfo::new("main", "abc"),
                BranchInfo::new("", "abc"),
                BranchInfo::new("dev", "bbb"),
                BranchInfo::new("release", "def"),
            ],
        );

        assert_eq!(report.total, 4);
        assert_eq!(report.synced, 2);
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.results[0].status, BranchSyncStatus::Applied);
        assert!(matches!(report.results[1].status, BranchSyncStatus::Failed { .. }));
        assert_eq!(report.results[2].status, BranchSyncStatus::Pending);
        assert_eq!(report.results[3].branch, "release");
    }

    #[test]
    fn test_batch_sync_unknown_repository() {
        let sync = service(ConflictStrategy::LatestWins);
        let report = sync.sync_multiple_branches("nope", &[BranchInfo::new("main", "abc")]);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_analysis_always_inserted_pointer_advances() {
        let sync = service(ConflictStrategy::LatestWins);
        let newer = AnalysisSnapshot::new("r1", "main", "bbb", hours_ago(1));
        let older = AnalysisSnapshot::new("r1", "main", "aaa", hours_ago(3));

        let first = sync.sync_analysis_result("r1", &newer).unwrap();
        assert_eq!(first.pointer, SyncOutcome::Applied);

        let second = sync.sync_analysis_result("r1", &older).unwrap();
        assert_eq!(second.pointer, SyncOutcome::KeptLocal);
        assert_ne!(first.analysis_id, second.analysis_id);

        let db = sync.database();
        assert_eq!(db.get_analysis_history("r1", "main", 10).unwrap().len(), 2);
        assert_eq!(
            db.get_branch("r1", "main").unwrap().unwrap().last_analyzed,
            newer.analysis_timestamp
        );
        assert_eq!(
            db.get_repository("r1").unwrap().unwrap().last_analyzed,
            newer.analysis_timestamp
        );
        assert!(!db.get_historical_metrics("r1", "main", 1).unwrap().is_empty());
    }

    #[test]
    fn test_manual_analysis_conflict_keeps_row() {
        let sync = service(ConflictStrategy::Manual);
        let first = AnalysisSnapshot::new("r1", "main", "aaa", hours_ago(2));
        let mut second = AnalysisSnapshot::new("r1", "main", "aaa", hours_ago(1));
        second.ai_summary = Some("regressed".to_string());

        sync.sync_analysis_result("r1", &first).unwrap();
        let result = sync.sync_analysis_result("r1", &second).unwrap();
        assert_eq!(result.pointer, SyncOutcome::Pending);

        let db = sync.database();
        assert_eq!(db.get_analysis_history("r1", "main", 10).unwrap().len(), 2);
        assert_eq!(
            db.get_branch("r1", "main").unwrap().unwrap().last_analyzed,
            first.analysis_timestamp
        );

        sync.resolve_conflict(0, false).unwrap();
        assert_eq!(
            db.get_branch("r1", "main").unwrap().unwrap().last_analyzed,
            second.analysis_timestamp
        );
        assert!(sync.get_conflicts().unwrap().is_empty());
    }

    #[test]
    fn test_late_resolution_does_not_rewind_pointer() {
        let manual = service(ConflictStrategy::Manual);
        let latest = SyncService::new(Arc::clone(manual.database()), ConflictStrategy::LatestWins);

        let first = AnalysisSnapshot::new("r1", "main", "aaa", hours_ago(3));
        let mut disputed = AnalysisSnapshot::new("r1", "main", "bbb", hours_ago(2));
        disputed.ai_summary = Some("disputed".to_string());
        let newest = AnalysisSnapshot::new("r1", "main", "ccc", hours_ago(1));

        manual.sync_analysis_result("r1", &first).unwrap();
        assert_eq!(
            manual.sync_analysis_result("r1", &disputed).unwrap().pointer,
            SyncOutcome::Pending
        );
        assert_eq!(
            latest.sync_analysis_result("r1", &newest).unwrap().pointer,
            SyncOutcome::Applied
        );

        manual.resolve_conflict(0, false).unwrap();
        let db = manual.database();
        assert_eq!(
            db.get_branch("r1", "main").unwrap().unwrap().last_analyzed,
            newest.analysis_timestamp
        );
        assert_eq!(
            db.get_repository("r1").unwrap().unwrap().last_analyzed,
            newest.analysis_timestamp
        );
        assert!(manual.get_conflicts().unwrap().is_empty());
    }

    #[test]
    fn test_analysis_validation() {
        let sync = service(ConflictStrategy::LatestWins);
        let snapshot = AnalysisSnapshot::new("r2", "main", "abc", hours_ago(1));
        assert!(matches!(
            sync.sync_analysis_result("r1", &snapshot),
            Err(SyncError::Validation(_))
        ));
    }

    #[test]
    fn test_mark_for_refresh() {
        let sync = service(ConflictStrategy::LatestWins);
        sync.sync_analysis_result("r1", &AnalysisSnapshot::new("r1", "main", "abc", hours_ago(1)))
            .unwrap();

        sync.mark_for_refresh("r1", "main").unwrap();
        assert!(sync
            .database()
            .get_branch("r1", "main")
            .unwrap()
            .unwrap()
            .last_analyzed
            .is_none());

        assert!(sync.mark_for_refresh("r1", "dev").unwrap_err().is_not_found());
    }

    #[test]
    fn test_sync_stats_and_clear() {
        let sync = service(ConflictStrategy::Manual);
        sync.sync_branch_metadata("r1", &BranchInfo::new("main", "aaa")).unwrap();
        sync.sync_branch_metadata("r1", &BranchInfo::new("main", "bbb")).unwrap();

        let stats = sync.sync_stats().unwrap();
        assert_eq!(stats.strategy, ConflictStrategy::Manual);
        assert_eq!(stats.pending_conflicts, 1);
        assert_eq!(stats.conflicts[0].entity_id, "r1:main");

        assert_eq!(sync.clear_conflicts().unwrap(), 1);
        assert_eq!(sync.sync_stats().unwrap().pending_conflicts, 0);
    }
}
