//! Staleness classification of analyzed branches
//!
//! A branch is stale when its last-analyzed pointer is missing or at least
//! `threshold_hours` old. All operations here are read-only.

use crate::error::Result;
use crate::model::{Analysis, Branch};
use crate::storage::Database;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Default freshness threshold in hours
pub const DEFAULT_THRESHOLD_HOURS: u64 = 24;

// Largest hour count a chrono Duration can hold
const MAX_THRESHOLD_HOURS: i64 = i64::MAX / 3_600_000;

/// True if never analyzed, or analyzed `threshold_hours` or more before `now`
pub fn is_stale(last_analyzed: Option<DateTime<Utc>>, now: DateTime<Utc>, threshold_hours: u64) -> bool {
    match last_analyzed {
        None => true,
        Some(at) => {
            let hours = i64::try_from(threshold_hours)
                .unwrap_or(i64::MAX)
                .min(MAX_THRESHOLD_HOURS);
            now - at >= Duration::hours(hours)
        }
    }
}

/// Staleness descriptor of one branch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StalenessInfo {
    pub exists: bool,
    pub is_stale: bool,
    pub last_analyzed: Option<DateTime<Utc>>,
    /// Age of the last analysis, rounded to two decimals
    pub age_hours: Option<f64>,
    pub threshold_hours: u64,
    pub reason: String,
}

/// A branch that failed the freshness check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaleBranch {
    pub repo_id: String,
    pub name: String,
    pub commit_sha: String,
    pub last_analyzed: Option<DateTime<Utc>>,
}

impl From<Branch> for StaleBranch {
    fn from(branch: Branch) -> Self {
        Self {
            repo_id: branch.repo_id,
            name: branch.name,
            commit_sha: branch.commit_sha,
            last_analyzed: branch.last_analyzed,
        }
    }
}

fn age_hours(at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let hours = (now - at).num_milliseconds() as f64 / 3_600_000.0;
    (hours * 100.0).round() / 100.0
}

/// Classifies stored branches as fresh or stale
pub struct StalenessEvaluator {
    db: Arc<Database>,
    threshold_hours: u64,
}

impl StalenessEvaluator {
    pub fn new(db: Arc<Database>, threshold_hours: u64) -> Self {
        Self { db, threshold_hours }
    }

    pub fn threshold_hours(&self) -> u64 {
        self.threshold_hours
    }

    /// Staleness of one branch; a missing branch counts as stale
    pub fn is_branch_stale(&self, repo_id: &str, branch_name: &str) -> Result<bool> {
        let branch = self.db.get_branch(repo_id, branch_name)?;
        Ok(is_stale(
            branch.and_then(|b| b.last_analyzed),
            Utc::now(),
            self.threshold_hours,
        ))
    }

    pub fn staleness_info(&self, repo_id: &str, branch_name: &str) -> Result<StalenessInfo> {
        self.staleness_info_at(repo_id, branch_name, Utc::now())
    }

    /// Same as [`Self::staleness_info`], evaluated at a fixed instant
    pub fn staleness_info_at(
        &self,
        repo_id: &str,
        branch_name: &str,
        now: DateTime<Utc>,
    ) -> Result<StalenessInfo> {
        let threshold_hours = self.threshold_hours;

        let Some(branch) = self.db.get_branch(repo_id, branch_name)? else {
            return Ok(StalenessInfo {
                exists: false,
                is_stale: true,
                last_analyzed: None,
                age_hours: None,
                threshold_hours,
                reason: "branch not found".to_string(),
            });
        };

        let last_analyzed = branch.last_analyzed;
        let stale = is_stale(last_analyzed, now, threshold_hours);
        let age = last_analyzed.map(|at| age_hours(at, now));

        let reason = match age {
            None => "never analyzed".to_string(),
            Some(age) if stale => format!(
                "analyzed {age} hours ago, exceeds {threshold_hours}-hour threshold"
            ),
            Some(_) => "fresh".to_string(),
        };

        Ok(StalenessInfo {
            exists: true,
            is_stale: stale,
            last_analyzed,
            age_hours: age,
            threshold_hours,
            reason,
        })
    }

    /// Stale branches of a repository, in branch-name order
    pub fn stale_branches(&self, repo_id: &str) -> Result<Vec<StaleBranch>> {
        let now = Utc::now();
        Ok(self
            .db
            .get_branches(repo_id)?
            .into_iter()
            .filter(|b| is_stale(b.last_analyzed, now, self.threshold_hours))
            .map(StaleBranch::from)
            .collect())
    }

    /// Staleness of an individual analysis row
    pub fn is_analysis_stale(&self, analysis: &Analysis) -> bool {
        is_stale(
            analysis.snapshot.analysis_timestamp,
            Utc::now(),
            self.threshold_hours,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalysisSnapshot, BranchInfo, RepositoryFields};

    fn setup(threshold_hours: u64) -> (Arc<Database>, StalenessEvaluator) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.upsert_repository("r1", &RepositoryFields::default()).unwrap();
        let evaluator = StalenessEvaluator::new(Arc::clone(&db), threshold_hours);
        (db, evaluator)
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let now = Utc::now();
        assert!(is_stale(Some(now - Duration::hours(24)), now, 24));
        assert!(!is_stale(
            Some(now - Duration::hours(24) + Duration::milliseconds(1)),
            now,
            24
        ));
    }

    #[test]
    fn test_never_analyzed_always_stale() {
        let now = Utc::now();
        assert!(is_stale(None, now, 0));
        assert!(is_stale(None, now, u64::MAX));
        assert!(is_stale(Some(now), now, 0));
    }

    #[test]
    fn test_old_analysis_is_stale() {
        let (db, evaluator) = setup(24);
        let now = Utc::now();
        db.insert_analysis(&AnalysisSnapshot::new("r1", "main", "abc", now - Duration::hours(25)))
            .unwrap();

        assert!(evaluator.is_branch_stale("r1", "main").unwrap());

        let info = evaluator.staleness_info_at("r1", "main", now).unwrap();
        assert!(info.exists);
        assert!(info.is_stale);
        assert_eq!(info.age_hours, Some(25.0));
        assert_eq!(info.reason, "analyzed 25 hours ago, exceeds 24-hour threshold");
    }

    #[test]
    fn test_recent_analysis_is_fresh() {
        let (db, evaluator) = setup(24);
        db.insert_analysis(&AnalysisSnapshot::new(
            "r1",
            "main",
            "abc",
            Utc::now() - Duration::hours(1),
        ))
        .unwrap();

        assert!(!evaluator.is_branch_stale("r1", "main").unwrap());
        let info = evaluator.staleness_info("r1", "main").unwrap();
        assert_eq!(info.reason, "fresh");
    }

    #[test]
    fn test_staleness_info_is_read_only() {
        let (db, evaluator) = setup(24);
        db.upsert_branch("r1", &BranchInfo::new("main", "abc")).unwrap();

        let before = db.get_branch("r1", "main").unwrap();
        let first = evaluator.staleness_info("r1", "main").unwrap();
        let second = evaluator.staleness_info("r1", "main").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.reason, "never analyzed");
        assert_eq!(db.get_branch("r1", "main").unwrap(), before);
    }

    #[test]
    fn test_missing_branch() {
        let (_db, evaluator) = setup(24);
        let info = evaluator.staleness_info("r1", "ghost").unwrap();
        assert!(!info.exists);
        assert!(info.is_stale);
        assert!(evaluator.is_branch_stale("r1", "ghost").unwrap());
    }

    #[test]
    fn test_stale_branches_in_name_order() {
        let (db, evaluator) = setup(24);
        let now = Utc::now();
        db.upsert_branch("r1", &BranchInfo::new("zeta", "a")).unwrap();
        db.insert_analysis(&AnalysisSnapshot::new("r1", "alpha", "b", now - Duration::hours(30)))
            .unwrap();
        db.insert_analysis(&AnalysisSnapshot::new("r1", "main", "c", now - Duration::hours(2)))
            .unwrap();

        let names: Vec<_> = evaluator
            .stale_branches("r1")
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert!(evaluator.stale_branches("nope").unwrap().is_empty());
    }

    #[test]
    fn test_analysis_staleness() {
        let (db, evaluator) = setup(24);
        db.insert_analysis(&AnalysisSnapshot::new(
            "r1",
            "main",
            "abc",
            Utc::now() - Duration::hours(48),
        ))
        .unwrap();
        let analysis = db.get_latest_analysis("r1", "main", None).unwrap().unwrap();
        assert!(evaluator.is_analysis_stale(&analysis));
    }
}
