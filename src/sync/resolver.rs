//! Conflict resolution between a stored and an incoming version of a record

use crate::error::{Result, SyncError};
use crate::model::{AnalysisSnapshot, BranchInfo, CategoryScores, CodeMetrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How divergent versions of the same record are reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// The version with the later timestamp wins; ties go to the incoming version
    #[default]
    LatestWins,
    /// Field-by-field reconciliation, never raises a conflict
    Merge,
    /// Any divergence is held for an operator to resolve
    Manual,
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictStrategy::LatestWins => write!(f, "latest_wins"),
            ConflictStrategy::Merge => write!(f, "merge"),
            ConflictStrategy::Manual => write!(f, "manual"),
        }
    }
}

/// A record the resolver can arbitrate
pub trait Versioned: Clone {
    /// Reject records missing identity fields
    fn validate(&self) -> Result<()>;

    /// Timestamp compared by the latest-wins rule
    fn version_timestamp(&self) -> Option<DateTime<Utc>>;

    /// Equality ignoring volatile fields
    fn same_content(&self, other: &Self) -> bool;

    /// Combine two versions; `incoming_newer` settles fields set on both sides
    fn merge(local: &Self, incoming: &Self, incoming_newer: bool) -> Self;
}

/// Decision for one incoming version
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// Write this version
    Apply(T),
    /// The stored version stays
    KeepLocal,
    /// Divergence requires an operator decision
    Conflict,
}

/// Latest-wins comparison; a missing timestamp is older than any present one
pub fn incoming_wins(local: Option<DateTime<Utc>>, incoming: Option<DateTime<Utc>>) -> bool {
    incoming >= local
}

/// Arbitrates between local and incoming versions under one strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    strategy: ConflictStrategy,
}

impl ConflictResolver {
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Decide what to do with `incoming` given the stored `local` version
    ///
    /// Only malformed input is an error. Divergence is reported through the
    /// returned [`Resolution`].
    pub fn resolve<T: Versioned>(&self, local: Option<&T>, incoming: &T) -> Result<Resolution<T>> {
        incoming.validate()?;

        let Some(local) = local else {
            return Ok(Resolution::Apply(incoming.clone()));
        };
        local.validate()?;

        let incoming_newer = incoming_wins(local.version_timestamp(), incoming.version_timestamp());

        let resolution = match self.strategy {
            ConflictStrategy::LatestWins => {
                if incoming_newer {
                    Resolution::Apply(incoming.clone())
                } else {
                    Resolution::KeepLocal
                }
            }
            ConflictStrategy::Merge => Resolution::Apply(T::merge(local, incoming, incoming_newer)),
            ConflictStrategy::Manual => {
                if local.same_content(incoming) {
                    Resolution::Apply(incoming.clone())
                } else {
                    Resolution::Conflict
                }
            }
        };

        Ok(resolution)
    }
}

/// Prefer a present value; when both are present and differ, take the newer side's
fn pick<V: Clone + PartialEq>(local: Option<&V>, incoming: Option<&V>, incoming_newer: bool) -> Option<V> {
    match (local, incoming) {
        (Some(l), Some(i)) if l != i => {
            let winner = if incoming_newer { i } else { l };
            Some(winner.clone())
        }
        (Some(l), _) => Some(l.clone()),
        (None, i) => i.cloned(),
    }
}

fn pick_value<V: Clone + PartialEq>(local: &V, incoming: &V, incoming_newer: bool) -> V {
    if local != incoming && !incoming_newer {
        local.clone()
    } else {
        incoming.clone()
    }
}

fn non_empty<V>(v: &Vec<V>) -> Option<&Vec<V>> {
    (!v.is_empty()).then_some(v)
}

fn non_null(v: &serde_json::Value) -> Option<&serde_json::Value> {
    (!v.is_null()).then_some(v)
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SyncError::validation(format!("{field} is required")));
    }
    Ok(())
}

impl Versioned for BranchInfo {
    fn validate(&self) -> Result<()> {
        require("branch name", &self.name)?;
        require("commit sha", &self.commit_sha)
    }

    fn version_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_commit_date
    }

    // `last_analyzed` is maintained by analysis sync, not by branch listings
    fn same_content(&self, other: &Self) -> bool {
        self.name == other.name
            && self.commit_sha == other.commit_sha
            && self.is_default == other.is_default
            && self.last_commit_date == other.last_commit_date
    }

    fn merge(local: &Self, incoming: &Self, incoming_newer: bool) -> Self {
        BranchInfo {
            name: incoming.name.clone(),
            commit_sha: pick_value(&local.commit_sha, &incoming.commit_sha, incoming_newer),
            is_default: pick_value(&local.is_default, &incoming.is_default, incoming_newer),
            last_commit_date: pick(
                local.last_commit_date.as_ref(),
                incoming.last_commit_date.as_ref(),
                incoming_newer,
            ),
            last_analyzed: pick(
                local.last_analyzed.as_ref(),
                incoming.last_analyzed.as_ref(),
                incoming_newer,
            ),
        }
    }
}

impl Versioned for AnalysisSnapshot {
    fn validate(&self) -> Result<()> {
        require("repository id", &self.repo_id)?;
        require("branch name", &self.branch_name)?;
        require("commit sha", &self.commit_sha)?;
        if self.analysis_timestamp.is_none() {
            return Err(SyncError::validation("analysis timestamp is required"));
        }
        Ok(())
    }

    fn version_timestamp(&self) -> Option<DateTime<Utc>> {
        self.analysis_timestamp
    }

    fn same_content(&self, other: &Self) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        a.analysis_timestamp = None;
        b.analysis_timestamp = None;
        a == b
    }

    fn merge(local: &Self, incoming: &Self, newer: bool) -> Self {
        let metrics = CodeMetrics {
            total_files: pick_value(&local.metrics.total_files, &incoming.metrics.total_files, newer),
            total_lines: pick_value(&local.metrics.total_lines, &incoming.metrics.total_lines, newer),
            avg_complexity: pick(
                local.metrics.avg_complexity.as_ref(),
                incoming.metrics.avg_complexity.as_ref(),
                newer,
            ),
            maintainability_index: pick(
                local.metrics.maintainability_index.as_ref(),
                incoming.metrics.maintainability_index.as_ref(),
                newer,
            ),
        };

        let (ls, is) = (&local.scores, &incoming.scores);
        let scores = CategoryScores {
            overall_score: pick(ls.overall_score.as_ref(), is.overall_score.as_ref(), newer),
            overall_grade: pick(ls.overall_grade.as_ref(), is.overall_grade.as_ref(), newer),
            readability: pick(ls.readability.as_ref(), is.readability.as_ref(), newer),
            complexity: pick(ls.complexity.as_ref(), is.complexity.as_ref(), newer),
            maintainability: pick(ls.maintainability.as_ref(), is.maintainability.as_ref(), newer),
            documentation: pick(ls.documentation.as_ref(), is.documentation.as_ref(), newer),
            security: pick(ls.security.as_ref(), is.security.as_ref(), newer),
            performance: pick(ls.performance.as_ref(), is.performance.as_ref(), newer),
        };

        AnalysisSnapshot {
            repo_id: incoming.repo_id.clone(),
            branch_name: incoming.branch_name.clone(),
            commit_sha: pick_value(&local.commit_sha, &incoming.commit_sha, newer),
            analysis_timestamp: pick(
                local.analysis_timestamp.as_ref(),
                incoming.analysis_timestamp.as_ref(),
                newer,
            ),
            file_tree: pick(non_null(&local.file_tree), non_null(&incoming.file_tree), newer)
                .unwrap_or_default(),
            technologies: pick(
                non_empty(&local.technologies),
                non_empty(&incoming.technologies),
                newer,
            )
            .unwrap_or_default(),
            metrics,
            scores,
            issues: pick(non_empty(&local.issues), non_empty(&incoming.issues), newer)
                .unwrap_or_default(),
            ai_summary: pick(local.ai_summary.as_ref(), incoming.ai_summary.as_ref(), newer),
            ai_grading_explanation: pick(
                local.ai_grading_explanation.as_ref(),
                incoming.ai_grading_explanation.as_ref(),
                newer,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn branch(sha: &str, at: DateTime<Utc>) -> BranchInfo {
        BranchInfo::new("main", sha).committed_at(at)
    }

    #[test]
    fn test_no_local_always_applies() {
        for strategy in [
            ConflictStrategy::LatestWins,
            ConflictStrategy::Merge,
            ConflictStrategy::Manual,
        ] {
            let incoming = branch("abc", Utc::now());
            let resolution = ConflictResolver::new(strategy)
                .resolve(None, &incoming)
                .unwrap();
            assert_eq!(resolution, Resolution::Apply(incoming));
        }
    }

    #[test]
    fn test_latest_wins_is_order_independent() {
        let t1 = Utc::now() - Duration::hours(2);
        let t2 = Utc::now();
        let v1 = branch("old", t1);
        let v2 = branch("new", t2);
        let resolver = ConflictResolver::new(ConflictStrategy::LatestWins);

        // v1 stored, v2 arrives
        assert_eq!(
            resolver.resolve(Some(&v1), &v2).unwrap(),
            Resolution::Apply(v2.clone())
        );
        // v2 stored, v1 arrives late
        assert_eq!(resolver.resolve(Some(&v2), &v1).unwrap(), Resolution::KeepLocal);
    }

    #[test]
    fn test_latest_wins_tie_goes_to_incoming() {
        let t = Utc::now();
        let local = branch("abc", t);
        let incoming = branch("def", t);
        let resolution = ConflictResolver::new(ConflictStrategy::LatestWins)
            .resolve(Some(&local), &incoming)
            .unwrap();
        assert_eq!(resolution, Resolution::Apply(incoming));
    }

    #[test]
    fn test_missing_timestamp_loses() {
        let local = branch("abc", Utc::now());
        let incoming = BranchInfo::new("main", "def");
        assert!(!incoming_wins(local.last_commit_date, incoming.last_commit_date));
        assert!(incoming_wins(None, None));
    }

    #[test]
    fn test_merge_prefers_present_values() {
        let t1 = Utc::now() - Duration::hours(1);
        let t2 = Utc::now();
        let mut local = branch("old", t1);
        local.last_analyzed = Some(t1);
        let incoming = branch("new", t2).default_branch();

        let resolution = ConflictResolver::new(ConflictStrategy::Merge)
            .resolve(Some(&local), &incoming)
            .unwrap();
        let Resolution::Apply(merged) = resolution else {
            panic!("merge must always apply");
        };
        assert_eq!(merged.commit_sha, "new");
        assert!(merged.is_default);
        assert_eq!(merged.last_commit_date, Some(t2));
        assert_eq!(merged.last_analyzed, Some(t1));
    }

    #[test]
    fn test_merge_keeps_local_when_local_is_newer() {
        let t1 = Utc::now() - Duration::hours(1);
        let t2 = Utc::now();
        let local = branch("newer", t2);
        let incoming = branch("older", t1);

        let Resolution::Apply(merged) = ConflictResolver::new(ConflictStrategy::Merge)
            .resolve(Some(&local), &incoming)
            .unwrap()
        else {
            panic!("merge must always apply");
        };
        assert_eq!(merged.commit_sha, "newer");
        assert_eq!(merged.last_commit_date, Some(t2));
    }

    #[test]
    fn test_merge_analysis_fields() {
        let t1 = Utc::now() - Duration::hours(1);
        let t2 = Utc::now();
        let mut local = AnalysisSnapshot::new("r1", "main", "abc", t1);
        local.scores.security = Some(90.0);
        local.scores.overall_score = Some(70.0);
        local.technologies = vec!["python".to_string()];
        let mut incoming = AnalysisSnapshot::new("r1", "main", "abc", t2);
        incoming.scores.overall_score = Some(75.0);

        let merged = AnalysisSnapshot::merge(&local, &incoming, true);
        assert_eq!(merged.scores.security, Some(90.0));
        assert_eq!(merged.scores.overall_score, Some(75.0));
        assert_eq!(merged.technologies, vec!["python".to_string()]);
        assert_eq!(merged.analysis_timestamp, Some(t2));
    }

    #[test]
    fn test_manual_flags_divergence_only() {
        let t = Utc::now();
        let resolver = ConflictResolver::new(ConflictStrategy::Manual);

        let local = branch("abc", t);
        let mut same = branch("abc", t);
        same.last_analyzed = Some(t);
        assert_eq!(
            resolver.resolve(Some(&local), &same).unwrap(),
            Resolution::Apply(same.clone())
        );

        let diverged = branch("def", t + Duration::seconds(1));
        assert_eq!(
            resolver.resolve(Some(&local), &diverged).unwrap(),
            Resolution::Conflict
        );
    }

    #[test]
    fn test_manual_ignores_analysis_timestamp() {
        let local = AnalysisSnapshot::new("r1", "main", "abc", Utc::now() - Duration::hours(1));
        let rerun = AnalysisSnapshot::new("r1", "main", "abc", Utc::now());
        assert!(local.same_content(&rerun));

        let mut different = rerun.clone();
        different.ai_summary = Some("changed".to_string());
        assert!(!local.same_content(&different));
    }

    #[test]
    fn test_malformed_input_is_rejected() {
        let resolver = ConflictResolver::default();
        let bad = BranchInfo::new("", "abc");
        assert!(matches!(
            resolver.resolve(None, &bad),
            Err(SyncError::Validation(_))
        ));

        let mut snapshot = AnalysisSnapshot::new("r1", "main", "abc", Utc::now());
        snapshot.analysis_timestamp = None;
        assert!(resolver.resolve(None, &snapshot).is_err());
    }
}
