//! Entity types persisted by the snapshot store
//!
//! This module defines:
//! - Repositories and their mutable metadata
//! - Branches and the incoming branch payload used by sync
//! - Immutable analysis snapshots with typed metrics, scores and issues
//! - Historical metric rows and cache bookkeeping entries

mod identity;

pub use identity::{cache_key, repo_id_from_url};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Stable identifier derived from the source URL
    pub id: String,
    pub url: String,
    pub name: Option<String>,
    pub owner: Option<String>,
    pub default_branch: Option<String>,
    pub total_size: Option<i64>,
    pub file_count: Option<i64>,
    pub created_at: DateTime<Utc>,
    /// Last time any branch of this repository was analyzed
    pub last_analyzed: Option<DateTime<Utc>>,
}

/// Mutable repository fields accepted by an upsert
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryFields {
    pub url: Option<String>,
    pub name: Option<String>,
    pub owner: Option<String>,
    pub default_branch: Option<String>,
    pub total_size: Option<i64>,
    pub file_count: Option<i64>,
    /// Bumps `last_analyzed` when supplied
    pub analyzed_at: Option<DateTime<Utc>>,
}

/// A stored branch row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: i64,
    pub repo_id: String,
    pub name: String,
    pub commit_sha: String,
    pub is_default: bool,
    pub last_commit_date: Option<DateTime<Utc>>,
    pub last_analyzed: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Branch {
    /// The payload view of this row, as it would be submitted for sync
    pub fn info(&self) -> BranchInfo {
        BranchInfo {
            name: self.name.clone(),
            commit_sha: self.commit_sha.clone(),
            is_default: self.is_default,
            last_commit_date: self.last_commit_date,
            last_analyzed: self.last_analyzed,
        }
    }
}

/// Branch metadata as produced by a repository listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    pub commit_sha: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub last_commit_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_analyzed: Option<DateTime<Utc>>,
}

impl BranchInfo {
    pub fn new(name: &str, commit_sha: &str) -> Self {
        Self {
            name: name.to_string(),
            commit_sha: commit_sha.to_string(),
            is_default: false,
            last_commit_date: None,
            last_analyzed: None,
        }
    }

    pub fn committed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_commit_date = Some(at);
        self
    }

    pub fn default_branch(mut self) -> Self {
        self.is_default = true;
        self
    }
}

/// Aggregate code metrics of one analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeMetrics {
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub total_lines: u64,
    #[serde(default)]
    pub avg_complexity: Option<f64>,
    #[serde(default)]
    pub maintainability_index: Option<f64>,
}

/// Per-category quality scores (0-100)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub overall_score: Option<f64>,
    pub overall_grade: Option<String>,
    pub readability: Option<f64>,
    pub complexity: Option<f64>,
    pub maintainability: Option<f64>,
    pub documentation: Option<f64>,
    pub security: Option<f64>,
    pub performance: Option<f64>,
}

/// Severity of a detected issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueSeverity::Critical => write!(f, "critical"),
            IssueSeverity::High => write!(f, "high"),
            IssueSeverity::Medium => write!(f, "medium"),
            IssueSeverity::Low => write!(f, "low"),
        }
    }
}

/// An issue found by the analysis pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub category: String,
    pub message: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

/// An immutable result of analyzing one branch at one commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub repo_id: String,
    pub branch_name: String,
    pub commit_sha: String,
    #[serde(default)]
    pub analysis_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub file_tree: serde_json::Value,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub metrics: CodeMetrics,
    #[serde(default)]
    pub scores: CategoryScores,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub ai_summary: Option<String>,
    #[serde(default)]
    pub ai_grading_explanation: Option<String>,
}

impl AnalysisSnapshot {
    /// Create an empty snapshot for a branch at a commit
    pub fn new(repo_id: &str, branch_name: &str, commit_sha: &str, at: DateTime<Utc>) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            branch_name: branch_name.to_string(),
            commit_sha: commit_sha.to_string(),
            analysis_timestamp: Some(at),
            file_tree: serde_json::Value::Null,
            technologies: Vec::new(),
            metrics: CodeMetrics::default(),
            scores: CategoryScores::default(),
            issues: Vec::new(),
            ai_summary: None,
            ai_grading_explanation: None,
        }
    }

    pub fn count_issues(&self, severity: IssueSeverity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    /// Numeric fields projected into the historical metrics table
    pub fn metric_values(&self) -> Vec<(&'static str, f64)> {
        let mut values = Vec::new();

        let scores = [
            (metric::OVERALL_SCORE, self.scores.overall_score),
            (metric::READABILITY_SCORE, self.scores.readability),
            (metric::COMPLEXITY_SCORE, self.scores.complexity),
            (metric::MAINTAINABILITY_SCORE, self.scores.maintainability),
            (metric::DOCUMENTATION_SCORE, self.scores.documentation),
            (metric::SECURITY_SCORE, self.scores.security),
            (metric::PERFORMANCE_SCORE, self.scores.performance),
        ];
        values.extend(scores.into_iter().filter_map(|(n, v)| v.map(|v| (n, v))));

        values.push((metric::TOTAL_ISSUES, self.issues.len() as f64));
        values.push((
            metric::CRITICAL_ISSUES,
            self.count_issues(IssueSeverity::Critical) as f64,
        ));
        values.push((metric::HIGH_ISSUES, self.count_issues(IssueSeverity::High) as f64));
        values.push((
            metric::MEDIUM_ISSUES,
            self.count_issues(IssueSeverity::Medium) as f64,
        ));
        values.push((metric::LOW_ISSUES, self.count_issues(IssueSeverity::Low) as f64));
        values.push((metric::TOTAL_FILES, self.metrics.total_files as f64));
        values.push((metric::TOTAL_LINES, self.metrics.total_lines as f64));

        values
    }
}

/// Names of the metrics recorded in the historical table
pub mod metric {
    pub const OVERALL_SCORE: &str = "overall_score";
    pub const READABILITY_SCORE: &str = "readability_score";
    pub const COMPLEXITY_SCORE: &str = "complexity_score";
    pub const MAINTAINABILITY_SCORE: &str = "maintainability_score";
    pub const DOCUMENTATION_SCORE: &str = "documentation_score";
    pub const SECURITY_SCORE: &str = "security_score";
    pub const PERFORMANCE_SCORE: &str = "performance_score";
    pub const TOTAL_ISSUES: &str = "total_issues";
    pub const CRITICAL_ISSUES: &str = "critical_issues";
    pub const HIGH_ISSUES: &str = "high_issues";
    pub const MEDIUM_ISSUES: &str = "medium_issues";
    pub const LOW_ISSUES: &str = "low_issues";
    pub const TOTAL_FILES: &str = "total_files";
    pub const TOTAL_LINES: &str = "total_lines";
}

/// A stored analysis row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: i64,
    pub branch_id: i64,
    pub snapshot: AnalysisSnapshot,
    pub created_at: DateTime<Utc>,
}

/// One point of a metric time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalMetric {
    pub id: i64,
    pub branch_id: i64,
    pub metric_name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Bookkeeping for an artifact cached outside the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: i64,
    pub cache_key: String,
    pub repo_id: String,
    pub branch_name: String,
    pub commit_sha: String,
    pub path: Option<String>,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub access_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(severity: IssueSeverity) -> Issue {
        Issue {
            severity,
            category: "security".to_string(),
            message: "hardcoded secret".to_string(),
            file: Some("src/config.py".to_string()),
            line: Some(12),
        }
    }

    #[test]
    fn test_metric_projection_skips_missing_scores() {
        let mut snapshot = AnalysisSnapshot::new("r1", "main", "abc", Utc::now());
        snapshot.scores.overall_score = Some(81.5);
        snapshot.metrics.total_lines = 1200;
        snapshot.issues = vec![issue(IssueSeverity::High), issue(IssueSeverity::High)];

        let values = snapshot.metric_values();
        assert!(values.contains(&(metric::OVERALL_SCORE, 81.5)));
        assert!(values.contains(&(metric::HIGH_ISSUES, 2.0)));
        assert!(values.contains(&(metric::TOTAL_LINES, 1200.0)));
        assert!(!values.iter().any(|(n, _)| *n == metric::SECURITY_SCORE));
    }

    #[test]
    fn test_snapshot_json_defaults() {
        let json = r#"{"repo_id":"r1","branch_name":"main","commit_sha":"abc"}"#;
        let snapshot: AnalysisSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.analysis_timestamp.is_none());
        assert!(snapshot.issues.is_empty());
        assert_eq!(snapshot.metrics, CodeMetrics::default());
    }
}
