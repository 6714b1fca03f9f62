//! In-memory conflict records awaiting an operator decision
//!
//! Conflicts are not persisted and do not survive a process restart.

use crate::model::{AnalysisSnapshot, BranchInfo};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// The two competing versions, per record kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictPayload {
    Branch {
        repo_id: String,
        local: BranchInfo,
        incoming: BranchInfo,
    },
    Analysis {
        local: Box<AnalysisSnapshot>,
        incoming: Box<AnalysisSnapshot>,
    },
}

/// Resolution state of a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Unresolved,
    ResolvedLocal,
    ResolvedRemote,
}

impl std::fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictStatus::Unresolved => write!(f, "unresolved"),
            ConflictStatus::ResolvedLocal => write!(f, "resolved-local"),
            ConflictStatus::ResolvedRemote => write!(f, "resolved-remote"),
        }
    }
}

/// Two divergent versions of the same logical record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conflict {
    pub payload: ConflictPayload,
    pub reason: String,
    pub detected_at: DateTime<Utc>,
    pub status: ConflictStatus,
}

impl Conflict {
    pub fn branch(repo_id: &str, local: BranchInfo, incoming: BranchInfo) -> Self {
        let reason = if local.commit_sha != incoming.commit_sha {
            format!(
                "commit sha mismatch: {} vs {}",
                short_sha(&local.commit_sha),
                short_sha(&incoming.commit_sha)
            )
        } else {
            "branch metadata diverged".to_string()
        };

        Self {
            payload: ConflictPayload::Branch {
                repo_id: repo_id.to_string(),
                local,
                incoming,
            },
            reason,
            detected_at: Utc::now(),
            status: ConflictStatus::Unresolved,
        }
    }

    pub fn analysis(local: AnalysisSnapshot, incoming: AnalysisSnapshot) -> Self {
        Self {
            payload: ConflictPayload::Analysis {
                local: Box::new(local),
                incoming: Box::new(incoming),
            },
            reason: "analysis results diverged".to_string(),
            detected_at: Utc::now(),
            status: ConflictStatus::Unresolved,
        }
    }

    pub fn entity_type(&self) -> &'static str {
        match self.payload {
            ConflictPayload::Branch { .. } => "branch",
            ConflictPayload::Analysis { .. } => "analysis",
        }
    }

    /// `repo:branch` for branches, `repo:branch:commit` for analyses
    pub fn entity_id(&self) -> String {
        match &self.payload {
            ConflictPayload::Branch {
                repo_id, incoming, ..
            } => format!("{}:{}", repo_id, incoming.name),
            ConflictPayload::Analysis { incoming, .. } => format!(
                "{}:{}:{}",
                incoming.repo_id, incoming.branch_name, incoming.commit_sha
            ),
        }
    }

    pub fn summary(&self) -> ConflictSummary {
        ConflictSummary {
            entity_type: self.entity_type(),
            entity_id: self.entity_id(),
            reason: self.reason.clone(),
            detected_at: self.detected_at,
        }
    }
}

/// Compact view of a conflict for listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictSummary {
    pub entity_type: &'static str,
    pub entity_id: String,
    pub reason: String,
    pub detected_at: DateTime<Utc>,
}

fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_conflict_identity() {
        let conflict = Conflict::branch(
            "r1",
            BranchInfo::new("main", "0123456789abcdef"),
            BranchInfo::new("main", "fedcba9876543210"),
        );
        assert_eq!(conflict.entity_type(), "branch");
        assert_eq!(conflict.entity_id(), "r1:main");
        assert_eq!(conflict.reason, "commit sha mismatch: 01234567 vs fedcba98");
        assert_eq!(conflict.status, ConflictStatus::Unresolved);
    }

    #[test]
    fn test_analysis_conflict_identity() {
        let now = Utc::now();
        let conflict = Conflict::analysis(
            AnalysisSnapshot::new("r1", "main", "abc", now),
            AnalysisSnapshot::new("r1", "main", "abc", now),
        );
        let summary = conflict.summary();
        assert_eq!(summary.entity_type, "analysis");
        assert_eq!(summary.entity_id, "r1:main:abc");
    }
}
