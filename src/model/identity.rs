//! Stable identifiers for repositories and cached artifacts

use crate::error::{Result, SyncError};
use sha2::{Digest, Sha256};

const SUPPORTED_HOSTS: &[&str] = &["github.com", "gitlab.com"];

/// Derive a stable repository id (`host:owner/name`) from a clone URL
pub fn repo_id_from_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let without_www = without_scheme
        .strip_prefix("www.")
        .unwrap_or(without_scheme);

    let mut parts = without_www.split('/');
    let host = parts.next().unwrap_or_default().to_ascii_lowercase();
    let owner = parts.next().unwrap_or_default();
    let name = parts.next().unwrap_or_default().trim_end_matches(".git");

    if !SUPPORTED_HOSTS.contains(&host.as_str()) {
        return Err(SyncError::validation(format!(
            "unsupported repository host in {url:?}"
        )));
    }
    if parts.next().is_some() || !is_path_segment(owner) || !is_path_segment(name) {
        return Err(SyncError::validation(format!(
            "expected <host>/<owner>/<name>, got {url:?}"
        )));
    }

    Ok(format!("{host}:{owner}/{name}"))
}

fn is_path_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Composite cache key for a repository, branch and commit
pub fn cache_key(repo_id: &str, branch: &str, commit_sha: &str) -> String {
    let digest = Sha256::digest(format!("{repo_id}:{branch}:{commit_sha}").as_bytes());
    let hash = hex::encode(digest);
    format!("{}_{}_{}", repo_id, branch, &hash[..16])
}
