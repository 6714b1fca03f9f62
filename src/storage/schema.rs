//! Database schema definition

/// SQL schema for the snapshot store
///
/// Timestamps are stored as fixed-width RFC 3339 UTC text so that string
/// ordering matches chronological ordering.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Tracked repositories
CREATE TABLE IF NOT EXISTS repositories (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL DEFAULT '',
    name TEXT,
    owner TEXT,
    default_branch TEXT,
    total_size INTEGER,
    file_count INTEGER,
    created_at TEXT NOT NULL,
    last_analyzed TEXT
);

CREATE INDEX IF NOT EXISTS idx_repositories_url ON repositories(url);
CREATE INDEX IF NOT EXISTS idx_repositories_last_analyzed ON repositories(last_analyzed);

-- Branches, owned by a repository
CREATE TABLE IF NOT EXISTS branches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id TEXT NOT NULL,
    name TEXT NOT NULL,
    commit_sha TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    last_commit_date TEXT,
    last_analyzed TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (repo_id) REFERENCES repositories(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_branches_repo_name ON branches(repo_id, name);
CREATE INDEX IF NOT EXISTS idx_branches_commit ON branches(commit_sha);
CREATE INDEX IF NOT EXISTS idx_branches_last_analyzed ON branches(last_analyzed);

-- Append-only analysis snapshots
CREATE TABLE IF NOT EXISTS analyses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id TEXT NOT NULL,
    branch_id INTEGER NOT NULL,
    commit_sha TEXT NOT NULL,
    analysis_timestamp TEXT NOT NULL,
    file_tree TEXT NOT NULL,
    technologies TEXT NOT NULL,
    metrics TEXT NOT NULL,
    scores TEXT NOT NULL,
    issues TEXT NOT NULL,
    ai_summary TEXT,
    ai_grading_explanation TEXT,
    overall_score REAL,
    overall_grade TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (branch_id) REFERENCES branches(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_analyses_branch_commit ON analyses(branch_id, commit_sha);
CREATE INDEX IF NOT EXISTS idx_analyses_timestamp ON analyses(analysis_timestamp);

-- Denormalized metric time series
CREATE TABLE IF NOT EXISTS historical_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    branch_id INTEGER NOT NULL,
    metric_name TEXT NOT NULL,
    value REAL NOT NULL,
    timestamp TEXT NOT NULL,
    FOREIGN KEY (branch_id) REFERENCES branches(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_historical_branch_metric ON historical_metrics(branch_id, metric_name);
CREATE INDEX IF NOT EXISTS idx_historical_timestamp ON historical_metrics(timestamp);

-- Bookkeeping for externally cached artifacts
CREATE TABLE IF NOT EXISTS cache_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cache_key TEXT NOT NULL UNIQUE,
    repo_id TEXT NOT NULL,
    branch_name TEXT NOT NULL,
    commit_sha TEXT NOT NULL,
    path TEXT,
    size_bytes INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    last_accessed TEXT NOT NULL,
    expires_at TEXT,
    access_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_cache_repo_branch_commit ON cache_entries(repo_id, branch_name, commit_sha);
CREATE INDEX IF NOT EXISTS idx_cache_last_accessed ON cache_entries(last_accessed);
"#;
