//! CLI interface using clap
//!
//! Provides the command-line interface for codemri

mod commands;

pub use commands::*;

use crate::sync::ConflictStrategy;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// codemri - repository health snapshot store and refresh scheduler
#[derive(Parser, Debug)]
#[command(name = "codemri")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory holding the database and config.toml
    #[arg(short, long, global = true, env = "CODEMRI_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'o', long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory, database and default configuration
    Init(InitArgs),

    /// Manage tracked repositories
    #[command(subcommand)]
    Repo(RepoCommand),

    /// List the branches of a repository
    Branches(BranchesArgs),

    /// Show the latest analysis of a branch
    Latest(LatestArgs),

    /// Show the analysis history of a branch, newest first
    History(HistoryArgs),

    /// Show historical metric points of a branch
    Trends(TrendsArgs),

    /// Submit branch metadata for synchronization
    SyncBranch(SyncBranchArgs),

    /// Submit a batch of branches from a JSON file
    SyncBranches(SyncBranchesArgs),

    /// Submit an analysis snapshot from a JSON file
    SyncAnalysis(SyncAnalysisArgs),

    /// Check which branches need re-analysis
    Stale(StaleArgs),

    /// Clear a branch's last-analyzed time so it is refreshed next
    MarkRefresh(MarkRefreshArgs),

    /// Show store statistics
    Stats,

    /// Delete old repositories, analyses and cache entries
    Cleanup(CleanupArgs),

    /// Run the background refresh loop in the foreground
    Watch(WatchArgs),

    /// Show or reset configuration
    Config(ConfigArgs),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Arguments for init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration
    #[arg(short, long)]
    pub force: bool,
}

/// Repository subcommands
#[derive(Subcommand, Debug)]
pub enum RepoCommand {
    /// List tracked repositories
    List,

    /// Show one repository
    Show {
        /// Repository id (host:owner/name)
        id: String,
    },

    /// Track a repository by its GitHub or GitLab URL
    Add(RepoAddArgs),

    /// Delete a repository with its branches and analyses
    Delete {
        /// Repository id (host:owner/name)
        id: String,
    },
}

/// Arguments for repo add
#[derive(Parser, Debug)]
pub struct RepoAddArgs {
    /// Repository URL
    pub url: String,

    /// Display name (defaults to the URL's last segment)
    #[arg(long)]
    pub name: Option<String>,

    /// Owner (defaults to the URL's owner segment)
    #[arg(long)]
    pub owner: Option<String>,

    /// Default branch name
    #[arg(long)]
    pub default_branch: Option<String>,
}

/// Arguments for branches command
#[derive(Parser, Debug)]
pub struct BranchesArgs {
    /// Repository id
    pub repo: String,
}

/// Arguments for latest command
#[derive(Parser, Debug)]
pub struct LatestArgs {
    /// Repository id
    pub repo: String,

    /// Branch name
    pub branch: String,

    /// Only consider analyses of this commit
    #[arg(short, long)]
    pub commit: Option<String>,
}

/// Arguments for history command
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Repository id
    pub repo: String,

    /// Branch name
    pub branch: String,

    /// Maximum number of analyses
    #[arg(short = 'n', long, default_value = "10")]
    pub limit: usize,
}

/// Arguments for trends command
#[derive(Parser, Debug)]
pub struct TrendsArgs {
    /// Repository id
    pub repo: String,

    /// Branch name
    pub branch: String,

    /// How many days back to include
    #[arg(long, default_value = "30")]
    pub days: i64,

    /// Only show this metric (e.g. overall_score)
    #[arg(short, long)]
    pub metric: Option<String>,
}

/// Arguments for sync-branch command
#[derive(Parser, Debug)]
pub struct SyncBranchArgs {
    /// Repository id
    pub repo: String,

    /// Branch name
    pub name: String,

    /// Head commit of the branch
    #[arg(short, long)]
    pub commit: String,

    /// Mark as the repository's default branch
    #[arg(long)]
    pub default: bool,

    /// Time of the head commit (RFC 3339)
    #[arg(long)]
    pub committed_at: Option<DateTime<Utc>>,

    #[command(flatten)]
    pub sync: SyncOptions,
}

/// Arguments for sync-branches command
#[derive(Parser, Debug)]
pub struct SyncBranchesArgs {
    /// Repository id
    pub repo: String,

    /// JSON file with an array of branches
    pub file: PathBuf,

    #[command(flatten)]
    pub sync: SyncOptions,
}

/// Arguments for sync-analysis command
#[derive(Parser, Debug)]
pub struct SyncAnalysisArgs {
    /// Repository id
    pub repo: String,

    /// JSON file with one analysis snapshot
    pub file: PathBuf,

    #[command(flatten)]
    pub sync: SyncOptions,
}

/// Which side wins when a conflict is resolved on the spot
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ConflictChoice {
    /// Keep the stored version
    Local,
    /// Apply the submitted version
    Incoming,
}

/// Options shared by the sync commands
#[derive(clap::Args, Debug, Default)]
pub struct SyncOptions {
    /// Override the configured conflict strategy
    #[arg(short, long)]
    pub strategy: Option<ConflictStrategy>,

    /// Resolve conflicts raised by this run instead of reporting them
    #[arg(short, long)]
    pub resolve: Option<ConflictChoice>,
}

/// Arguments for stale command
#[derive(Parser, Debug)]
pub struct StaleArgs {
    /// Repository id
    pub repo: String,

    /// Describe a single branch instead of listing stale ones
    pub branch: Option<String>,

    /// Override the configured threshold in hours
    #[arg(long)]
    pub threshold_hours: Option<u64>,
}

/// Arguments for mark-refresh command
#[derive(Parser, Debug)]
pub struct MarkRefreshArgs {
    /// Repository id
    pub repo: String,

    /// Branch name
    pub branch: String,
}

/// Arguments for cleanup command
#[derive(Parser, Debug)]
pub struct CleanupArgs {
    /// Remove repositories idle for this many hours
    #[arg(long)]
    pub repo_hours: Option<i64>,

    /// Remove analyses older than this many days
    #[arg(long)]
    pub analysis_days: Option<i64>,

    /// Remove cache entries idle for this many hours
    #[arg(long)]
    pub cache_hours: Option<i64>,
}

/// Arguments for watch command
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Override the configured check interval
    #[arg(short, long)]
    pub interval_minutes: Option<u64>,

    /// Trigger refreshes for stale branches (otherwise only report)
    #[arg(short, long)]
    pub auto_refresh: bool,

    /// Command to run per stale branch (receives CODEMRI_REPO_ID and CODEMRI_BRANCH)
    #[arg(long)]
    pub command: Option<String>,

    /// Schedule a one-off refresh: REPO BRANCH MINUTES
    #[arg(long, num_args = 3, value_names = ["REPO", "BRANCH", "MINUTES"])]
    pub schedule: Vec<String>,

    /// Run a single scan and exit
    #[arg(long)]
    pub once: bool,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Reset to defaults
    #[arg(long)]
    pub reset: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The data directory from the flag, the environment or the platform default
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}
