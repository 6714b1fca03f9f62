//! Command implementations

use super::{CleanupArgs, ConflictChoice, OutputFormat, RepoAddArgs, SyncOptions, WatchArgs};
use crate::config::{SyncConfig, CONFIG_FILE};
use crate::freshness::{StaleBranch, StalenessEvaluator, StalenessInfo};
use crate::model::{
    repo_id_from_url, Analysis, AnalysisSnapshot, Branch, BranchInfo, HistoricalMetric,
    IssueSeverity, Repository, RepositoryFields,
};
use crate::refresh::{
    CommandTrigger, LoggingTrigger, RefreshScheduler, RefreshTrigger, TickReport,
};
use crate::storage::{CleanupOptions, CleanupReport, Database, DatabaseStats};
use crate::sync::{
    AnalysisSyncResult, BatchSyncReport, ConflictSummary, SyncOutcome, SyncService,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Platform data directory for codemri
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("codemri")
}

/// An initialized data directory with its configuration and database
pub struct Workspace {
    pub data_dir: PathBuf,
    pub config: SyncConfig,
    pub db: Arc<Database>,
}

impl Workspace {
    /// Open an initialized data directory
    pub fn open(data_dir: &Path) -> Result<Self> {
        if !data_dir.join(CONFIG_FILE).exists() {
            anyhow::bail!(
                "codemri not initialized in {:?}. Run 'codemri init' first.",
                data_dir
            );
        }

        let config = SyncConfig::load_or_default(data_dir)?;
        let db_path = config.database_path(data_dir);
        let db = Database::open(&db_path)
            .with_context(|| format!("Failed to open database: {:?}", db_path))?;

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            db: Arc::new(db),
        })
    }

    pub fn sync_service(&self, options: &SyncOptions) -> SyncService {
        let strategy = options.strategy.unwrap_or(self.config.strategy);
        SyncService::new(Arc::clone(&self.db), strategy).with_retry(self.config.retry_policy())
    }

    pub fn evaluator(&self, threshold_hours: Option<u64>) -> StalenessEvaluator {
        StalenessEvaluator::new(
            Arc::clone(&self.db),
            threshold_hours.unwrap_or(self.config.stale_threshold_hours),
        )
    }
}

/// Initialize a data directory
pub fn init(data_dir: &Path, force: bool) -> Result<()> {
    let config_path = data_dir.join(CONFIG_FILE);
    if config_path.exists() && !force {
        anyhow::bail!("codemri already initialized. Use --force to re-initialize.");
    }

    let config = SyncConfig::default();
    config.save(data_dir)?;

    let db_path = config.database_path(data_dir);
    let _db = Database::open(&db_path)
        .with_context(|| format!("Failed to create database: {:?}", db_path))?;

    println!("✓ Initialized codemri in {:?}", data_dir);
    println!("  Database: {:?}", db_path);
    println!("  Config: {:?}", config_path);

    Ok(())
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Print `value` as JSON or through its text printer
pub fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce(&T)) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(value),
        OutputFormat::Text => {
            text(value);
            Ok(())
        }
    }
}

fn fmt_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

// ==================== Repositories ====================

/// A repository with its branches
#[derive(Debug, Serialize)]
pub struct RepositoryDetails {
    pub repository: Repository,
    pub branches: Vec<Branch>,
}

pub fn repo_list(ws: &Workspace) -> Result<Vec<Repository>> {
    Ok(ws.db.list_repositories()?)
}

pub fn repo_show(ws: &Workspace, id: &str) -> Result<RepositoryDetails> {
    let repository = ws
        .db
        .get_repository(id)?
        .ok_or_else(|| anyhow::anyhow!("Repository not found: {}", id))?;
    let branches = ws.db.get_branches(id)?;

    Ok(RepositoryDetails {
        repository,
        branches,
    })
}

pub fn repo_add(ws: &Workspace, args: &RepoAddArgs) -> Result<Repository> {
    let id = repo_id_from_url(&args.url)?;

    // id is host:owner/name
    let (owner, name) = id
        .split_once(':')
        .and_then(|(_, path)| path.split_once('/'))
        .map(|(o, n)| (o.to_string(), n.to_string()))
        .unzip();

    let fields = RepositoryFields {
        url: Some(args.url.trim().to_string()),
        name: args.name.clone().or(name),
        owner: args.owner.clone().or(owner),
        default_branch: args.default_branch.clone(),
        ..Default::default()
    };

    let repo = ws.db.upsert_repository(&id, &fields)?;
    tracing::info!("Tracking repository {}", repo.id);
    Ok(repo)
}

pub fn repo_delete(ws: &Workspace, id: &str) -> Result<()> {
    if !ws.db.delete_repository(id)? {
        anyhow::bail!("Repository not found: {}", id);
    }
    println!("✓ Deleted repository {}", id);
    Ok(())
}

pub fn print_repositories_text(repos: &[Repository]) {
    if repos.is_empty() {
        println!("No repositories tracked.");
        return;
    }

    for repo in repos {
        println!(
            "{}  (last analyzed: {})",
            repo.id,
            fmt_time(repo.last_analyzed)
        );
    }
}

pub fn print_repository_text(details: &RepositoryDetails) {
    let repo = &details.repository;
    println!("Repository: {}", repo.id);
    println!("  URL: {}", repo.url);
    if let Some(name) = &repo.name {
        println!("  Name: {}", name);
    }
    if let Some(owner) = &repo.owner {
        println!("  Owner: {}", owner);
    }
    if let Some(branch) = &repo.default_branch {
        println!("  Default branch: {}", branch);
    }
    println!("  Created: {}", fmt_time(Some(repo.created_at)));
    println!("  Last analyzed: {}", fmt_time(repo.last_analyzed));
    println!();
    print_branches_text(&details.branches);
}

// ==================== Branches & analyses ====================

pub fn branches(ws: &Workspace, repo_id: &str) -> Result<Vec<Branch>> {
    Ok(ws.db.get_branches(repo_id)?)
}

pub fn print_branches_text(branches: &[Branch]) {
    if branches.is_empty() {
        println!("No branches.");
        return;
    }

    println!("Branches:");
    for branch in branches {
        let marker = if branch.is_default { "*" } else { " " };
        println!(
            "{} {:<24} {}  analyzed: {}",
            marker,
            branch.name,
            short_sha(&branch.commit_sha),
            fmt_time(branch.last_analyzed)
        );
    }
}

pub fn latest(
    ws: &Workspace,
    repo_id: &str,
    branch: &str,
    commit: Option<&str>,
) -> Result<Option<Analysis>> {
    Ok(ws.db.get_latest_analysis(repo_id, branch, commit)?)
}

pub fn history(ws: &Workspace, repo_id: &str, branch: &str, limit: usize) -> Result<Vec<Analysis>> {
    Ok(ws.db.get_analysis_history(repo_id, branch, limit)?)
}

fn print_analysis_summary(analysis: &Analysis) {
    let snapshot = &analysis.snapshot;
    let score = snapshot
        .scores
        .overall_score
        .map(|s| format!("{:.1}", s))
        .unwrap_or_else(|| "-".to_string());
    let grade = snapshot.scores.overall_grade.as_deref().unwrap_or("-");

    println!(
        "#{:<6} {}  {}  score {} ({})  issues {}",
        analysis.id,
        fmt_time(snapshot.analysis_timestamp),
        short_sha(&snapshot.commit_sha),
        score,
        grade,
        snapshot.issues.len()
    );
}

pub fn print_latest_text(analysis: &Option<Analysis>) {
    let Some(analysis) = analysis else {
        println!("No analysis found.");
        return;
    };
    let snapshot = &analysis.snapshot;

    println!("Analysis #{}", analysis.id);
    println!("==================\n");
    println!("Repository: {}", snapshot.repo_id);
    println!("Branch: {}", snapshot.branch_name);
    println!("Commit: {}", snapshot.commit_sha);
    println!("Analyzed: {}", fmt_time(snapshot.analysis_timestamp));

    if let Some(score) = snapshot.scores.overall_score {
        println!(
            "Overall score: {:.1} ({})",
            score,
            snapshot.scores.overall_grade.as_deref().unwrap_or("-")
        );
    }
    if !snapshot.technologies.is_empty() {
        println!("Technologies: {}", snapshot.technologies.join(", "));
    }
    println!(
        "Files: {}  Lines: {}",
        snapshot.metrics.total_files, snapshot.metrics.total_lines
    );

    println!("\nIssues: {}", snapshot.issues.len());
    for severity in [
        IssueSeverity::Critical,
        IssueSeverity::High,
        IssueSeverity::Medium,
        IssueSeverity::Low,
    ] {
        let count = snapshot.count_issues(severity);
        if count > 0 {
            println!("  {}: {}", severity, count);
        }
    }

    if let Some(summary) = &snapshot.ai_summary {
        println!("\n{}", summary);
    }
}

pub fn print_history_text(analyses: &[Analysis]) {
    if analyses.is_empty() {
        println!("No analyses found.");
        return;
    }
    for analysis in analyses {
        print_analysis_summary(analysis);
    }
}

pub fn trends(
    ws: &Workspace,
    repo_id: &str,
    branch: &str,
    days: i64,
    metric: Option<&str>,
) -> Result<Vec<HistoricalMetric>> {
    let mut points = ws.db.get_historical_metrics(repo_id, branch, days)?;
    if let Some(metric) = metric {
        points.retain(|p| p.metric_name == metric);
    }
    Ok(points)
}

pub fn print_trends_text(points: &[HistoricalMetric]) {
    if points.is_empty() {
        println!("No metric history.");
        return;
    }
    for point in points {
        println!(
            "{}  {:<24} {}",
            fmt_time(Some(point.timestamp)),
            point.metric_name,
            point.value
        );
    }
}

// ==================== Sync ====================

/// Result of a sync command plus the conflicts it raised
#[derive(Debug, Serialize)]
pub struct SyncReport<T> {
    pub result: T,
    /// Conflicts left for an operator
    pub conflicts: Vec<ConflictSummary>,
    /// Conflicts settled by `--resolve`
    pub resolved: Vec<ConflictSummary>,
}

fn finish_sync<T>(service: &SyncService, result: T, choice: Option<ConflictChoice>) -> Result<SyncReport<T>> {
    let mut resolved = Vec::new();

    if let Some(choice) = choice {
        let use_local = choice == ConflictChoice::Local;
        while !service.get_conflicts()?.is_empty() {
            let conflict = service.resolve_conflict(0, use_local)?;
            resolved.push(conflict.summary());
        }
    }

    let conflicts = service
        .get_conflicts()?
        .iter()
        .map(|c| c.summary())
        .collect();

    Ok(SyncReport {
        result,
        conflicts,
        resolved,
    })
}

pub fn sync_branch(
    ws: &Workspace,
    repo_id: &str,
    info: &BranchInfo,
    options: &SyncOptions,
) -> Result<SyncReport<SyncOutcome>> {
    let service = ws.sync_service(options);
    let outcome = service.sync_branch_metadata(repo_id, info)?;
    finish_sync(&service, outcome, options.resolve)
}

pub fn sync_branches(
    ws: &Workspace,
    repo_id: &str,
    file: &Path,
    options: &SyncOptions,
) -> Result<SyncReport<BatchSyncReport>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read branch list: {:?}", file))?;
    let branches: Vec<BranchInfo> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse branch list: {:?}", file))?;

    let service = ws.sync_service(options);
    let report = service.sync_multiple_branches(repo_id, &branches);
    finish_sync(&service, report, options.resolve)
}

pub fn sync_analysis(
    ws: &Workspace,
    repo_id: &str,
    file: &Path,
    options: &SyncOptions,
) -> Result<SyncReport<AnalysisSyncResult>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read snapshot: {:?}", file))?;
    let snapshot: AnalysisSnapshot = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse snapshot: {:?}", file))?;

    let service = ws.sync_service(options);
    let result = service.sync_analysis_result(repo_id, &snapshot)?;
    finish_sync(&service, result, options.resolve)
}

fn print_conflicts_text(conflicts: &[ConflictSummary], resolved: &[ConflictSummary]) {
    for conflict in resolved {
        println!("✓ Resolved {} {}: {}", conflict.entity_type, conflict.entity_id, conflict.reason);
    }

    if conflicts.is_empty() {
        return;
    }

    println!("\nPending conflicts:");
    for (i, conflict) in conflicts.iter().enumerate() {
        println!(
            "  [{}] {} {}: {}",
            i, conflict.entity_type, conflict.entity_id, conflict.reason
        );
    }
    println!("\nNothing was written for these. Conflicts live only in this process;");
    println!("re-run with --resolve local|incoming to settle them.");
}

fn outcome_text(outcome: SyncOutcome) -> &'static str {
    match outcome {
        SyncOutcome::Applied => "applied",
        SyncOutcome::KeptLocal => "kept stored version (incoming is older)",
        SyncOutcome::Pending => "pending conflict",
    }
}

pub fn print_sync_branch_text(report: &SyncReport<SyncOutcome>) {
    println!("Branch sync: {}", outcome_text(report.result));
    print_conflicts_text(&report.conflicts, &report.resolved);
}

pub fn print_sync_branches_text(report: &SyncReport<BatchSyncReport>) {
    let batch = &report.result;
    println!(
        "Synced {}/{} branches ({} conflicts, {} failed)",
        batch.synced, batch.total, batch.conflicts, batch.failed
    );
    for entry in &batch.results {
        let status = match &entry.status {
            crate::sync::BranchSyncStatus::Applied => "applied".to_string(),
            crate::sync::BranchSyncStatus::KeptLocal => "kept local".to_string(),
            crate::sync::BranchSyncStatus::Pending => "pending".to_string(),
            crate::sync::BranchSyncStatus::Failed { error } => format!("failed: {}", error),
        };
        println!("  {:<24} {}", entry.branch, status);
    }
    print_conflicts_text(&report.conflicts, &report.resolved);
}

pub fn print_sync_analysis_text(report: &SyncReport<AnalysisSyncResult>) {
    println!("✓ Stored analysis #{}", report.result.analysis_id);
    println!("  Branch pointer: {}", outcome_text(report.result.pointer));
    print_conflicts_text(&report.conflicts, &report.resolved);
}

// ==================== Staleness ====================

/// Output of the stale command
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum StaleReport {
    Branch(StalenessInfo),
    Repository {
        repo_id: String,
        threshold_hours: u64,
        stale: Vec<StaleBranch>,
    },
}

pub fn stale(
    ws: &Workspace,
    repo_id: &str,
    branch: Option<&str>,
    threshold_hours: Option<u64>,
) -> Result<StaleReport> {
    let evaluator = ws.evaluator(threshold_hours);

    let report = match branch {
        Some(branch) => StaleReport::Branch(evaluator.staleness_info(repo_id, branch)?),
        None => {
            if ws.db.get_repository(repo_id)?.is_none() {
                anyhow::bail!("Repository not found: {}", repo_id);
            }
            StaleReport::Repository {
                repo_id: repo_id.to_string(),
                threshold_hours: evaluator.threshold_hours(),
                stale: evaluator.stale_branches(repo_id)?,
            }
        }
    };

    Ok(report)
}

pub fn print_stale_text(report: &StaleReport) {
    match report {
        StaleReport::Branch(info) => {
            let state = if !info.exists {
                "unknown"
            } else if info.is_stale {
                "stale"
            } else {
                "fresh"
            };
            println!("Status: {}", state);
            println!("  Last analyzed: {}", fmt_time(info.last_analyzed));
            if let Some(age) = info.age_hours {
                println!("  Age: {} hours", age);
            }
            println!("  Threshold: {} hours", info.threshold_hours);
            println!("  Reason: {}", info.reason);
        }
        StaleReport::Repository {
            repo_id,
            threshold_hours,
            stale,
        } => {
            if stale.is_empty() {
                println!("✓ All branches of {} analyzed within {} hours", repo_id, threshold_hours);
                return;
            }
            println!("Stale branches of {} (threshold {} hours):", repo_id, threshold_hours);
            for branch in stale {
                println!(
                    "  {:<24} last analyzed: {}",
                    branch.name,
                    fmt_time(branch.last_analyzed)
                );
            }
        }
    }
}

pub fn mark_refresh(ws: &Workspace, repo_id: &str, branch: &str) -> Result<()> {
    ws.sync_service(&SyncOptions::default())
        .mark_for_refresh(repo_id, branch)?;
    println!("✓ Marked {}:{} for refresh", repo_id, branch);
    Ok(())
}

// ==================== Maintenance ====================

/// Store statistics with the active configuration
#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub data_dir: PathBuf,
    pub strategy: String,
    pub stale_threshold_hours: u64,
    #[serde(flatten)]
    pub database: DatabaseStats,
}

pub fn stats(ws: &Workspace) -> Result<StatsReport> {
    Ok(StatsReport {
        data_dir: ws.data_dir.clone(),
        strategy: ws.config.strategy.to_string(),
        stale_threshold_hours: ws.config.stale_threshold_hours,
        database: ws.db.get_stats()?,
    })
}

pub fn print_stats_text(report: &StatsReport) {
    let db = &report.database;
    println!("codemri Status");
    println!("==============\n");
    println!("Data directory: {:?}", report.data_dir);
    println!("Conflict strategy: {}", report.strategy);
    println!("Stale threshold: {} hours\n", report.stale_threshold_hours);
    println!("Repositories: {}", db.repositories);
    println!("Branches: {}", db.branches);
    println!("Analyses: {}", db.analyses);
    println!("Metric points: {}", db.historical_metrics);
    println!("Cache entries: {} ({} bytes)", db.cache_entries, db.cache_bytes);
}

pub fn cleanup(ws: &Workspace, args: &CleanupArgs) -> Result<CleanupReport> {
    let defaults = ws.config.cleanup_options();
    let options = CleanupOptions {
        repository_max_age_hours: args.repo_hours.or(defaults.repository_max_age_hours),
        analysis_max_age_days: args.analysis_days.or(defaults.analysis_max_age_days),
        cache_max_age_hours: args.cache_hours.or(defaults.cache_max_age_hours),
    };

    Ok(ws.db.cleanup(&options)?)
}

pub fn print_cleanup_text(report: &CleanupReport) {
    println!("✓ Cleanup complete");
    println!("  Repositories removed: {}", report.repositories);
    println!("  Analyses removed: {}", report.analyses);
    println!("  Cache entries removed: {}", report.cache_entries);
}

// ==================== Refresh loop ====================

/// Split `--schedule` values into (repo, branch, delay minutes) triples
pub fn parse_schedule(values: &[String]) -> Result<Vec<(String, String, u64)>> {
    if values.len() % 3 != 0 {
        anyhow::bail!("--schedule takes REPO BRANCH MINUTES");
    }

    values
        .chunks_exact(3)
        .map(|chunk| {
            let minutes = chunk[2]
                .parse()
                .with_context(|| format!("Invalid delay in minutes: {}", chunk[2]))?;
            Ok((chunk[0].clone(), chunk[1].clone(), minutes))
        })
        .collect()
}

fn print_tick_text(report: &TickReport) {
    println!(
        "Scanned {} repositories: {} stale branches",
        report.repositories,
        report.stale.len()
    );
    for branch in &report.stale {
        println!(
            "  {}:{}  last analyzed: {}",
            branch.repo_id,
            branch.name,
            fmt_time(branch.last_analyzed)
        );
    }
    if report.auto_refresh {
        println!(
            "Triggered {} ({} already running, {} failed)",
            report.triggered, report.skipped, report.failed
        );
    }
}

/// Run the refresh loop until Ctrl+C, or a single scan with `--once`
pub async fn watch(ws: &Workspace, args: &WatchArgs, format: OutputFormat) -> Result<()> {
    let mut options = ws.config.scheduler_options();
    if let Some(minutes) = args.interval_minutes {
        if minutes == 0 {
            anyhow::bail!("--interval-minutes must be greater than zero");
        }
        options.check_interval = Duration::from_secs(minutes.saturating_mul(60));
    }
    if args.auto_refresh {
        options.auto_refresh_enabled = true;
    }

    let command = args
        .command
        .as_deref()
        .or(ws.config.refresh_command.as_deref())
        .and_then(CommandTrigger::parse);
    let trigger: Arc<dyn RefreshTrigger> = match command {
        Some(command) => {
            tracing::info!("Refresh command: {}", command.program());
            Arc::new(command)
        }
        None => Arc::new(LoggingTrigger),
    };

    let scheduled = parse_schedule(&args.schedule)?;
    if args.once && !scheduled.is_empty() {
        anyhow::bail!("--schedule needs the refresh loop to keep running; drop --once");
    }
    let scheduler = RefreshScheduler::new(Arc::clone(&ws.db), trigger, options);

    if args.once {
        let report = scheduler.run_tick().await?;
        return emit(format, &report, print_tick_text);
    }

    for (repo, branch, minutes) in &scheduled {
        let id = scheduler.schedule_refresh(repo, branch, *minutes)?;
        println!("Scheduled refresh of {}:{} in {} minutes ({})", repo, branch, minutes, id);
    }

    scheduler.start()?;
    let status = scheduler.get_status();
    println!(
        "Checking every {} minutes (auto-refresh {}). Press Ctrl+C to stop.",
        status.check_interval_minutes,
        if status.auto_refresh_enabled { "on" } else { "off" }
    );

    let retention = ws.config.task_retention_hours;
    let mut housekeeping = tokio::time::interval(Duration::from_secs(3600));

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                break;
            }
            _ = housekeeping.tick() => {
                scheduler.cleanup_completed_tasks(retention);
            }
        }
    }

    println!("\nStopping after the current scan...");
    scheduler.stop().await;

    let status = scheduler.get_status();
    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Text => println!(
            "Stopped. Last scan: {}",
            fmt_time(status.last_tick_at)
        ),
    }

    Ok(())
}

// ==================== Configuration ====================

pub fn show_config(ws_dir: &Path, format: OutputFormat) -> Result<()> {
    let config = SyncConfig::load_or_default(ws_dir)?;

    match format {
        OutputFormat::Json => print_json(&config),
        OutputFormat::Text => {
            println!("codemri Configuration");
            println!("=====================\n");
            let content =
                toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
            println!("{}", content);
            println!("Database: {:?}", config.database_path(ws_dir));
            Ok(())
        }
    }
}

pub fn reset_config(ws_dir: &Path) -> Result<()> {
    SyncConfig::default().save(ws_dir)?;
    println!("✓ Configuration reset to defaults");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let dir = TempDir::new().unwrap();
        init(dir.path(), false).unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        (dir, ws)
    }

    #[test]
    fn test_open_requires_init() {
        let dir = TempDir::new().unwrap();
        assert!(Workspace::open(dir.path()).is_err());
        init(dir.path(), false).unwrap();
        assert!(init(dir.path(), false).is_err());
        assert!(init(dir.path(), true).is_ok());
    }

    #[test]
    fn test_repo_add_derives_identity() {
        let (_dir, ws) = workspace();
        let repo = repo_add(
            &ws,
            &RepoAddArgs {
                url: "https://github.com/acme/widget.git".to_string(),
                name: None,
                owner: None,
                default_branch: Some("main".to_string()),
            },
        )
        .unwrap();

        assert_eq!(repo.id, "github.com:acme/widget");
        assert_eq!(repo.owner.as_deref(), Some("acme"));
        assert_eq!(repo.name.as_deref(), Some("widget"));
        assert_eq!(repo_list(&ws).unwrap().len(), 1);
    }

    #[test]
    fn test_sync_branch_resolve_incoming() {
        let (_dir, ws) = workspace();
        ws.db
            .upsert_repository("r1", &RepositoryFields::default())
            .unwrap();
        let manual = SyncOptions {
            strategy: Some(crate::sync::ConflictStrategy::Manual),
            resolve: None,
        };

        sync_branch(&ws, "r1", &BranchInfo::new("main", "aaa"), &manual).unwrap();
        let report = sync_branch(&ws, "r1", &BranchInfo::new("main", "bbb"), &manual).unwrap();
        assert_eq!(report.result, SyncOutcome::Pending);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(ws.db.get_branch("r1", "main").unwrap().unwrap().commit_sha, "aaa");

        let resolving = SyncOptions {
            resolve: Some(ConflictChoice::Incoming),
            ..manual
        };
        let report = sync_branch(&ws, "r1", &BranchInfo::new("main", "bbb"), &resolving).unwrap();
        assert!(report.conflicts.is_empty());
        assert_eq!(report.resolved.len(), 1);
        assert_eq!(ws.db.get_branch("r1", "main").unwrap().unwrap().commit_sha, "bbb");
    }

    #[test]
    fn test_stale_unknown_repository() {
        let (_dir, ws) = workspace();
        assert!(stale(&ws, "nope", None, None).is_err());

        let StaleReport::Branch(info) = stale(&ws, "nope", Some("main"), None).unwrap() else {
            panic!("expected branch report");
        };
        assert!(!info.exists);
    }

    #[test]
    fn test_cleanup_uses_overrides() {
        let (_dir, ws) = workspace();
        let report = cleanup(
            &ws,
            &CleanupArgs {
                repo_hours: Some(1),
                analysis_days: None,
                cache_hours: None,
            },
        )
        .unwrap();
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn test_parse_schedule() {
        let values: Vec<String> = ["r1", "main", "5"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            parse_schedule(&values).unwrap(),
            vec![("r1".to_string(), "main".to_string(), 5)]
        );

        let bad: Vec<String> = ["r1", "main", "soon"].iter().map(|s| s.to_string()).collect();
        assert!(parse_schedule(&bad).is_err());
    }
}
