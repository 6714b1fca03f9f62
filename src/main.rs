//! codemri - repository health snapshot store
//!
//! Stores analysis snapshots, reconciles branch updates and keeps analyses
//! fresh with a background refresh loop.

use anyhow::{Context, Result};
use clap::Parser;
use codemri::cli::{self, emit, Cli, Commands, RepoCommand, Workspace};
use codemri::model::BranchInfo;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let data_dir = cli.data_dir();
    let format = cli.format;

    // Commands that do not need an initialized data directory
    match &cli.command {
        Commands::Init(args) => return cli::init(&data_dir, args.force),
        Commands::Config(args) => {
            if args.reset {
                cli::reset_config(&data_dir)?;
            }
            return cli::show_config(&data_dir, format);
        }
        _ => {}
    }

    let ws = Workspace::open(&data_dir)?;

    match cli.command {
        Commands::Init(_) | Commands::Config(_) => {}

        Commands::Repo(RepoCommand::List) => {
            let repos = cli::repo_list(&ws)?;
            emit(format, &repos, |r| cli::print_repositories_text(r))?;
        }

        Commands::Repo(RepoCommand::Show { id }) => {
            let details = cli::repo_show(&ws, &id)?;
            emit(format, &details, cli::print_repository_text)?;
        }

        Commands::Repo(RepoCommand::Add(args)) => {
            let repo = cli::repo_add(&ws, &args)?;
            emit(format, &repo, |r| println!("✓ Tracking {}", r.id))?;
        }

        Commands::Repo(RepoCommand::Delete { id }) => {
            cli::repo_delete(&ws, &id)?;
        }

        Commands::Branches(args) => {
            let branches = cli::branches(&ws, &args.repo)?;
            emit(format, &branches, |b| cli::print_branches_text(b))?;
        }

        Commands::Latest(args) => {
            let analysis = cli::latest(&ws, &args.repo, &args.branch, args.commit.as_deref())?;
            emit(format, &analysis, cli::print_latest_text)?;
        }

        Commands::History(args) => {
            let analyses = cli::history(&ws, &args.repo, &args.branch, args.limit)?;
            emit(format, &analyses, |a| cli::print_history_text(a))?;
        }

        Commands::Trends(args) => {
            let points = cli::trends(
                &ws,
                &args.repo,
                &args.branch,
                args.days,
                args.metric.as_deref(),
            )?;
            emit(format, &points, |p| cli::print_trends_text(p))?;
        }

        Commands::SyncBranch(args) => {
            let mut info = BranchInfo::new(&args.name, &args.commit);
            info.is_default = args.default;
            info.last_commit_date = args.committed_at;

            let report = cli::sync_branch(&ws, &args.repo, &info, &args.sync)?;
            emit(format, &report, cli::print_sync_branch_text)?;
        }

        Commands::SyncBranches(args) => {
            let report = cli::sync_branches(&ws, &args.repo, &args.file, &args.sync)?;
            emit(format, &report, cli::print_sync_branches_text)?;
        }

        Commands::SyncAnalysis(args) => {
            let report = cli::sync_analysis(&ws, &args.repo, &args.file, &args.sync)?;
            emit(format, &report, cli::print_sync_analysis_text)?;
        }

        Commands::Stale(args) => {
            let report = cli::stale(
                &ws,
                &args.repo,
                args.branch.as_deref(),
                args.threshold_hours,
            )?;
            emit(format, &report, cli::print_stale_text)?;
        }

        Commands::MarkRefresh(args) => {
            cli::mark_refresh(&ws, &args.repo, &args.branch)?;
        }

        Commands::Stats => {
            let report = cli::stats(&ws)?;
            emit(format, &report, cli::print_stats_text)?;
        }

        Commands::Cleanup(args) => {
            let report = cli::cleanup(&ws, &args)?;
            emit(format, &report, cli::print_cleanup_text)?;
        }

        Commands::Watch(args) => {
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime.block_on(cli::watch(&ws, &args, format))?;
        }
    }

    Ok(())
}
