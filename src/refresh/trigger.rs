//! Callbacks invoked when a branch needs re-analysis

use anyhow::{Context, Result};

/// Environment variable carrying the repository id to a refresh command
pub const REPO_ID_ENV: &str = "CODEMRI_REPO_ID";
/// Environment variable carrying the branch name to a refresh command
pub const BRANCH_ENV: &str = "CODEMRI_BRANCH";

/// Starts re-analysis of one branch
///
/// Implementations are expected to hand the work off (enqueue a job, spawn a
/// process) rather than run the analysis inline. Results come back later
/// through the sync service.
#[async_trait::async_trait]
pub trait RefreshTrigger: Send + Sync {
    async fn trigger(&self, repo_id: &str, branch_name: &str) -> Result<()>;
}

/// Only logs the refresh request
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingTrigger;

#[async_trait::async_trait]
impl RefreshTrigger for LoggingTrigger {
    async fn trigger(&self, repo_id: &str, branch_name: &str) -> Result<()> {
        tracing::info!("Refresh requested for {}:{}", repo_id, branch_name);
        Ok(())
    }
}

/// Runs an external command per refresh, passing the target through the environment
#[derive(Debug, Clone)]
pub struct CommandTrigger {
    program: String,
    args: Vec<String>,
}

impl CommandTrigger {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Split a whitespace-separated command line; `None` if it is blank
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait::async_trait]
impl RefreshTrigger for CommandTrigger {
    async fn trigger(&self, repo_id: &str, branch_name: &str) -> Result<()> {
        tracing::debug!("Running {} for {}:{}", self.program, repo_id, branch_name);

        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .env(REPO_ID_ENV, repo_id)
            .env(BRANCH_ENV, branch_name)
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("Failed to run refresh command {}", self.program))?;

        if !status.success() {
            anyhow::bail!("Refresh command {} exited with {}", self.program, status);
        }

        Ok(())
    }
}
