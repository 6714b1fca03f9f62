//! Configuration for the snapshot store, sync service and refresh loop

use crate::refresh::SchedulerOptions;
use crate::storage::CleanupOptions;
use crate::sync::{ConflictStrategy, RetryPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the configuration inside the data directory
pub const CONFIG_FILE: &str = "config.toml";

/// Settings loaded from `<data_dir>/config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Database file; relative paths resolve against the data directory
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Conflict strategy for incoming updates
    #[serde(default)]
    pub strategy: ConflictStrategy,

    /// Age in hours at which an analysis counts as stale
    #[serde(default = "default_stale_threshold_hours")]
    pub stale_threshold_hours: u64,

    /// Period of the background staleness scan
    #[serde(default = "default_check_interval_minutes")]
    pub check_interval_minutes: u64,

    /// Whether the scan triggers refreshes or only reports
    #[serde(default)]
    pub auto_refresh_enabled: bool,

    /// Command run per stale branch; logging only when unset
    #[serde(default)]
    pub refresh_command: Option<String>,

    /// Retries of a write that hit lock contention
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// How long finished scheduled tasks are kept
    #[serde(default = "default_task_retention_hours")]
    pub task_retention_hours: u64,

    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// Age thresholds used by `cleanup`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_repository_max_age_hours")]
    pub repository_max_age_hours: i64,

    #[serde(default = "default_analysis_max_age_days")]
    pub analysis_max_age_days: i64,

    #[serde(default = "default_cache_max_age_hours")]
    pub cache_max_age_hours: i64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("codemri.db")
}

fn default_stale_threshold_hours() -> u64 {
    24
}

fn default_check_interval_minutes() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    50
}

fn default_task_retention_hours() -> u64 {
    24
}

fn default_repository_max_age_hours() -> i64 {
    24
}

fn default_analysis_max_age_days() -> i64 {
    30
}

fn default_cache_max_age_hours() -> i64 {
    24
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            repository_max_age_hours: default_repository_max_age_hours(),
            analysis_max_age_days: default_analysis_max_age_days(),
            cache_max_age_hours: default_cache_max_age_hours(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            strategy: ConflictStrategy::default(),
            stale_threshold_hours: default_stale_threshold_hours(),
            check_interval_minutes: default_check_interval_minutes(),
            auto_refresh_enabled: false,
            refresh_command: None,
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            task_retention_hours: default_task_retention_hours(),
            cleanup: CleanupConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load the configuration from the data directory or return defaults
    pub fn load_or_default(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE);

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to the data directory
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let config_path = data_dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Reject values that would stall the refresh loop or cleanup
    pub fn validate(&self) -> Result<()> {
        if self.check_interval_minutes == 0 {
            anyhow::bail!("check_interval_minutes must be greater than zero");
        }
        if self.cleanup.repository_max_age_hours < 0
            || self.cleanup.analysis_max_age_days < 0
            || self.cleanup.cache_max_age_hours < 0
        {
            anyhow::bail!("cleanup ages must not be negative");
        }
        Ok(())
    }

    /// Absolute database location for a data directory
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        if self.database_path.is_absolute() {
            self.database_path.clone()
        } else {
            data_dir.join(&self.database_path)
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            check_interval: Duration::from_secs(self.check_interval_minutes.saturating_mul(60)),
            stale_threshold_hours: self.stale_threshold_hours,
            auto_refresh_enabled: self.auto_refresh_enabled,
        }
    }

    pub fn cleanup_options(&self) -> CleanupOptions {
        CleanupOptions {
            repository_max_age_hours: Some(self.cleanup.repository_max_age_hours),
            analysis_max_age_days: Some(self.cleanup.analysis_max_age_days),
            cache_max_age_hours: Some(self.cleanup.cache_max_age_hours),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.stale_threshold_hours, 24);
        assert_eq!(config.check_interval_minutes, 30);
        assert_eq!(config.strategy, ConflictStrategy::LatestWins);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig {
            strategy: ConflictStrategy::Manual,
            auto_refresh_enabled: true,
            refresh_command: Some("analyze --queue".to_string()),
            ..Default::default()
        };

        config.save(dir.path()).unwrap();
        assert_eq!(SyncConfig::load_or_default(dir.path()).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "strategy = \"merge\"\n\n[cleanup]\nanalysis_max_age_days = 90\n",
        )
        .unwrap();

        let config = SyncConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.strategy, ConflictStrategy::Merge);
        assert_eq!(config.cleanup.analysis_max_age_days, 90);
        assert_eq!(config.cleanup.cache_max_age_hours, 24);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "check_interval_minutes = 0\n").unwrap();
        assert!(SyncConfig::load_or_default(dir.path()).is_err());

        // A zero threshold is allowed: everything is stale
        let config = SyncConfig {
            stale_threshold_hours: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_path_resolution() {
        let config = SyncConfig::default();
        assert_eq!(
            config.database_path(Path::new("/data")),
            PathBuf::from("/data/codemri.db")
        );

        let config = SyncConfig {
            database_path: PathBuf::from("/var/lib/codemri.db"),
            ..Default::default()
        };
        assert_eq!(
            config.database_path(Path::new("/data")),
            PathBuf::from("/var/lib/codemri.db")
        );
    }
}
