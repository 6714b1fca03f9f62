//! One-off delayed refresh tasks
//!
//! Task records live in memory only and are lost on restart.

use super::{lock, Inner, RefreshScheduler, TriggerOutcome};
use crate::error::{Result, SyncError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Lifecycle of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Scheduled => write!(f, "scheduled"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A delayed refresh of one branch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledTask {
    pub id: String,
    pub repo_id: String,
    pub branch_name: String,
    pub created_at: DateTime<Utc>,
    pub scheduled_for: DateTime<Utc>,
    pub status: TaskStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

pub(super) struct TaskEntry {
    task: ScheduledTask,
    cancel: Arc<Notify>,
}

pub(super) struct TaskCounts {
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl RefreshScheduler {
    /// Fire the trigger for one branch after `delay_minutes`; returns the task id
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_refresh(&self, repo_id: &str, branch_name: &str, delay_minutes: u64) -> Result<String> {
        if repo_id.trim().is_empty() || branch_name.trim().is_empty() {
            return Err(SyncError::validation(
                "repository id and branch name are required",
            ));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SyncError::Runtime(e.to_string()))?;

        let delay = Duration::from_secs(delay_minutes.saturating_mul(60));
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        let cancel = Arc::new(Notify::new());

        let task = ScheduledTask {
            id: id.clone(),
            repo_id: repo_id.to_string(),
            branch_name: branch_name.to_string(),
            created_at: now,
            scheduled_for: ChronoDuration::from_std(delay)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            status: TaskStatus::Scheduled,
            completed_at: None,
            error: None,
        };

        lock(&self.inner.tasks).push(TaskEntry {
            task,
            cancel: Arc::clone(&cancel),
        });

        let inner = Arc::clone(&self.inner);
        let task_id = id.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => inner.fire_task(&task_id).await,
                _ = cancel.notified() => {}
            }
        });

        tracing::info!(
            "Scheduled refresh {} of {}:{} in {} minutes",
            id,
            repo_id,
            branch_name,
            delay_minutes
        );
        Ok(id)
    }

    /// Cancel a task that has not fired yet; false if it already fired or is unknown
    pub fn cancel_refresh(&self, task_id: &str) -> bool {
        let mut tasks = lock(&self.inner.tasks);
        let Some(entry) = tasks
            .iter_mut()
            .find(|e| e.task.id == task_id && e.task.status == TaskStatus::Scheduled)
        else {
            return false;
        };

        entry.task.status = TaskStatus::Cancelled;
        entry.task.completed_at = Some(Utc::now());
        entry.cancel.notify_one();

        tracing::info!("Cancelled scheduled refresh {}", task_id);
        true
    }

    /// All task records, in scheduling order
    pub fn get_scheduled_tasks(&self) -> Vec<ScheduledTask> {
        lock(&self.inner.tasks)
            .iter()
            .map(|e| e.task.clone())
            .collect()
    }

    /// Drop finished task records at least `max_age_hours` old; returns how many
    pub fn cleanup_completed_tasks(&self, max_age_hours: u64) -> usize {
        let hours = i64::try_from(max_age_hours).unwrap_or(i64::MAX);
        let cutoff = ChronoDuration::try_hours(hours)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut tasks = lock(&self.inner.tasks);
        let before = tasks.len();
        tasks.retain(|e| {
            let expired = e.task.status.is_finished()
                && e.task.completed_at.is_some_and(|at| at <= cutoff);
            !expired
        });

        let removed = before - tasks.len();
        if removed > 0 {
            tracing::debug!("Removed {} finished refresh tasks", removed);
        }
        removed
    }
}

impl Inner {
    async fn fire_task(&self, task_id: &str) {
        let target = {
            let mut tasks = lock(&self.tasks);
            tasks
                .iter_mut()
                .find(|e| e.task.id == task_id && e.task.status == TaskStatus::Scheduled)
                .map(|entry| {
                    entry.task.status = TaskStatus::Running;
                    (entry.task.repo_id.clone(), entry.task.branch_name.clone())
                })
        };
        let Some((repo_id, branch_name)) = target else {
            return;
        };

        let outcome = self.trigger_isolated(&repo_id, &branch_name).await;

        let mut tasks = lock(&self.tasks);
        if let Some(entry) = tasks.iter_mut().find(|e| e.task.id == task_id) {
            entry.task.completed_at = Some(Utc::now());
            match outcome {
                TriggerOutcome::Triggered | TriggerOutcome::Skipped => {
                    entry.task.status = TaskStatus::Completed;
                }
                TriggerOutcome::Failed(error) => {
                    entry.task.status = TaskStatus::Failed;
                    entry.task.error = Some(error);
                }
            }
            tracing::info!("Scheduled refresh {} {}", task_id, entry.task.status);
        }
    }

    pub(super) fn task_counts(&self) -> TaskCounts {
        let tasks = lock(&self.tasks);
        let count = |status: TaskStatus| tasks.iter().filter(|e| e.task.status == status).count();

        TaskCounts {
            pending: count(TaskStatus::Scheduled) + count(TaskStatus::Running),
            completed: count(TaskStatus::Completed),
            failed: count(TaskStatus::Failed),
            cancelled: count(TaskStatus::Cancelled),
        }
    }
}
