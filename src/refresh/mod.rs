//! Background refresh of stale branches
//!
//! The scheduler owns one periodic loop and any number of one-off delayed
//! tasks. Neither writes to the store: both only invoke the injected
//! [`RefreshTrigger`], which is expected to report back through the sync
//! service.

mod tasks;
mod trigger;

pub use tasks::{ScheduledTask, TaskStatus};
pub use trigger::{CommandTrigger, LoggingTrigger, RefreshTrigger, BRANCH_ENV, REPO_ID_ENV};

use crate::error::{Result, SyncError};
use crate::freshness::{StaleBranch, StalenessEvaluator, DEFAULT_THRESHOLD_HOURS};
use crate::storage::Database;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Scheduler settings
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub check_interval: Duration,
    pub stale_threshold_hours: u64,
    pub auto_refresh_enabled: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30 * 60),
            stale_threshold_hours: DEFAULT_THRESHOLD_HOURS,
            auto_refresh_enabled: false,
        }
    }
}

/// Result of one trigger invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Triggered,
    /// The branch already had a trigger call in flight
    Skipped,
    Failed(String),
}

/// What one periodic tick saw and did
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub repositories: usize,
    pub stale: Vec<StaleBranch>,
    pub auto_refresh: bool,
    pub triggered: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub running: bool,
    pub auto_refresh_enabled: bool,
    pub check_interval_minutes: u64,
    pub stale_threshold_hours: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_tick_stale: Option<usize>,
    pub currently_refreshing: Vec<String>,
    pub pending_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub cancelled_tasks: usize,
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// State shared between the scheduler handle, its loop and its tasks
struct Inner {
    db: Arc<Database>,
    evaluator: StalenessEvaluator,
    trigger: Arc<dyn RefreshTrigger>,
    check_interval: Duration,
    auto_refresh: AtomicBool,
    in_flight: Mutex<BTreeSet<(String, String)>>,
    last_tick: Mutex<Option<TickReport>>,
    tasks: Mutex<Vec<tasks::TaskEntry>>,
}

// The loop must keep running after a panicking callback, so poisoned
// scheduler state is recovered rather than propagated.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Periodically scans for stale branches and triggers their refresh
pub struct RefreshScheduler {
    inner: Arc<Inner>,
    worker: Mutex<Option<Worker>>,
}

impl RefreshScheduler {
    pub fn new(db: Arc<Database>, trigger: Arc<dyn RefreshTrigger>, options: SchedulerOptions) -> Self {
        let evaluator = StalenessEvaluator::new(Arc::clone(&db), options.stale_threshold_hours);
        let check_interval = options.check_interval.max(Duration::from_millis(1));

        Self {
            inner: Arc::new(Inner {
                db,
                evaluator,
                trigger,
                check_interval,
                auto_refresh: AtomicBool::new(options.auto_refresh_enabled),
                in_flight: Mutex::new(BTreeSet::new()),
                last_tick: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start the periodic loop; returns false if it was already running
    ///
    /// The first tick happens one interval after start. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) -> Result<bool> {
        let mut worker = lock(&self.worker);
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return Ok(false);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SyncError::Runtime(e.to_string()))?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let handle = runtime.spawn(run_loop(inner, shutdown_rx));
        *worker = Some(Worker { shutdown, handle });

        tracing::info!(
            "Refresh loop started (interval {:?}, auto-refresh {})",
            self.inner.check_interval,
            self.is_auto_refresh_enabled()
        );
        Ok(true)
    }

    /// Stop the loop after its current tick; returns false if it was not running
    pub async fn stop(&self) -> bool {
        let Some(worker) = lock(&self.worker).take() else {
            return false;
        };

        let _ = worker.shutdown.send(true);
        if let Err(e) = worker.handle.await {
            tracing::error!("Refresh loop ended abnormally: {}", e);
        }

        tracing::info!("Refresh loop stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    pub fn enable_auto_refresh(&self) {
        self.inner.auto_refresh.store(true, Ordering::SeqCst);
        tracing::info!("Auto-refresh enabled");
    }

    pub fn disable_auto_refresh(&self) {
        self.inner.auto_refresh.store(false, Ordering::SeqCst);
        tracing::info!("Auto-refresh disabled");
    }

    pub fn is_auto_refresh_enabled(&self) -> bool {
        self.inner.auto_refresh.load(Ordering::SeqCst)
    }

    /// Run one scan immediately, outside the periodic schedule
    pub async fn run_tick(&self) -> Result<TickReport> {
        self.inner.run_tick().await
    }

    pub fn last_tick(&self) -> Option<TickReport> {
        lock(&self.inner.last_tick).clone()
    }

    pub fn get_status(&self) -> RefreshStatus {
        let (last_tick_at, last_tick_stale) = match &*lock(&self.inner.last_tick) {
            Some(report) => (Some(report.finished_at), Some(report.stale.len())),
            None => (None, None),
        };

        let currently_refreshing = lock(&self.inner.in_flight)
            .iter()
            .map(|(repo, branch)| format!("{repo}:{branch}"))
            .collect();

        let counts = self.inner.task_counts();

        RefreshStatus {
            running: self.is_running(),
            auto_refresh_enabled: self.is_auto_refresh_enabled(),
            check_interval_minutes: self.inner.check_interval.as_secs() / 60,
            stale_threshold_hours: self.inner.evaluator.threshold_hours(),
            last_tick_at,
            last_tick_stale,
            currently_refreshing,
            pending_tasks: counts.pending,
            completed_tasks: counts.completed,
            failed_tasks: counts.failed,
            cancelled_tasks: counts.cancelled,
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(worker) = lock(&self.worker).take() {
            let _ = worker.shutdown.send(true);
        }
    }
}

async fn run_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let period = inner.check_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A started tick always runs to completion
                if let Err(e) = inner.run_tick().await {
                    tracing::error!("Refresh tick failed: {}", e);
                }
            }
            _ = shutdown.changed() => break,
        }

        if *shutdown.borrow() {
            break;
        }
    }
}

impl Inner {
    /// Stale branches of every tracked repository, in repository then branch order
    fn collect_stale(&self) -> Result<(usize, Vec<StaleBranch>)> {
        let repositories = self.db.list_repositories()?;

        let mut stale = Vec::new();
        for repo in &repositories {
            match self.evaluator.stale_branches(&repo.id) {
                Ok(branches) => stale.extend(branches),
                Err(e) => tracing::warn!("Staleness check failed for {}: {}", repo.id, e),
            }
        }

        Ok((repositories.len(), stale))
    }

    async fn run_tick(self: &Arc<Self>) -> Result<TickReport> {
        let started_at = Utc::now();

        let this = Arc::clone(self);
        let (repositories, stale) = tokio::task::spawn_blocking(move || this.collect_stale())
            .await
            .map_err(|e| SyncError::Runtime(e.to_string()))??;

        let auto_refresh = self.auto_refresh.load(Ordering::SeqCst);
        let mut report = TickReport {
            started_at,
            finished_at: started_at,
            repositories,
            stale,
            auto_refresh,
            triggered: 0,
            skipped: 0,
            failed: 0,
        };

        if auto_refresh {
            for branch in &report.stale {
                match self.trigger_isolated(&branch.repo_id, &branch.name).await {
                    TriggerOutcome::Triggered => report.triggered += 1,
                    TriggerOutcome::Skipped => report.skipped += 1,
                    TriggerOutcome::Failed(_) => report.failed += 1,
                }
            }
        }

        report.finished_at = Utc::now();
        tracing::info!(
            repositories = report.repositories,
            stale = report.stale.len(),
            triggered = report.triggered,
            failed = report.failed,
            "Refresh tick finished"
        );

        *lock(&self.last_tick) = Some(report.clone());
        Ok(report)
    }

    /// Invoke the trigger on its own task so an error or panic stays contained
    async fn trigger_isolated(&self, repo_id: &str, branch_name: &str) -> TriggerOutcome {
        let key = (repo_id.to_string(), branch_name.to_string());
        if !lock(&self.in_flight).insert(key.clone()) {
            tracing::debug!("Refresh of {}:{} already in flight", repo_id, branch_name);
            return TriggerOutcome::Skipped;
        }

        let trigger = Arc::clone(&self.trigger);
        let (repo, branch) = key.clone();
        let result = tokio::spawn(async move { trigger.trigger(&repo, &branch).await }).await;

        lock(&self.in_flight).remove(&key);

        match result {
            Ok(Ok(())) => {
                tracing::debug!("Triggered refresh of {}:{}", repo_id, branch_name);
                TriggerOutcome::Triggered
            }
            Ok(Err(e)) => {
                tracing::warn!("Refresh trigger failed for {}:{}: {:#}", repo_id, branch_name, e);
                TriggerOutcome::Failed(format!("{e:#}"))
            }
            Err(e) => {
                tracing::error!("Refresh trigger panicked for {}:{}: {}", repo_id, branch_name, e);
                TriggerOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalysisSnapshot, BranchInfo, RepositoryFields};
    use chrono::Duration as ChronoDuration;

    /// Records every call; fails or panics for configured branches
    #[derive(Default)]
    pub(super) struct RecordingTrigger {
        pub calls: Mutex<Vec<String>>,
        pub fail_on: Option<String>,
        pub panic_on: Option<String>,
        /// Time each call takes before returning
        pub delay: Option<Duration>,
        pub finished: std::sync::atomic::AtomicUsize,
    }

    impl RecordingTrigger {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn finished(&self) -> usize {
            self.finished.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl RefreshTrigger for RecordingTrigger {
        async fn trigger(&self, repo_id: &str, branch_name: &str) -> anyhow::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{repo_id}:{branch_name}"));
            if self.panic_on.as_deref() == Some(branch_name) {
                panic!("trigger exploded");
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.as_deref() == Some(branch_name) {
                anyhow::bail!("analysis queue unavailable");
            }
            Ok(())
        }
    }

    pub(super) fn seeded_db() -> Arc<Database> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let now = Utc::now();
        for repo in ["r1", "r2"] {
            db.upsert_repository(repo, &RepositoryFields::default()).unwrap();
        }
        db.upsert_branch("r1", &BranchInfo::new("main", "a")).unwrap();
        db.upsert_branch("r1", &BranchInfo::new("dev", "b")).unwrap();
        db.insert_analysis(&AnalysisSnapshot::new("r2", "main", "c", now - ChronoDuration::hours(30)))
            .unwrap();
        db.insert_analysis(&AnalysisSnapshot::new("r2", "fresh", "d", now - ChronoDuration::hours(1)))
            .unwrap();
        db
    }

    fn scheduler(trigger: Arc<RecordingTrigger>, auto_refresh_enabled: bool) -> RefreshScheduler {
        RefreshScheduler::new(
            seeded_db(),
            trigger,
            SchedulerOptions {
                check_interval: Duration::from_secs(60),
                stale_threshold_hours: 24,
                auto_refresh_enabled,
            },
        )
    }

    #[tokio::test]
    async fn test_tick_triggers_in_stable_order() {
        let trigger = Arc::new(RecordingTrigger::default());
        let scheduler = scheduler(Arc::clone(&trigger), true);

        let report = scheduler.run_tick().await.unwrap();
        assert_eq!(report.repositories, 2);
        assert_eq!(report.triggered, 3);
        assert_eq!(trigger.calls(), vec!["r1:dev", "r1:main", "r2:main"]);

        scheduler.run_tick().await.unwrap();
        assert_eq!(
            trigger.calls(),
            vec!["r1:dev", "r1:main", "r2:main", "r1:dev", "r1:main", "r2:main"]
        );
    }

    #[tokio::test]
    async fn test_tick_without_auto_refresh_only_reports() {
        let trigger = Arc::new(RecordingTrigger::default());
        let scheduler = scheduler(Arc::clone(&trigger), false);

        let report = scheduler.run_tick().await.unwrap();
        assert_eq!(report.stale.len(), 3);
        assert_eq!(report.triggered, 0);
        assert!(trigger.calls().is_empty());

        let status = scheduler.get_status();
        assert_eq!(status.last_tick_stale, Some(3));
        assert!(status.last_tick_at.is_some());
    }

    #[tokio::test]
    async fn test_trigger_failures_are_isolated() {
        let trigger = Arc::new(RecordingTrigger {
            fail_on: Some("dev".to_string()),
            panic_on: Some("main".to_string()),
            ..Default::default()
        });
        let scheduler = scheduler(Arc::clone(&trigger), true);

        let report = scheduler.run_tick().await.unwrap();
        assert_eq!(trigger.calls().len(), 3);
        assert_eq!(report.failed, 3);
        assert!(scheduler.get_status().currently_refreshing.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ticks_until_stopped() {
        let trigger = Arc::new(RecordingTrigger::default());
        let scheduler = scheduler(Arc::clone(&trigger), true);

        assert!(scheduler.start().unwrap());
        assert!(!scheduler.start().unwrap());
        assert!(scheduler.is_running());

        // No tick before the first interval elapses
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(trigger.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(trigger.calls().len(), 3);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(trigger.calls().len(), 6);

        assert!(scheduler.stop().await);
        assert!(!scheduler.stop().await);
        assert!(!scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(trigger.calls().len(), 6);

        // Restart after stop
        assert!(scheduler.start().unwrap());
        assert!(scheduler.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_running_tick() {
        let trigger = Arc::new(RecordingTrigger {
            delay: Some(Duration::from_secs(10)),
            ..Default::default()
        });
        let scheduler = scheduler(Arc::clone(&trigger), true);
        scheduler.start().unwrap();

        // The tick starts at 60s; its first trigger is still sleeping at 65s
        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(trigger.calls().len(), 1);
        assert_eq!(trigger.finished(), 0);

        assert!(scheduler.stop().await);
        assert_eq!(trigger.finished(), 3);
        assert_eq!(scheduler.last_tick().unwrap().triggered, 3);
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_toggle_applies_to_next_tick() {
        let trigger = Arc::new(RecordingTrigger::default());
        let scheduler = scheduler(Arc::clone(&trigger), false);
        scheduler.start().unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(trigger.calls().is_empty());
        assert!(scheduler.last_tick().is_some());

        scheduler.enable_auto_refresh();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(trigger.calls().len(), 3);

        scheduler.disable_auto_refresh();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(trigger.calls().len(), 3);

        scheduler.stop().await;
    }

    #[test]
    fn test_start_outside_runtime() {
        let scheduler = scheduler(Arc::new(RecordingTrigger::default()), false);
        assert!(matches!(scheduler.start(), Err(SyncError::Runtime(_))));
        assert!(!scheduler.is_running());
    }
}
