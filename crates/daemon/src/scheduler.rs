//! Daily task scheduling.
//!
//! Each task fires once per calendar day at a local time in the reference
//! timezone. On start every enabled task that has not completed today runs
//! immediately, so a daemon that was down at fire time still does the
//! day's work. [`TaskExecutionTracker`] makes every run idempotent per day:
//! a task is marked executed only after it succeeds, and never runs twice
//! on the same date.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Days, LocalResult, NaiveTime, TimeDelta, TimeZone};
use chrono_tz::Tz;
use strips_core::clock::Clock;
use strips_core::config::{AppConfig, ConfigError, parse_time_of_day};
use strips_core::tracking::TaskExecutionTracker;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{ComicManagementFacade, FacadeError};

pub const DAILY_UPDATE_TASK: &str = "DailyComicCacher";
pub const RECONCILIATION_TASK: &str = "ComicReconciliation";
pub const RETRIEVAL_PURGE_TASK: &str = "RetrievalRecordPurge";
pub const BACKFILL_TASK: &str = "ComicBackfill";

/// A unit of scheduled work.
#[async_trait]
pub trait Job: Send + Sync {
    /// Stable name, used as the execution-tracking key.
    fn name(&self) -> &'static str;

    async fn run(&self) -> Result<(), FacadeError>;
}

/// Updates every enabled comic.
pub struct DailyRunner {
    facade: Arc<ComicManagementFacade>,
}

impl DailyRunner {
    pub fn new(facade: Arc<ComicManagementFacade>) -> Self {
        Self { facade }
    }
}

#[async_trait]
impl Job for DailyRunner {
    fn name(&self) -> &'static str {
        DAILY_UPDATE_TASK
    }

    /// Per-comic failures are reported in the batch and do not fail the task.
    async fn run(&self) -> Result<(), FacadeError> {
        let batch = self.facade.update_all_comics().await;
        tracing::info!(
            comics = batch.reports.len(),
            stored = batch.stored_count(),
            failed = batch.failed_count(),
            "daily update complete"
        );
        Ok(())
    }
}

/// Adds bootstrap comics missing from the catalog.
pub struct StartupReconciler {
    facade: Arc<ComicManagementFacade>,
}

impl StartupReconciler {
    pub fn new(facade: Arc<ComicManagementFacade>) -> Self {
        Self { facade }
    }
}

#[async_trait]
impl Job for StartupReconciler {
    fn name(&self) -> &'static str {
        RECONCILIATION_TASK
    }

    async fn run(&self) -> Result<(), FacadeError> {
        let added = self.facade.reconcile_with_bootstrap().await?;
        tracing::info!(added = added.len(), "reconciliation complete");
        Ok(())
    }
}

/// Fills gaps in the target year for every enabled comic.
pub struct BackfillJob {
    facade: Arc<ComicManagementFacade>,
}

impl BackfillJob {
    pub fn new(facade: Arc<ComicManagementFacade>) -> Self {
        Self { facade }
    }
}

#[async_trait]
impl Job for BackfillJob {
    fn name(&self) -> &'static str {
        BACKFILL_TASK
    }

    async fn run(&self) -> Result<(), FacadeError> {
        let batch = self.facade.backfill_all_comics().await;
        tracing::info!(
            comics = batch.reports.len(),
            stored = batch.stored_count(),
            failed = batch.failed_count(),
            "backfill complete"
        );
        Ok(())
    }
}

/// Drops retrieval records past the retention window.
pub struct RetrievalPurgeJob {
    facade: Arc<ComicManagementFacade>,
    days_to_keep: u32,
}

impl RetrievalPurgeJob {
    pub fn new(facade: Arc<ComicManagementFacade>, days_to_keep: u32) -> Self {
        Self { facade, days_to_keep }
    }
}

#[async_trait]
impl Job for RetrievalPurgeJob {
    fn name(&self) -> &'static str {
        RETRIEVAL_PURGE_TASK
    }

    async fn run(&self) -> Result<(), FacadeError> {
        let purged = self.facade.purge_old_retrieval_records(self.days_to_keep).await?;
        tracing::info!(purged, days_to_keep = self.days_to_keep, "retrieval purge complete");
        Ok(())
    }
}

/// Run `job` unless it already completed today.
///
/// Returns whether the job ran.
pub async fn run_if_due(job: &dyn Job, tracker: &TaskExecutionTracker) -> Result<bool, FacadeError> {
    let name = job.name();
    if !tracker.can_run_today(name).await {
        tracing::debug!(task = name, "already ran today");
        return Ok(false);
    }

    tracing::info!(task = name, "task started");
    let started = Instant::now();
    job.run().await?;
    tracker.mark_task_executed(name).await?;
    tracing::info!(task = name, elapsed_ms = started.elapsed().as_millis() as u64, "task finished");
    Ok(true)
}

/// First instant strictly after `now` whose local wall time is `at`.
///
/// A time skipped by a DST jump fires one hour later; a repeated time
/// fires on its first occurrence.
pub fn next_fire_after(now: DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();
    for offset in 0..=2 {
        let Some(day) = today.checked_add_days(Days::new(offset)) else { break };
        let local = day.and_time(at);
        let fire = match tz.from_local_datetime(&local) {
            LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => Some(t),
            LocalResult::None => tz.from_local_datetime(&(local + TimeDelta::hours(1))).earliest(),
        };
        if let Some(fire) = fire
            && fire > now
        {
            return fire;
        }
    }
    now + TimeDelta::days(1)
}

struct TaskEntry {
    job: Arc<dyn Job>,
    at: watch::Sender<NaiveTime>,
}

/// Owns the daily tasks and their timer loops.
pub struct Scheduler {
    tasks: Vec<TaskEntry>,
    tracker: Arc<TaskExecutionTracker>,
    clock: Arc<dyn Clock>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Scheduler with no tasks.
    pub fn empty(tracker: Arc<TaskExecutionTracker>, clock: Arc<dyn Clock>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { tasks: Vec::new(), tracker, clock, shutdown, handles: Vec::new() }
    }

    /// Scheduler with the enabled built-in tasks, in catch-up order:
    /// reconciliation, daily update, backfill, retrieval purge.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a fire time that is not `HH:MM`.
    pub fn new(
        facade: &Arc<ComicManagementFacade>, tracker: Arc<TaskExecutionTracker>, clock: Arc<dyn Clock>,
        app: &AppConfig,
    ) -> Result<Self, ConfigError> {
        let config = &app.scheduler;
        let mut scheduler = Self::empty(tracker, clock);
        if config.reconcile_enabled {
            let at = fire_time("scheduler.reconcile_time", &config.reconcile_time)?;
            scheduler = scheduler.with_job(Arc::new(StartupReconciler::new(facade.clone())), at);
        }
        if config.daily_enabled {
            let at = fire_time("scheduler.daily_time", &config.daily_time)?;
            scheduler = scheduler.with_job(Arc::new(DailyRunner::new(facade.clone())), at);
        }
        if config.backfill_enabled {
            let at = fire_time("scheduler.backfill_time", &config.backfill_time)?;
            scheduler = scheduler.with_job(Arc::new(BackfillJob::new(facade.clone())), at);
        }
        if config.purge_enabled {
            let at = fire_time("scheduler.purge_time", &config.purge_time)?;
            let job = RetrievalPurgeJob::new(facade.clone(), app.retention_days);
            scheduler = scheduler.with_job(Arc::new(job), at);
        }
        Ok(scheduler)
    }

    pub fn with_job(mut self, job: Arc<dyn Job>, at: NaiveTime) -> Self {
        let (at, _) = watch::channel(at);
        self.tasks.push(TaskEntry { job, at });
        self
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.job.name()).collect()
    }

    /// Run every task that has not completed today, in registration order.
    ///
    /// Returns how many ran. Failures are logged and leave the task due.
    pub async fn catch_up(&self) -> usize {
        let mut ran = 0;
        for task in &self.tasks {
            match run_if_due(task.job.as_ref(), &self.tracker).await {
                Ok(true) => ran += 1,
                Ok(false) => {}
                Err(e) => tracing::error!(task = task.job.name(), "catch-up run failed: {e}"),
            }
        }
        ran
    }

    /// Catch up, then spawn one timer loop per task.
    pub async fn start(&mut self) {
        let ran = self.catch_up().await;
        tracing::info!(tasks = self.tasks.len(), caught_up = ran, "scheduler started");

        for task in &self.tasks {
            let handle = tokio::spawn(run_loop(
                task.job.clone(),
                self.tracker.clone(),
                self.clock.clone(),
                task.at.subscribe(),
                self.shutdown.subscribe(),
            ));
            self.handles.push(handle);
        }
    }

    /// Change a task's fire time. Takes effect for the next fire.
    ///
    /// Returns `false` if no task with that name is scheduled.
    pub fn reschedule(&self, task_name: &str, at: NaiveTime) -> bool {
        let Some(task) = self.tasks.iter().find(|t| t.job.name() == task_name) else {
            return false;
        };
        task.at.send_replace(at);
        tracing::info!(task = task_name, %at, "task rescheduled");
        true
    }

    pub fn schedule_reconciliation(&self, at: NaiveTime) -> bool {
        self.reschedule(RECONCILIATION_TASK, at)
    }

    /// Stop all timer loops. A task already running finishes first.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!("scheduler task ended abnormally: {e}");
            }
        }
        tracing::info!("scheduler stopped");
    }
}

fn fire_time(field: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    parse_time_of_day(value)
        .ok_or_else(|| ConfigError::Invalid { field: field.into(), reason: format!("{value:?} is not HH:MM") })
}

async fn run_loop(
    job: Arc<dyn Job>, tracker: Arc<TaskExecutionTracker>, clock: Arc<dyn Clock>, mut at: watch::Receiver<NaiveTime>,
    mut shutdown: watch::Receiver<bool>,
) {
    let name = job.name();
    loop {
        let now = clock.local_now();
        let fire = next_fire_after(now, *at.borrow());
        let wait = (fire - now).to_std().unwrap_or_default();
        tracing::debug!(task = name, %fire, "next run scheduled");

        tokio::select! {
            () = tokio::time::sleep(wait) => {
                if let Err(e) = run_if_due(job.as_ref(), &tracker).await {
                    tracing::error!(task = name, "scheduled run failed: {e}");
                }
            }
            changed = at.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!(task = name, "timer loop stopped");
}
