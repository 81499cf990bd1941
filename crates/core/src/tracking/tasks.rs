//! Once-per-day guard for scheduled tasks.
//!
//! Execution dates are persisted to the state store and mirrored in memory.
//! The mirror is loaded once at open and updated only after a successful
//! write, so a failed persist never makes a task look done.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::Error;
use crate::clock::Clock;
use crate::store::StateDb;

pub struct TaskExecutionTracker {
    db: StateDb,
    clock: Arc<dyn Clock>,
    state: RwLock<HashMap<String, NaiveDate>>,
}

impl TaskExecutionTracker {
    /// Load all known execution dates from `db`.
    pub async fn open(db: StateDb, clock: Arc<dyn Clock>) -> Result<Self, Error> {
        let state = db.load_task_executions().await?;
        tracing::debug!(tasks = state.len(), "loaded task executions");
        Ok(Self { db, clock, state: RwLock::new(state) })
    }

    /// True unless `task_name` already completed today in the configured
    /// timezone.
    pub async fn can_run_today(&self, task_name: &str) -> bool {
        let today = self.clock.today();
        self.state.read().await.get(task_name).is_none_or(|last| *last < today)
    }

    /// Mark `task_name` as completed today.
    pub async fn mark_task_executed(&self, task_name: &str) -> Result<(), Error> {
        let today = self.clock.today();
        self.db.set_task_execution(task_name, today).await?;
        self.state.write().await.insert(task_name.to_string(), today);
        tracing::info!(task = task_name, %today, "task marked executed");
        Ok(())
    }

    pub async fn last_execution_date(&self, task_name: &str) -> Option<NaiveDate> {
        self.state.read().await.get(task_name).copied()
    }
}
