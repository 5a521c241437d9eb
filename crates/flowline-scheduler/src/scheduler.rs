//! Periodic scans
//!
//! The scans are the safety net behind the event-driven paths: anything the
//! immediate-dispatch shortcuts left UPCOMING/INITIATED gets picked up here
//! once its start moves inside the lookahead window. A failure on one entity
//! is logged and never aborts the rest of the sweep.

use chrono::{DateTime, Utc};
use flowline_core::{AppResult, Notifier, SchedulerConfig};
use flowline_engine::{expected_start, Task, TaskStatus, WorkflowService, WorkflowStatus, WorkflowStore};
use flowline_history::HistoryRecorder;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Scheduler {
    pub(crate) service: Arc<WorkflowService>,
    pub(crate) store: Arc<dyn WorkflowStore>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) history: Arc<dyn HistoryRecorder>,
    pub(crate) config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        service: Arc<WorkflowService>,
        store: Arc<dyn WorkflowStore>,
        notifier: Arc<dyn Notifier>,
        history: Arc<dyn HistoryRecorder>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            service,
            store,
            notifier,
            history,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Schedule every INITIATED workflow starting inside the lookahead
    /// window. Returns how many were dispatched.
    pub async fn scan_workflows(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let cutoff = now + self.config.workflow_lookahead();
        let due = self.store.workflows_to_schedule(cutoff).await?;
        let mut dispatched = 0;
        for workflow in due {
            match self.service.schedule_workflow(workflow.clone(), now).await {
                Ok(_) => dispatched += 1,
                Err(err) => {
                    warn!(workflow_id = %workflow.id, error = %err, "workflow scan entry failed");
                }
            }
        }
        if dispatched > 0 {
            info!(dispatched, "workflow scan complete");
        }
        Ok(dispatched)
    }

    /// Schedule every UPCOMING task whose dependency is met and whose
    /// expected start falls inside the lookahead window. Returns how many
    /// were dispatched.
    pub async fn scan_tasks(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let mut dispatched = 0;
        for task in self.store.pending_tasks().await? {
            match self.try_schedule_pending(&task, now).await {
                Ok(true) => dispatched += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(task_id = %task.id, error = %err, "task scan entry failed");
                }
            }
        }
        if dispatched > 0 {
            info!(dispatched, "task scan complete");
        }
        Ok(dispatched)
    }

    async fn try_schedule_pending(&self, task: &Task, now: DateTime<Utc>) -> AppResult<bool> {
        if !self.dependency_met(task).await? {
            return Ok(false);
        }
        let start = expected_start(self.store.as_ref(), task).await?;
        if start - now >= self.config.task_lookahead() {
            return Ok(false);
        }
        let eta = if start > now {
            start
        } else {
            now + self.config.min_eta_offset()
        };
        self.service.schedule_task(task.clone(), eta).await?;
        Ok(true)
    }

    /// A chain head may start once its workflow is running; any other task
    /// waits for its parent to complete.
    async fn dependency_met(&self, task: &Task) -> AppResult<bool> {
        match task.parent_task {
            Some(parent) => Ok(self.store.task(parent).await?.status == TaskStatus::Complete),
            None => Ok(self.store.workflow(task.workflow).await?.status
                == WorkflowStatus::InProgress),
        }
    }
}
