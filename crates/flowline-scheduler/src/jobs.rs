//! Deferred start job bodies
//!
//! Every job re-fetches its entity and checks its status before acting, so
//! a duplicate, late, or stale delivery degrades to a logged no-op. The
//! queue only promises at-least-once delivery; idempotence lives here.

use chrono::Utc;
use flowline_core::{AppResult, Job, Notice, TaskId, WorkflowId};
use flowline_engine::TaskStatus;
use flowline_history::ChangeSet;
use tracing::{debug, info, warn};

use crate::scheduler::Scheduler;

impl Scheduler {
    pub async fn execute(&self, job: Job) -> AppResult<()> {
        match job {
            Job::StartWorkflow { workflow } => self.start_workflow(workflow).await,
            Job::StartTask { task } => self.start_task(task).await,
        }
    }

    /// SCHEDULED -> INPROGRESS, then hand the chain head to the dispatcher
    /// when it starts within the threshold. Any other status means another
    /// delivery already ran; the job drops out silently.
    async fn start_workflow(&self, id: WorkflowId) -> AppResult<()> {
        let mut workflow = self.store.workflow(id).await?;
        if workflow.status != flowline_engine::WorkflowStatus::Scheduled {
            debug!(
                workflow_id = %id,
                status = workflow.status.as_str(),
                "stale workflow start job ignored"
            );
            return Ok(());
        }
        let prev = workflow.status;
        workflow.start()?;
        self.store.update_workflow(&workflow).await?;
        self.history
            .record(
                ChangeSet::update("workflow", id)
                    .field("status", prev.as_str(), workflow.status.as_str())
                    .into_changes(),
            )
            .await?;
        if let Err(err) = self
            .notifier
            .notify(workflow.creator, Notice::WorkflowStarted { workflow: id })
            .await
        {
            warn!(workflow_id = %id, error = %err, "notification failed");
        }
        info!(workflow_id = %id, "workflow started");

        if let Some(head) = self.store.chain_head(id).await? {
            if head.status == TaskStatus::Upcoming
                && head.start_delta < self.config.dispatch_threshold()
            {
                let now = Utc::now();
                let eta = now + head.start_delta.max(self.config.min_eta_offset());
                self.service.schedule_task(head, eta).await?;
            }
        }
        Ok(())
    }

    /// UPCOMING/SCHEDULED -> ONGOING. Any other status means another delivery
    /// already ran; the job drops out silently.
    async fn start_task(&self, id: TaskId) -> AppResult<()> {
        let mut task = self.store.task(id).await?;
        if !matches!(task.status, TaskStatus::Upcoming | TaskStatus::Scheduled) {
            debug!(
                task_id = %id,
                status = task.status.as_str(),
                "stale task start job ignored"
            );
            return Ok(());
        }
        let prev = task.status;
        task.mark_ongoing()?;
        self.store.update_task(&task).await?;
        self.history
            .record(
                ChangeSet::update("task", id)
                    .field("status", prev.as_str(), task.status.as_str())
                    .into_changes(),
            )
            .await?;
        if let Err(err) = self
            .notifier
            .notify(task.assignee, Notice::TaskStarted { task: id })
            .await
        {
            warn!(task_id = %id, error = %err, "notification failed");
        }
        info!(task_id = %id, "task started");
        Ok(())
    }
}
