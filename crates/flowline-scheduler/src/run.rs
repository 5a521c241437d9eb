//! The scheduling loop
//!
//! One tick: sweep workflows, sweep tasks, then execute everything due on
//! the in-process queue. Scan failures are logged and the loop keeps
//! running; a wedged tick must never stop future ticks.

use chrono::Utc;
use flowline_core::InMemoryDispatcher;
use std::sync::Arc;
use tracing::warn;

use crate::scheduler::Scheduler;

/// Execute every job due on `queue` at or before `until`. Returns how many
/// jobs ran (a failed job still counts as ran; it is logged, not retried).
pub async fn drain_and_execute(
    scheduler: &Scheduler,
    queue: &InMemoryDispatcher,
    until: chrono::DateTime<Utc>,
) -> usize {
    let due = queue.drain_due(until).await;
    let count = due.len();
    for dispatched in due {
        if let Err(err) = scheduler.execute(dispatched.job).await {
            warn!(job = dispatched.job.as_str(), error = %err, "job execution failed");
        }
    }
    count
}

/// Run scans and job execution forever at the configured interval.
pub async fn run_periodic(scheduler: Arc<Scheduler>, queue: Arc<InMemoryDispatcher>) {
    let mut interval = tokio::time::interval(scheduler.config().scan_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let now = Utc::now();
        if let Err(err) = scheduler.scan_workflows(now).await {
            warn!(error = %err, "workflow scan failed");
        }
        if let Err(err) = scheduler.scan_tasks(now).await {
            warn!(error = %err, "task scan failed");
        }
        drain_and_execute(&scheduler, &queue, now).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::test_support::{scheduler_fixture, seed_company};
    use chrono::Duration;
    use flowline_engine::{TaskSpec, TaskStatus, WorkflowSpec, WorkflowStatus, WorkflowStore};

    #[tokio::test]
    async fn test_drain_runs_due_jobs_and_keeps_future_ones() {
        let fx = scheduler_fixture();
        let (creator, assignee) = seed_company(&fx).await;
        let start_at = Utc::now() + Duration::minutes(2);

        let workflow = fx
            .service
            .create_workflow(WorkflowSpec {
                template: flowline_core::TemplateId::new(),
                name: "Drain".into(),
                creator,
                start_at,
                tasks: vec![TaskSpec {
                    title: "Step".into(),
                    description: String::new(),
                    assignee,
                    start_delta: Duration::zero(),
                    duration: Duration::hours(1),
                }],
                accessors: Default::default(),
            })
            .await
            .unwrap();
        assert_eq!(fx.dispatcher.len().await, 1);

        // Nothing is due yet.
        assert_eq!(drain_and_execute(&fx.scheduler, &fx.dispatcher, Utc::now()).await, 0);
        assert_eq!(fx.dispatcher.len().await, 1);

        // At the start time the workflow job fires and enqueues the head's.
        let ran = drain_and_execute(&fx.scheduler, &fx.dispatcher, start_at).await;
        assert_eq!(ran, 1);
        assert_eq!(
            fx.store.workflow(workflow.id).await.unwrap().status,
            WorkflowStatus::InProgress
        );
        let head = fx.store.chain_head(workflow.id).await.unwrap().unwrap();
        assert_eq!(head.status, TaskStatus::Scheduled);
        assert_eq!(fx.dispatcher.len().await, 1);
    }
}
