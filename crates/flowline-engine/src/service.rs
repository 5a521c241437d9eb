//! Workflow orchestration service
//!
//! `WorkflowService` owns the write paths: validated creation of a workflow
//! with its task chain and accessor grants, guarded edits, and the
//! completion cascade that schedules the next task or closes the workflow.
//! Every accepted mutation records per-field history; notifications are
//! fire-and-forget and never fail the mutation.

use chrono::{DateTime, Duration, Utc};
use flowline_core::types::{display_opt, display_secs};
use flowline_core::{
    AppError, AppResult, EmployeeId, Job, JobDispatcher, Notice, Notifier, SchedulerConfig,
    TaskId, TemplateId, WorkflowId,
};
use flowline_history::{ChangeSet, HistoryRecorder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::employee::{Employee, EmployeeDirectory};
use crate::store::WorkflowStore;
use crate::task::Task;
use crate::timeline::{expected_start, has_conflict, ConflictMemo};
use crate::workflow::{Workflow, WorkflowStatus};

/// One task in a creation request, in chain order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub assignee: EmployeeId,
    #[serde(with = "flowline_core::types::duration_secs")]
    pub start_delta: Duration,
    #[serde(with = "flowline_core::types::duration_secs")]
    pub duration: Duration,
}

/// Desired accessor sets for a workflow. Must be disjoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessorSpec {
    #[serde(default)]
    pub read: HashSet<EmployeeId>,
    #[serde(default)]
    pub write: HashSet<EmployeeId>,
}

/// A full workflow creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub template: TemplateId,
    pub name: String,
    pub creator: EmployeeId,
    pub start_at: DateTime<Utc>,
    pub tasks: Vec<TaskSpec>,
    #[serde(default)]
    pub accessors: AccessorSpec,
}

/// Partial edit of a workflow. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct WorkflowUpdate {
    pub name: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
}

/// Partial edit of a task. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assignee: Option<EmployeeId>,
    pub start_delta: Option<Duration>,
    pub duration: Option<Duration>,
}

pub struct WorkflowService {
    pub(crate) store: Arc<dyn WorkflowStore>,
    pub(crate) directory: Arc<dyn EmployeeDirectory>,
    pub(crate) dispatcher: Arc<dyn JobDispatcher>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) history: Arc<dyn HistoryRecorder>,
    pub(crate) config: SchedulerConfig,
}

impl WorkflowService {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        directory: Arc<dyn EmployeeDirectory>,
        dispatcher: Arc<dyn JobDispatcher>,
        notifier: Arc<dyn Notifier>,
        history: Arc<dyn HistoryRecorder>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            directory,
            dispatcher,
            notifier,
            history,
            config,
        }
    }

    /// Create a workflow with its task chain and accessor grants.
    ///
    /// Validation happens entirely before the first write: the creator must
    /// be an active admin, every assignee an active employee of the same
    /// company, and every task conflict-free against both the assignees'
    /// existing load and the earlier tasks of this batch. A single failure
    /// rejects the whole request.
    ///
    /// If the workflow starts sooner than the dispatch threshold it is
    /// scheduled immediately instead of waiting for the periodic scan.
    pub async fn create_workflow(&self, spec: WorkflowSpec) -> AppResult<Workflow> {
        let now = Utc::now();
        if spec.start_at <= now {
            return Err(AppError::validation("start_at", "must be in the future"));
        }
        if spec.tasks.is_empty() {
            return Err(AppError::validation("tasks", "at least one task is required"));
        }

        let creator = self.active_employee(spec.creator).await?;
        if !creator.is_admin {
            return Err(AppError::validation(
                "creator",
                "only admin employees may create workflows",
            ));
        }

        for (index, task) in spec.tasks.iter().enumerate() {
            if task.duration <= Duration::zero() {
                return Err(AppError::validation(
                    "tasks",
                    format!("task {index} must have a positive duration"),
                ));
            }
            if task.start_delta < Duration::zero() {
                return Err(AppError::validation(
                    "tasks",
                    format!("task {index} must not have a negative start delta"),
                ));
            }
            let assignee = self.active_employee(task.assignee).await?;
            if assignee.company != creator.company {
                return Err(AppError::validation(
                    "tasks",
                    format!("task {index} assignee must belong to the creator's company"),
                ));
            }
        }

        // Accessor validation happens here, before the first write; the
        // reconciler re-checks but can no longer fail after persistence.
        if spec
            .accessors
            .read
            .intersection(&spec.accessors.write)
            .next()
            .is_some()
        {
            return Err(AppError::validation(
                "accessors",
                "read and write permission sets must be disjoint",
            ));
        }
        for employee_id in spec.accessors.read.union(&spec.accessors.write) {
            if *employee_id == creator.id {
                continue;
            }
            let accessor = self.active_employee(*employee_id).await?;
            if accessor.company != creator.company {
                return Err(AppError::validation(
                    "accessors",
                    "accessor must belong to the creator's company",
                ));
            }
        }

        // Walk the chain once with a running end, checking each task against
        // both stored load and the batch's already-accepted intervals.
        let mut memo = ConflictMemo::new();
        let exclude = HashSet::new();
        let mut running_end = spec.start_at;
        for (index, task) in spec.tasks.iter().enumerate() {
            let cand_start = running_end + task.start_delta;
            let cand_end = cand_start + task.duration;
            if has_conflict(
                self.store.as_ref(),
                task.assignee,
                cand_start,
                cand_end,
                &exclude,
                &mut memo,
            )
            .await?
            {
                return Err(AppError::validation(
                    "tasks",
                    format!("task {index} overlaps another task of its assignee"),
                ));
            }
            memo.note(task.assignee, cand_start, cand_end);
            running_end = cand_end;
        }

        let workflow = Workflow::new(spec.template, &spec.name, creator.id, spec.start_at);
        let mut tasks: Vec<Task> = Vec::with_capacity(spec.tasks.len());
        let mut parent: Option<TaskId> = None;
        for task_spec in &spec.tasks {
            let mut task = Task::new(
                workflow.id,
                &task_spec.title,
                task_spec.assignee,
                task_spec.start_delta,
                task_spec.duration,
            )
            .with_description(&task_spec.description);
            task.parent_task = parent;
            parent = Some(task.id);
            tasks.push(task);
        }

        self.store.insert_workflow(&workflow).await?;
        self.store.insert_tasks(&tasks).await?;

        let mut changes = workflow.creation_changes();
        for task in &tasks {
            changes.extend(task.creation_changes());
        }
        self.history.record(changes).await?;

        self.reconcile_accessors(
            workflow.id,
            spec.accessors.read.clone(),
            spec.accessors.write.clone(),
        )
        .await?;

        self.try_notify(creator.id, Notice::WorkflowCreated { workflow: workflow.id })
            .await;
        for task in &tasks {
            self.try_notify(task.assignee, Notice::TaskAssigned { task: task.id })
                .await;
        }

        let mut workflow = workflow;
        if workflow.start_at - now < self.config.dispatch_threshold() {
            workflow = self.schedule_workflow(workflow, now).await?;
        }

        info!(
            workflow_id = %workflow.id,
            tasks = tasks.len(),
            status = workflow.status.as_str(),
            "workflow created"
        );
        Ok(workflow)
    }

    /// Edit a workflow's name or start time. Only INITIATED workflows may be
    /// edited; a new start time must leave at least the edit guard before it.
    pub async fn update_workflow(
        &self,
        id: WorkflowId,
        update: WorkflowUpdate,
    ) -> AppResult<Workflow> {
        let mut workflow = self.store.workflow(id).await?;
        if workflow.status != WorkflowStatus::Initiated {
            return Err(AppError::validation(
                "status",
                format!(
                    "workflow in status {} can no longer be edited",
                    workflow.status.as_str()
                ),
            ));
        }

        let mut changes = ChangeSet::update("workflow", id);
        if let Some(name) = update.name {
            if name != workflow.name {
                changes = changes.field("name", &workflow.name, &name);
                workflow.name = name;
            }
        }
        if let Some(start_at) = update.start_at {
            if start_at != workflow.start_at {
                let now = Utc::now();
                // Guard both ends of the move: a workflow about to start may
                // not be retimed, and the new start must leave the same room.
                if workflow.start_at - now < self.config.edit_guard() {
                    return Err(AppError::validation(
                        "start_at",
                        "workflow starts too soon to be retimed",
                    ));
                }
                if start_at - now < self.config.edit_guard() {
                    return Err(AppError::validation(
                        "start_at",
                        "new start time is too close to now",
                    ));
                }
                changes = changes.field("start_at", workflow.start_at, start_at);
                workflow.start_at = start_at;
            }
        }

        if changes.is_empty() {
            return Ok(workflow);
        }
        self.store.update_workflow(&workflow).await?;
        self.history.record(changes.into_changes()).await?;
        self.try_notify(workflow.creator, Notice::WorkflowUpdated { workflow: id })
            .await;
        Ok(workflow)
    }

    /// Edit a task. Retiming and reassignment are refused once the task has
    /// started, inside the edit guard window, or when the new placement
    /// would conflict with the assignee's other tasks.
    pub async fn update_task(&self, id: TaskId, update: TaskUpdate) -> AppResult<Task> {
        let task = self.store.task(id).await?;
        if task.status.is_terminal() {
            return Err(AppError::validation(
                "status",
                "a complete task can no longer be edited",
            ));
        }

        let retimed = update
            .start_delta
            .is_some_and(|delta| delta != task.start_delta)
            || update.duration.is_some_and(|duration| duration != task.duration);
        let reassigned = update
            .assignee
            .is_some_and(|assignee| assignee != task.assignee);

        if retimed && task.status.has_started() {
            return Err(AppError::validation(
                "start_delta",
                "a started task can no longer be retimed",
            ));
        }

        if reassigned {
            // The current assignee only anchors the company scope; they may
            // already be deactivated (the usual reason to reassign).
            let current = self
                .directory
                .find(task.assignee)
                .await?
                .ok_or_else(|| AppError::not_found("employee", task.assignee))?;
            let next = self.active_employee(update.assignee.unwrap_or(task.assignee)).await?;
            if next.company != current.company {
                return Err(AppError::validation(
                    "assignee",
                    "new assignee must belong to the same company",
                ));
            }
        }

        let mut candidate = task.clone();
        let mut changes = ChangeSet::update("task", id);
        if let Some(title) = update.title {
            if title != candidate.title {
                changes = changes.field("title", &candidate.title, &title);
                candidate.title = title;
            }
        }
        if let Some(description) = update.description {
            if description != candidate.description {
                changes = changes.field("description", &candidate.description, &description);
                candidate.description = description;
            }
        }
        if let Some(assignee) = update.assignee {
            if assignee != candidate.assignee {
                changes = changes.field("assignee", candidate.assignee, assignee);
                candidate.assignee = assignee;
            }
        }
        if let Some(start_delta) = update.start_delta {
            if start_delta != candidate.start_delta {
                changes = changes.field(
                    "start_delta",
                    display_secs(&candidate.start_delta),
                    display_secs(&start_delta),
                );
                candidate.start_delta = start_delta;
            }
        }
        if let Some(duration) = update.duration {
            if duration != candidate.duration {
                changes = changes.field(
                    "duration",
                    display_secs(&candidate.duration),
                    display_secs(&duration),
                );
                candidate.duration = duration;
            }
        }

        if changes.is_empty() {
            return Ok(task);
        }

        if retimed || reassigned {
            let start = expected_start(self.store.as_ref(), &candidate).await?;
            if start - Utc::now() < self.config.edit_guard() {
                return Err(AppError::validation(
                    "start_delta",
                    "task starts too soon to be retimed or reassigned",
                ));
            }
            let mut memo = ConflictMemo::new();
            let exclude = HashSet::from([id]);
            if has_conflict(
                self.store.as_ref(),
                candidate.assignee,
                start,
                start + candidate.duration,
                &exclude,
                &mut memo,
            )
            .await?
            {
                return Err(AppError::validation(
                    "tasks",
                    "new placement overlaps another task of the assignee",
                ));
            }
        }

        self.store.update_task(&candidate).await?;
        self.history.record(changes.into_changes()).await?;
        let notice = if reassigned {
            Notice::TaskAssigned { task: id }
        } else {
            Notice::TaskUpdated { task: id }
        };
        self.try_notify(candidate.assignee, notice).await;
        Ok(candidate)
    }

    /// Complete an ONGOING task and drive the cascade: schedule the
    /// successor when it starts within the dispatch threshold, or complete
    /// the workflow when this was the last task in the chain.
    pub async fn complete_task(&self, id: TaskId) -> AppResult<Task> {
        let now = Utc::now();
        let mut task = self.store.task(id).await?;
        let prev_status = task.status;
        task.mark_complete(now)?;
        self.store.update_task(&task).await?;
        self.history
            .record(
                ChangeSet::update("task", id)
                    .field("status", prev_status.as_str(), task.status.as_str())
                    .field("completed_at", "none", display_opt(&task.completed_at))
                    .into_changes(),
            )
            .await?;
        self.try_notify(task.assignee, Notice::TaskCompleted { task: id })
            .await;

        match self.store.successor_of(id).await? {
            Some(successor) if successor.start_delta < self.config.dispatch_threshold() => {
                let eta = now + successor.start_delta.max(self.config.min_eta_offset());
                self.schedule_task(successor, eta).await?;
            }
            Some(successor) => {
                // Left UPCOMING; the periodic scan picks it up closer to its
                // start time.
                info!(
                    task_id = %successor.id,
                    start_delta = %display_secs(&successor.start_delta),
                    "successor deferred to periodic scan"
                );
            }
            None => {
                let mut workflow = self.store.workflow(task.workflow).await?;
                let prev = workflow.status;
                workflow.complete(now)?;
                self.store.update_workflow(&workflow).await?;
                self.history
                    .record(
                        ChangeSet::update("workflow", workflow.id)
                            .field("status", prev.as_str(), workflow.status.as_str())
                            .field("completed_at", "none", display_opt(&workflow.completed_at))
                            .into_changes(),
                    )
                    .await?;
                self.try_notify(
                    workflow.creator,
                    Notice::WorkflowCompleted { workflow: workflow.id },
                )
                .await;
                info!(workflow_id = %workflow.id, "workflow completed");
            }
        }
        Ok(task)
    }

    /// Mark a workflow SCHEDULED and dispatch its deferred start job. The
    /// ETA never lands in the past: a past-due start fires after the minimum
    /// offset instead.
    pub async fn schedule_workflow(
        &self,
        mut workflow: Workflow,
        now: DateTime<Utc>,
    ) -> AppResult<Workflow> {
        let prev = workflow.status;
        workflow.mark_scheduled()?;
        let eta = if workflow.start_at > now {
            workflow.start_at
        } else {
            now + self.config.min_eta_offset()
        };
        self.dispatcher
            .dispatch(Job::StartWorkflow { workflow: workflow.id }, eta)
            .await?;
        self.store.update_workflow(&workflow).await?;
        self.history
            .record(
                ChangeSet::update("workflow", workflow.id)
                    .field("status", prev.as_str(), workflow.status.as_str())
                    .into_changes(),
            )
            .await?;
        info!(workflow_id = %workflow.id, eta = %eta, "workflow start dispatched");
        Ok(workflow)
    }

    /// Mark a task SCHEDULED and dispatch its deferred start job at `eta`.
    /// Callers pick the ETA: the completion cascade counts `start_delta`
    /// from now, the periodic scan aims at the expected start.
    pub async fn schedule_task(&self, mut task: Task, eta: DateTime<Utc>) -> AppResult<Task> {
        let prev = task.status;
        task.mark_scheduled()?;
        self.dispatcher
            .dispatch(Job::StartTask { task: task.id }, eta)
            .await?;
        self.store.update_task(&task).await?;
        self.history
            .record(
                ChangeSet::update("task", task.id)
                    .field("status", prev.as_str(), task.status.as_str())
                    .into_changes(),
            )
            .await?;
        info!(task_id = %task.id, %eta, "task start dispatched");
        Ok(task)
    }

    pub(crate) async fn active_employee(&self, id: EmployeeId) -> AppResult<Employee> {
        let employee = self
            .directory
            .find(id)
            .await?
            .ok_or_else(|| AppError::not_found("employee", id))?;
        if !employee.is_active() {
            return Err(AppError::validation(
                "employee",
                format!("employee {id} is not active"),
            ));
        }
        Ok(employee)
    }

    /// Notification failures are logged, never propagated.
    pub(crate) async fn try_notify(&self, employee: EmployeeId, notice: Notice) {
        if let Err(err) = self.notifier.notify(employee, notice).await {
            warn!(employee_id = %employee, notice = notice.kind(), error = %err, "notification failed");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{service_fixture, ServiceFixture};
    use super::*;
    use crate::employee::EmployeeStatus;
    use crate::task::TaskStatus;
    use flowline_core::CompanyId;

    async fn admin(fx: &ServiceFixture, company: CompanyId) -> Employee {
        let employee = Employee::new(company, "Admin").with_admin(true);
        fx.directory.insert(employee.clone()).await;
        employee
    }

    async fn member(fx: &ServiceFixture, company: CompanyId) -> EmployeeId {
        let employee = Employee::new(company, "Member");
        let id = employee.id;
        fx.directory.insert(employee).await;
        id
    }

    fn task_spec(assignee: EmployeeId, delta_min: i64, duration_min: i64) -> TaskSpec {
        TaskSpec {
            title: "Step".into(),
            description: String::new(),
            assignee,
            start_delta: Duration::minutes(delta_min),
            duration: Duration::minutes(duration_min),
        }
    }

    fn spec_with_tasks(
        creator: EmployeeId,
        start_at: DateTime<Utc>,
        tasks: Vec<TaskSpec>,
    ) -> WorkflowSpec {
        WorkflowSpec {
            template: TemplateId::new(),
            name: "Onboarding".into(),
            creator,
            start_at,
            tasks,
            accessors: AccessorSpec::default(),
        }
    }

    #[tokio::test]
    async fn test_create_links_chain_and_records_history() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;
        let assignee = member(&fx, company).await;

        let workflow = fx
            .service
            .create_workflow(spec_with_tasks(
                creator.id,
                Utc::now() + Duration::days(1),
                vec![
                    task_spec(assignee, 0, 60),
                    task_spec(assignee, 15, 30),
                    task_spec(assignee, 0, 45),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Initiated);
        let tasks = fx.store.tasks_for_workflow(workflow.id).await.unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks.iter().filter(|t| t.parent_task.is_none()).count(), 1);

        // The chain walks head to tail through parent links.
        let head = fx.store.chain_head(workflow.id).await.unwrap().unwrap();
        let second = fx.store.successor_of(head.id).await.unwrap().unwrap();
        let third = fx.store.successor_of(second.id).await.unwrap().unwrap();
        assert!(fx.store.successor_of(third.id).await.unwrap().is_none());

        // Creation history covers the workflow and every task field.
        assert!(!fx
            .history
            .entries_for("workflow", &workflow.id.to_string())
            .await
            .is_empty());
        assert_eq!(
            fx.history
                .entries_for("task", &head.id.to_string())
                .await
                .len(),
            9
        );
    }

    #[tokio::test]
    async fn test_create_rejects_past_start() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;
        let assignee = member(&fx, company).await;

        let result = fx
            .service
            .create_workflow(spec_with_tasks(
                creator.id,
                Utc::now() - Duration::minutes(1),
                vec![task_spec(assignee, 0, 60)],
            ))
            .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_create_requires_admin_creator() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = member(&fx, company).await;
        let assignee = member(&fx, company).await;

        let result = fx
            .service
            .create_workflow(spec_with_tasks(
                creator,
                Utc::now() + Duration::days(1),
                vec![task_spec(assignee, 0, 60)],
            ))
            .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_create_rejects_inactive_assignee() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;
        let inactive = Employee::new(company, "Gone").with_status(EmployeeStatus::Inactive);
        let inactive_id = inactive.id;
        fx.directory.insert(inactive).await;

        let result = fx
            .service
            .create_workflow(spec_with_tasks(
                creator.id,
                Utc::now() + Duration::days(1),
                vec![task_spec(inactive_id, 0, 60)],
            ))
            .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_batch_conflict_rejects_whole_request() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;
        let busy = member(&fx, company).await;
        let start_at = Utc::now() + Duration::days(1);

        // First workflow books the assignee for the first hour.
        fx.service
            .create_workflow(spec_with_tasks(
                creator.id,
                start_at,
                vec![task_spec(busy, 0, 60)],
            ))
            .await
            .unwrap();

        // Second workflow's second task lands inside that hour.
        let result = fx
            .service
            .create_workflow(spec_with_tasks(
                creator.id,
                start_at - Duration::minutes(40),
                vec![task_spec(busy, 0, 10), task_spec(busy, 20, 30)],
            ))
            .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));

        // Nothing from the rejected batch was persisted.
        let all: Vec<_> = fx.store.active_tasks_for_assignee(busy).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_back_to_back_chain_for_one_assignee_is_accepted() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;
        let solo = member(&fx, company).await;

        // The running end places the second task after the first, so one
        // assignee may hold consecutive tasks of the same chain.
        let result = fx
            .service
            .create_workflow(spec_with_tasks(
                creator.id,
                Utc::now() + Duration::days(1),
                vec![task_spec(solo, 0, 60), task_spec(solo, 0, 30)],
            ))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_near_start_creation_schedules_immediately() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;
        let assignee = member(&fx, company).await;
        let start_at = Utc::now() + Duration::minutes(2);

        let workflow = fx
            .service
            .create_workflow(spec_with_tasks(
                creator.id,
                start_at,
                vec![task_spec(assignee, 0, 60)],
            ))
            .await
            .unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Scheduled);
        let pending = fx.dispatcher.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job, Job::StartWorkflow { workflow: workflow.id });
        assert_eq!(pending[0].eta, start_at);
    }

    #[tokio::test]
    async fn test_update_task_rejects_retiming_started_task() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;
        let assignee = member(&fx, company).await;

        let workflow = fx
            .service
            .create_workflow(spec_with_tasks(
                creator.id,
                Utc::now() + Duration::days(1),
                vec![task_spec(assignee, 0, 60)],
            ))
            .await
            .unwrap();
        let mut head = fx.store.chain_head(workflow.id).await.unwrap().unwrap();
        head.mark_ongoing().unwrap();
        fx.store.update_task(&head).await.unwrap();

        let result = fx
            .service
            .update_task(
                head.id,
                TaskUpdate {
                    start_delta: Some(Duration::minutes(30)),
                    ..TaskUpdate::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));

        // Renaming is still allowed while not complete.
        let renamed = fx
            .service
            .update_task(
                head.id,
                TaskUpdate {
                    title: Some("Renamed".into()),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.title, "Renamed");
    }

    #[tokio::test]
    async fn test_update_task_edit_guard() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;
        let assignee = member(&fx, company).await;
        let other = member(&fx, company).await;

        // Starts in two minutes, well inside the five-minute guard.
        let workflow = fx
            .service
            .create_workflow(spec_with_tasks(
                creator.id,
                Utc::now() + Duration::minutes(2),
                vec![task_spec(assignee, 0, 60)],
            ))
            .await
            .unwrap();
        let head = fx.store.chain_head(workflow.id).await.unwrap().unwrap();

        let result = fx
            .service
            .update_task(
                head.id,
                TaskUpdate {
                    assignee: Some(other),
                    ..TaskUpdate::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_update_task_conflict_check_excludes_itself() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;
        let assignee = member(&fx, company).await;

        let workflow = fx
            .service
            .create_workflow(spec_with_tasks(
                creator.id,
                Utc::now() + Duration::days(1),
                vec![task_spec(assignee, 0, 60)],
            ))
            .await
            .unwrap();
        let head = fx.store.chain_head(workflow.id).await.unwrap().unwrap();

        // Growing its own duration only overlaps itself, which is excluded.
        let updated = fx
            .service
            .update_task(
                head.id,
                TaskUpdate {
                    duration: Some(Duration::minutes(90)),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.duration, Duration::minutes(90));
    }

    #[tokio::test]
    async fn test_reassign_away_from_inactive_assignee() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;
        let leaver = member(&fx, company).await;
        let replacement = member(&fx, company).await;

        let workflow = fx
            .service
            .create_workflow(spec_with_tasks(
                creator.id,
                Utc::now() + Duration::days(1),
                vec![task_spec(leaver, 0, 60)],
            ))
            .await
            .unwrap();
        let head = fx.store.chain_head(workflow.id).await.unwrap().unwrap();

        // The assignee leaves the company after the task was assigned.
        let mut departed = fx.directory.find(leaver).await.unwrap().unwrap();
        departed.status = EmployeeStatus::Inactive;
        fx.directory.insert(departed).await;

        let updated = fx
            .service
            .update_task(
                head.id,
                TaskUpdate {
                    assignee: Some(replacement),
                    ..TaskUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.assignee, replacement);
    }

    #[tokio::test]
    async fn test_reassign_to_inactive_employee_rejected() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;
        let assignee = member(&fx, company).await;
        let inactive = Employee::new(company, "Gone").with_status(EmployeeStatus::Inactive);
        let inactive_id = inactive.id;
        fx.directory.insert(inactive).await;

        let workflow = fx
            .service
            .create_workflow(spec_with_tasks(
                creator.id,
                Utc::now() + Duration::days(1),
                vec![task_spec(assignee, 0, 60)],
            ))
            .await
            .unwrap();
        let head = fx.store.chain_head(workflow.id).await.unwrap().unwrap();

        let result = fx
            .service
            .update_task(
                head.id,
                TaskUpdate {
                    assignee: Some(inactive_id),
                    ..TaskUpdate::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_update_workflow_only_while_initiated() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;
        let assignee = member(&fx, company).await;

        let workflow = fx
            .service
            .create_workflow(spec_with_tasks(
                creator.id,
                Utc::now() + Duration::minutes(2),
                vec![task_spec(assignee, 0, 60)],
            ))
            .await
            .unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Scheduled);

        let result = fx
            .service
            .update_workflow(
                workflow.id,
                WorkflowUpdate {
                    name: Some("Late rename".into()),
                    ..WorkflowUpdate::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_update_workflow_rejects_retiming_imminent_start() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;

        // Still INITIATED but starting inside the guard window; inserted
        // directly so the immediate-dispatch shortcut does not flip it.
        let workflow = Workflow::new(
            TemplateId::new(),
            "Imminent",
            creator.id,
            Utc::now() + Duration::minutes(2),
        );
        fx.store.insert_workflow(&workflow).await.unwrap();

        let result = fx
            .service
            .update_workflow(
                workflow.id,
                WorkflowUpdate {
                    start_at: Some(Utc::now() + Duration::days(1)),
                    ..WorkflowUpdate::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
        // Renaming alone is still allowed.
        let renamed = fx
            .service
            .update_workflow(
                workflow.id,
                WorkflowUpdate {
                    name: Some("Renamed".into()),
                    ..WorkflowUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Renamed");
    }

    #[tokio::test]
    async fn test_complete_cascades_to_successor() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;
        let assignee = member(&fx, company).await;

        let workflow = fx
            .service
            .create_workflow(spec_with_tasks(
                creator.id,
                Utc::now() + Duration::days(1),
                vec![task_spec(assignee, 1, 60), task_spec(assignee, 2, 30)],
            ))
            .await
            .unwrap();
        let mut head = fx.store.chain_head(workflow.id).await.unwrap().unwrap();
        head.mark_ongoing().unwrap();
        fx.store.update_task(&head).await.unwrap();

        fx.service.complete_task(head.id).await.unwrap();

        // Successor's two-minute delta is under the dispatch threshold.
        let successor = fx.store.successor_of(head.id).await.unwrap().unwrap();
        assert_eq!(successor.status, TaskStatus::Scheduled);
        let pending = fx.dispatcher.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job, Job::StartTask { task: successor.id });
    }

    #[tokio::test]
    async fn test_complete_last_task_completes_workflow() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;
        let assignee = member(&fx, company).await;

        let workflow = fx
            .service
            .create_workflow(spec_with_tasks(
                creator.id,
                Utc::now() + Duration::days(1),
                vec![task_spec(assignee, 0, 60)],
            ))
            .await
            .unwrap();
        let mut head = fx.store.chain_head(workflow.id).await.unwrap().unwrap();
        head.mark_ongoing().unwrap();
        fx.store.update_task(&head).await.unwrap();
        // Drive the workflow to INPROGRESS so the cascade may close it.
        let mut wf = fx.store.workflow(workflow.id).await.unwrap();
        wf.mark_scheduled().unwrap();
        wf.start().unwrap();
        fx.store.update_workflow(&wf).await.unwrap();

        fx.service.complete_task(head.id).await.unwrap();

        let wf = fx.store.workflow(workflow.id).await.unwrap();
        assert_eq!(wf.status, WorkflowStatus::Complete);
        assert!(wf.completed_at.is_some());
        assert!(fx
            .notifier
            .sent_to(creator.id)
            .await
            .iter()
            .any(|n| matches!(n, Notice::WorkflowCompleted { .. })));
    }

    #[tokio::test]
    async fn test_successor_with_long_delta_stays_upcoming() {
        let fx = service_fixture();
        let company = CompanyId::new();
        let creator = admin(&fx, company).await;
        let assignee = member(&fx, company).await;

        let workflow = fx
            .service
            .create_workflow(spec_with_tasks(
                creator.id,
                Utc::now() + Duration::days(1),
                vec![task_spec(assignee, 0, 60), task_spec(assignee, 120, 30)],
            ))
            .await
            .unwrap();
        let mut head = fx.store.chain_head(workflow.id).await.unwrap().unwrap();
        head.mark_ongoing().unwrap();
        fx.store.update_task(&head).await.unwrap();

        fx.service.complete_task(head.id).await.unwrap();

        let successor = fx.store.successor_of(head.id).await.unwrap().unwrap();
        assert_eq!(successor.status, TaskStatus::Upcoming);
        assert!(fx.dispatcher.pending().await.is_empty());
    }
}
