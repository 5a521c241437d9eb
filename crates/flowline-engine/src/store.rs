//! Persistence collaborator
//!
//! The engine talks to storage through `WorkflowStore`: CRUD plus the
//! filtered queries the scans and validators need, with bulk insert/update
//! for multi-row mutations. A production implementation backs this with a
//! relational database and must provide row-level locking per transitioned
//! entity and a partial unique index on active grants; `InMemoryStore` keeps
//! the same contract in process for tests and single-node use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowline_core::{AppError, AppResult, EmployeeId, GrantId, TaskId, WorkflowId};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::access::WorkflowAccess;
use crate::task::{Task, TaskStatus};
use crate::workflow::{Workflow, WorkflowStatus};

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn insert_workflow(&self, workflow: &Workflow) -> AppResult<()>;
    async fn workflow(&self, id: WorkflowId) -> AppResult<Workflow>;
    async fn update_workflow(&self, workflow: &Workflow) -> AppResult<()>;
    /// INITIATED workflows with `start_at` before `cutoff`.
    async fn workflows_to_schedule(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Workflow>>;

    async fn insert_tasks(&self, tasks: &[Task]) -> AppResult<()>;
    async fn task(&self, id: TaskId) -> AppResult<Task>;
    async fn update_task(&self, task: &Task) -> AppResult<()>;
    async fn tasks_for_workflow(&self, workflow: WorkflowId) -> AppResult<Vec<Task>>;
    /// The workflow's task with no parent.
    async fn chain_head(&self, workflow: WorkflowId) -> AppResult<Option<Task>>;
    /// The task whose `parent_task` is the given task.
    async fn successor_of(&self, task: TaskId) -> AppResult<Option<Task>>;
    /// The assignee's UPCOMING and ONGOING tasks (conflict-relevant load).
    async fn active_tasks_for_assignee(&self, assignee: EmployeeId) -> AppResult<Vec<Task>>;
    /// All UPCOMING tasks, for the periodic scan.
    async fn pending_tasks(&self) -> AppResult<Vec<Task>>;

    async fn insert_grants(&self, grants: &[WorkflowAccess]) -> AppResult<()>;
    async fn update_grants(&self, grants: &[WorkflowAccess]) -> AppResult<()>;
    async fn active_grants(&self, workflow: WorkflowId) -> AppResult<Vec<WorkflowAccess>>;
}

/// In-memory store.
pub struct InMemoryStore {
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
    tasks: RwLock<HashMap<TaskId, Task>>,
    grants: RwLock<HashMap<GrantId, WorkflowAccess>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
            grants: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn insert_workflow(&self, workflow: &Workflow) -> AppResult<()> {
        let mut workflows = self.workflows.write().await;
        if workflows.contains_key(&workflow.id) {
            return Err(AppError::Storage(format!(
                "workflow {} already exists",
                workflow.id
            )));
        }
        workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn workflow(&self, id: WorkflowId) -> AppResult<Workflow> {
        self.workflows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("workflow", id))
    }

    async fn update_workflow(&self, workflow: &Workflow) -> AppResult<()> {
        let mut workflows = self.workflows.write().await;
        if !workflows.contains_key(&workflow.id) {
            return Err(AppError::not_found("workflow", workflow.id));
        }
        workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn workflows_to_schedule(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Workflow>> {
        Ok(self
            .workflows
            .read()
            .await
            .values()
            .filter(|w| w.status == WorkflowStatus::Initiated && w.start_at < cutoff)
            .cloned()
            .collect())
    }

    async fn insert_tasks(&self, tasks: &[Task]) -> AppResult<()> {
        let mut stored = self.tasks.write().await;
        // One chain head per workflow, counting both stored and incoming rows.
        for task in tasks {
            if task.parent_task.is_none() {
                let head_exists = stored
                    .values()
                    .any(|t| t.workflow == task.workflow && t.parent_task.is_none())
                    || tasks
                        .iter()
                        .any(|t| t.id != task.id && t.workflow == task.workflow && t.parent_task.is_none());
                if head_exists {
                    return Err(AppError::Storage(format!(
                        "workflow {} already has a chain head",
                        task.workflow
                    )));
                }
            }
        }
        for task in tasks {
            stored.insert(task.id, task.clone());
        }
        Ok(())
    }

    async fn task(&self, id: TaskId) -> AppResult<Task> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("task", id))
    }

    async fn update_task(&self, task: &Task) -> AppResult<()> {
        let mut tasks = self.tasks.write().await;
        if !tasks.contains_key(&task.id) {
            return Err(AppError::not_found("task", task.id));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn tasks_for_workflow(&self, workflow: WorkflowId) -> AppResult<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.workflow == workflow)
            .cloned()
            .collect())
    }

    async fn chain_head(&self, workflow: WorkflowId) -> AppResult<Option<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .find(|t| t.workflow == workflow && t.parent_task.is_none())
            .cloned())
    }

    async fn successor_of(&self, task: TaskId) -> AppResult<Option<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .find(|t| t.parent_task == Some(task))
            .cloned())
    }

    async fn active_tasks_for_assignee(&self, assignee: EmployeeId) -> AppResult<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| {
                t.assignee == assignee
                    && matches!(t.status, TaskStatus::Upcoming | TaskStatus::Ongoing)
            })
            .cloned()
            .collect())
    }

    async fn pending_tasks(&self) -> AppResult<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.status == TaskStatus::Upcoming)
            .cloned()
            .collect())
    }

    async fn insert_grants(&self, grants: &[WorkflowAccess]) -> AppResult<()> {
        let mut stored = self.grants.write().await;
        // Partial uniqueness: at most one active grant per (employee, workflow).
        for grant in grants {
            if !grant.is_active {
                continue;
            }
            let duplicate = stored.values().any(|g| {
                g.is_active && g.employee == grant.employee && g.workflow == grant.workflow
            }) || grants.iter().any(|g| {
                g.id != grant.id
                    && g.is_active
                    && g.employee == grant.employee
                    && g.workflow == grant.workflow
            });
            if duplicate {
                return Err(AppError::Storage(format!(
                    "employee {} already holds an active grant on workflow {}",
                    grant.employee, grant.workflow
                )));
            }
        }
        for grant in grants {
            stored.insert(grant.id, grant.clone());
        }
        Ok(())
    }

    async fn update_grants(&self, grants: &[WorkflowAccess]) -> AppResult<()> {
        let mut stored = self.grants.write().await;
        for grant in grants {
            if !stored.contains_key(&grant.id) {
                return Err(AppError::not_found("workflow_access", grant.id));
            }
        }
        for grant in grants {
            stored.insert(grant.id, grant.clone());
        }
        Ok(())
    }

    async fn active_grants(&self, workflow: WorkflowId) -> AppResult<Vec<WorkflowAccess>> {
        Ok(self
            .grants
            .read()
            .await
            .values()
            .filter(|g| g.workflow == workflow && g.is_active)
            .cloned()
            .collect())
    }
}
