//! Task entity and state machine

use chrono::{DateTime, Duration, Utc};
use flowline_core::types::{display_opt, display_secs, duration_secs};
use flowline_core::{AppError, AppResult, EmployeeId, TaskId, WorkflowId};
use flowline_history::{ChangeSet, FieldChange};
use serde::{Deserialize, Serialize};

/// Task lifecycle. Status only ever advances.
///
/// SCHEDULED is a transient pre-ONGOING marker meaning "a deferred start job
/// has been dispatched"; the periodic scan skips SCHEDULED tasks so a task
/// is never dispatched twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Upcoming,
    Scheduled,
    Ongoing,
    Complete,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Scheduled => "scheduled",
            Self::Ongoing => "ongoing",
            Self::Complete => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Whether the task has started (retiming is no longer allowed).
    pub fn has_started(&self) -> bool {
        matches!(self, Self::Ongoing | Self::Complete)
    }
}

/// One task in a workflow's chain.
///
/// Tasks form a singly-linked linear sequence via `parent_task`; exactly one
/// task per workflow has no parent (the chain head). `start_delta` is the
/// offset after the parent's completion, or after the workflow's `start_at`
/// for the head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub workflow: WorkflowId,
    pub title: String,
    pub description: String,
    pub parent_task: Option<TaskId>,
    pub assignee: EmployeeId,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(with = "duration_secs")]
    pub start_delta: Duration,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub status: TaskStatus,
}

impl Task {
    pub fn new(
        workflow: WorkflowId,
        title: impl Into<String>,
        assignee: EmployeeId,
        start_delta: Duration,
        duration: Duration,
    ) -> Self {
        Self {
            id: TaskId::new(),
            workflow,
            title: title.into(),
            description: String::new(),
            parent_task: None,
            assignee,
            completed_at: None,
            start_delta,
            duration,
            status: TaskStatus::Upcoming,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent_task = Some(parent);
        self
    }

    /// UPCOMING -> SCHEDULED: a deferred start job is about to be dispatched.
    pub fn mark_scheduled(&mut self) -> AppResult<()> {
        if self.status != TaskStatus::Upcoming {
            return Err(illegal_transition(self.status, TaskStatus::Scheduled));
        }
        self.status = TaskStatus::Scheduled;
        Ok(())
    }

    /// UPCOMING/SCHEDULED -> ONGOING: the deferred start job fired.
    pub fn mark_ongoing(&mut self) -> AppResult<()> {
        if !matches!(self.status, TaskStatus::Upcoming | TaskStatus::Scheduled) {
            return Err(illegal_transition(self.status, TaskStatus::Ongoing));
        }
        self.status = TaskStatus::Ongoing;
        Ok(())
    }

    /// ONGOING -> COMPLETE. The caller drives the successor cascade.
    pub fn mark_complete(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != TaskStatus::Ongoing {
            return Err(illegal_transition(self.status, TaskStatus::Complete));
        }
        self.status = TaskStatus::Complete;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Audit entries for every field at creation.
    pub fn creation_changes(&self) -> Vec<FieldChange> {
        ChangeSet::create("task", self.id)
            .created_field("workflow", self.workflow)
            .created_field("title", &self.title)
            .created_field("description", &self.description)
            .created_field("parent_task", display_opt(&self.parent_task))
            .created_field("assignee", self.assignee)
            .created_field("completed_at", display_opt(&self.completed_at))
            .created_field("start_delta", display_secs(&self.start_delta))
            .created_field("duration", display_secs(&self.duration))
            .created_field("status", self.status.as_str())
            .into_changes()
    }
}

fn illegal_transition(from: TaskStatus, to: TaskStatus) -> AppError {
    AppError::validation(
        "status",
        format!("task cannot move from {} to {}", from.as_str(), to.as_str()),
    )
}
