//! Workflow entity and state machine

use chrono::{DateTime, Utc};
use flowline_core::types::display_opt;
use flowline_core::{AppError, AppResult, EmployeeId, TemplateId, WorkflowId};
use flowline_history::{ChangeSet, FieldChange};
use serde::{Deserialize, Serialize};

/// Workflow lifecycle. Status only ever advances.
///
/// SCHEDULED means "a deferred start job has been dispatched"; it keeps the
/// periodic scan from dispatching the same workflow twice. COMPLETE is set
/// only by the last task's completion cascade, never directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Initiated,
    Scheduled,
    InProgress,
    Complete,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// A workflow: an ordered chain of tasks created from a template, owned by
/// the admin employee who created it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub template: TemplateId,
    pub name: String,
    pub creator: EmployeeId,
    pub start_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(
        template: TemplateId,
        name: impl Into<String>,
        creator: EmployeeId,
        start_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WorkflowId::new(),
            template,
            name: name.into(),
            creator,
            start_at,
            completed_at: None,
            status: WorkflowStatus::Initiated,
            created_at: Utc::now(),
        }
    }

    /// INITIATED -> SCHEDULED: a deferred start job is about to be dispatched.
    pub fn mark_scheduled(&mut self) -> AppResult<()> {
        if self.status != WorkflowStatus::Initiated {
            return Err(illegal_transition(self.status, WorkflowStatus::Scheduled));
        }
        self.status = WorkflowStatus::Scheduled;
        Ok(())
    }

    /// SCHEDULED -> INPROGRESS: the deferred start job fired.
    pub fn start(&mut self) -> AppResult<()> {
        if self.status != WorkflowStatus::Scheduled {
            return Err(illegal_transition(self.status, WorkflowStatus::InProgress));
        }
        self.status = WorkflowStatus::InProgress;
        Ok(())
    }

    /// INPROGRESS -> COMPLETE: the last task in the chain completed. Only
    /// the completion cascade drives this; there is no direct-complete API.
    pub(crate) fn complete(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != WorkflowStatus::InProgress {
            return Err(illegal_transition(self.status, WorkflowStatus::Complete));
        }
        self.status = WorkflowStatus::Complete;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Audit entries for every field at creation.
    pub fn creation_changes(&self) -> Vec<FieldChange> {
        ChangeSet::create("workflow", self.id)
            .created_field("template", self.template)
            .created_field("name", &self.name)
            .created_field("creator", self.creator)
            .created_field("start_at", self.start_at)
            .created_field("completed_at", display_opt(&self.completed_at))
            .created_field("status", self.status.as_str())
            .into_changes()
    }
}

fn illegal_transition(from: WorkflowStatus, to: WorkflowStatus) -> AppError {
    AppError::validation(
        "status",
        format!(
            "workflow cannot move from {} to {}",
            from.as_str(),
            to.as_str()
        ),
    )
}
