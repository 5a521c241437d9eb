//! Notification contract
//!
//! Notifications are explicit service-layer calls, fired after the owning
//! transaction commits. They are strictly fire-and-forget: a failed
//! notification is logged and never rolls back or blocks the state change
//! that produced it. Template rendering and delivery (mail, chat, ...) live
//! behind the trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::types::{EmployeeId, TaskId, WorkflowId};

/// What happened, plus just enough context for the template layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    WorkflowCreated { workflow: WorkflowId },
    WorkflowUpdated { workflow: WorkflowId },
    WorkflowStarted { workflow: WorkflowId },
    WorkflowCompleted { workflow: WorkflowId },
    TaskAssigned { task: TaskId },
    TaskUpdated { task: TaskId },
    TaskStarted { task: TaskId },
    TaskCompleted { task: TaskId },
    AccessGranted { workflow: WorkflowId },
}

impl Notice {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WorkflowCreated { .. } => "workflow_created",
            Self::WorkflowUpdated { .. } => "workflow_updated",
            Self::WorkflowStarted { .. } => "workflow_started",
            Self::WorkflowCompleted { .. } => "workflow_completed",
            Self::TaskAssigned { .. } => "task_assigned",
            Self::TaskUpdated { .. } => "task_updated",
            Self::TaskStarted { .. } => "task_started",
            Self::TaskCompleted { .. } => "task_completed",
            Self::AccessGranted { .. } => "access_granted",
        }
    }
}

/// Notification delivery collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, employee: EmployeeId, notice: Notice) -> AppResult<()>;
}

/// Logs notifications instead of delivering them.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, employee: EmployeeId, notice: Notice) -> AppResult<()> {
        match serde_json::to_value(notice) {
            Ok(context) => info!(%employee, kind = notice.kind(), %context, "notification"),
            Err(error) => warn!(%employee, kind = notice.kind(), %error, "notification context unserializable"),
        }
        Ok(())
    }
}

/// Records notifications for inspection in tests.
pub struct RecordingNotifier {
    sent: RwLock<Vec<(EmployeeId, Notice)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: RwLock::new(Vec::new()),
        }
    }

    pub async fn sent(&self) -> Vec<(EmployeeId, Notice)> {
        self.sent.read().await.clone()
    }

    pub async fn sent_to(&self, employee: EmployeeId) -> Vec<Notice> {
        self.sent
            .read()
            .await
            .iter()
            .filter(|(e, _)| *e == employee)
            .map(|(_, n)| *n)
            .collect()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, employee: EmployeeId, notice: Notice) -> AppResult<()> {
        self.sent.write().await.push((employee, notice));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        let alice = EmployeeId::new();
        let bob = EmployeeId::new();
        let workflow = WorkflowId::new();

        notifier
            .notify(alice, Notice::WorkflowCreated { workflow })
            .await
            .unwrap();
        notifier
            .notify(bob, Notice::AccessGranted { workflow })
            .await
            .unwrap();

        assert_eq!(notifier.sent().await.len(), 2);
        assert_eq!(
            notifier.sent_to(bob).await,
            vec![Notice::AccessGranted { workflow }]
        );
    }

    #[test]
    fn test_notice_kind() {
        let notice = Notice::TaskStarted { task: TaskId::new() };
        assert_eq!(notice.kind(), "task_started");
    }
}
