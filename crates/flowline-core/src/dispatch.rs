//! Deferred job dispatch
//!
//! The scheduling core never executes state transitions inline at their due
//! time; it enqueues a job with an ETA on an external delayed-delivery
//! facility (any durable queue with at-least-once, at-or-after-ETA delivery
//! satisfies the contract). Job bodies re-fetch their entity and status-guard
//! themselves, so duplicate or late deliveries are safe no-ops.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::AppResult;
use crate::types::{TaskId, WorkflowId};

/// A unit of deferred work, identified by entity id only.
///
/// Jobs deliberately carry no entity state; bodies must re-fetch by id so a
/// late firing never acts on a stale snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    StartWorkflow { workflow: WorkflowId },
    StartTask { task: TaskId },
}

impl Job {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartWorkflow { .. } => "start_workflow",
            Self::StartTask { .. } => "start_task",
        }
    }
}

/// A job queued for execution no earlier than `eta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchedJob {
    pub job: Job,
    pub eta: DateTime<Utc>,
}

/// Delayed-delivery collaborator contract.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Enqueue `job` for execution at or after `eta` (at-least-once).
    async fn dispatch(&self, job: Job, eta: DateTime<Utc>) -> AppResult<()>;
}

/// In-memory dispatcher: records every dispatch and hands back due jobs on
/// demand. Serves as the in-process queue for tests and single-node setups.
pub struct InMemoryDispatcher {
    queue: RwLock<Vec<DispatchedJob>>,
}

impl InMemoryDispatcher {
    pub fn new() -> Self {
        Self {
            queue: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of all not-yet-drained jobs.
    pub async fn pending(&self) -> Vec<DispatchedJob> {
        self.queue.read().await.clone()
    }

    /// Remove and return every job whose ETA is at or before `until`.
    pub async fn drain_due(&self, until: DateTime<Utc>) -> Vec<DispatchedJob> {
        let mut queue = self.queue.write().await;
        let (due, rest): (Vec<_>, Vec<_>) = queue.drain(..).partition(|j| j.eta <= until);
        *queue = rest;
        due
    }

    pub async fn len(&self) -> usize {
        self.queue.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.read().await.is_empty()
    }
}

impl Default for InMemoryDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobDispatcher for InMemoryDispatcher {
    async fn dispatch(&self, job: Job, eta: DateTime<Utc>) -> AppResult<()> {
        debug!(job = job.as_str(), %eta, "job dispatched");
        self.queue.write().await.push(DispatchedJob { job, eta });
        Ok(())
    }
}
