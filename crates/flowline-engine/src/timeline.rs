//! Time model and conflict detection
//!
//! A task's expected start is resolved by walking its parent chain: while
//! the parent is not yet complete, its own `start_delta + duration` is
//! accumulated; the walk ends at a completed parent (anchor: its
//! `completed_at`) or at the chain head (anchor: the workflow's `start_at`).
//! Chains are finite and acyclic by construction (each task links only to an
//! earlier-created predecessor), so the walk terminates.
//!
//! Conflict detection compares half-open `[start, end)` intervals per
//! employee; touching endpoints do not conflict. The `ConflictMemo` is a
//! request-scoped cache so validating a multi-task batch checks each new
//! task against both pre-existing tasks and the batch's already-accepted
//! ones without recomputation. It must never outlive its request.

use chrono::{DateTime, Utc};
use flowline_core::{AppResult, EmployeeId, TaskId};
use std::collections::{HashMap, HashSet};

use crate::store::WorkflowStore;
use crate::task::Task;

/// Half-open interval overlap test; touching endpoints are not a conflict.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    !(b_end <= a_start || b_start >= a_end)
}

/// Expected absolute start time of `task`, resolved through its parent chain.
pub async fn expected_start(store: &dyn WorkflowStore, task: &Task) -> AppResult<DateTime<Utc>> {
    let mut accumulated = task.start_delta;
    let mut parent = task.parent_task;
    while let Some(parent_id) = parent {
        let parent_task = store.task(parent_id).await?;
        if let Some(completed_at) = parent_task.completed_at {
            return Ok(completed_at + accumulated);
        }
        accumulated = accumulated + parent_task.start_delta + parent_task.duration;
        parent = parent_task.parent_task;
    }
    let workflow = store.workflow(task.workflow).await?;
    Ok(workflow.start_at + accumulated)
}

/// Per-employee cache of expected task intervals, scoped to one validation
/// request. Monotonic: accepted candidates are appended via `note` so later
/// checks in the same batch see them.
#[derive(Debug, Default)]
pub struct ConflictMemo {
    intervals: HashMap<EmployeeId, Vec<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl ConflictMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted candidate interval for subsequent checks.
    pub fn note(&mut self, employee: EmployeeId, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.intervals.entry(employee).or_default().push((start, end));
    }

    pub fn cached(&self, employee: EmployeeId) -> Option<&[(DateTime<Utc>, DateTime<Utc>)]> {
        self.intervals.get(&employee).map(|v| v.as_slice())
    }
}

/// Whether `[cand_start, cand_end)` collides with any of the employee's
/// other non-terminal (UPCOMING/ONGOING) tasks, ignoring `exclude` ids.
///
/// On the first call for an employee the intervals are derived from the
/// store and cached in `memo`; later calls for the same employee test the
/// cache only.
pub async fn has_conflict(
    store: &dyn WorkflowStore,
    employee: EmployeeId,
    cand_start: DateTime<Utc>,
    cand_end: DateTime<Utc>,
    exclude: &HashSet<TaskId>,
    memo: &mut ConflictMemo,
) -> AppResult<bool> {
    if let Some(cached) = memo.intervals.get(&employee) {
        if !cached.is_empty() {
            return Ok(cached
                .iter()
                .any(|(start, end)| intervals_overlap(cand_start, cand_end, *start, *end)));
        }
    }

    let others = store.active_tasks_for_assignee(employee).await?;
    let entry = memo.intervals.entry(employee).or_default();
    for other in &others {
        if exclude.contains(&other.id) {
            continue;
        }
        let start = expected_start(store, other).await?;
        let end = start + other.duration;
        if intervals_overlap(cand_start, cand_end, start, end) {
            return Ok(true);
        }
        entry.push((start, end));
    }
    Ok(false)
}
