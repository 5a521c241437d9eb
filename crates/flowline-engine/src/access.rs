//! Workflow access grants and the bulk permission reconciler
//!
//! Grants are soft-deleted (`is_active = false`) so the audit trail keeps
//! every historical grant; uniqueness holds only among active rows. The
//! reconciler takes the desired final read/write sets for a workflow and
//! diffs them against the active rows: flips, deactivations, and creations
//! in one pass, each with history entries, persisted with bulk operations.

use flowline_core::{AppError, AppResult, EmployeeId, GrantId, Notice, WorkflowId};
use flowline_history::{ChangeSet, FieldChange};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

use crate::service::WorkflowService;

/// Access level granted to a workflow accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    ReadWrite,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::ReadWrite => "read_write",
        }
    }
}

/// A permission grant for one employee on one workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowAccess {
    pub id: GrantId,
    pub employee: EmployeeId,
    pub workflow: WorkflowId,
    pub permission: Permission,
    pub is_active: bool,
}

impl WorkflowAccess {
    pub fn new(workflow: WorkflowId, employee: EmployeeId, permission: Permission) -> Self {
        Self {
            id: GrantId::new(),
            employee,
            workflow,
            permission,
            is_active: true,
        }
    }

    /// Audit entries for every field at creation.
    pub fn creation_changes(&self) -> Vec<FieldChange> {
        ChangeSet::create("workflow_access", self.id)
            .created_field("employee", self.employee)
            .created_field("workflow", self.workflow)
            .created_field("permission", self.permission.as_str())
            .created_field("is_active", self.is_active)
            .into_changes()
    }
}

impl WorkflowService {
    /// Bulk diff-and-apply of a workflow's accessor permissions.
    ///
    /// `read_set` and `write_set` are the desired final sets; they must be
    /// disjoint and every member must be an active employee of the
    /// workflow's company. The creator is dropped from both sets (implicit
    /// full access). Idempotent: a second identical call changes nothing.
    pub async fn reconcile_accessors(
        &self,
        workflow_id: WorkflowId,
        read_set: HashSet<EmployeeId>,
        write_set: HashSet<EmployeeId>,
    ) -> AppResult<Vec<WorkflowAccess>> {
        if read_set.intersection(&write_set).next().is_some() {
            return Err(AppError::validation(
                "accessors",
                "read and write permission sets must be disjoint",
            ));
        }

        let workflow = self.store.workflow(workflow_id).await?;
        // The creator only anchors the company scope and may have gone
        // inactive since creating the workflow; set members must be active.
        let creator = self
            .directory
            .find(workflow.creator)
            .await?
            .ok_or_else(|| AppError::not_found("employee", workflow.creator))?;

        let mut read_set = read_set;
        let mut write_set = write_set;
        read_set.remove(&workflow.creator);
        write_set.remove(&workflow.creator);

        for employee_id in read_set.union(&write_set) {
            let employee = self.active_employee(*employee_id).await?;
            if employee.company != creator.company {
                return Err(AppError::validation(
                    "accessors",
                    "accessor must belong to the workflow's company",
                ));
            }
        }

        let existing = self.store.active_grants(workflow_id).await?;
        let mut updates: Vec<WorkflowAccess> = Vec::new();
        let mut changes: Vec<FieldChange> = Vec::new();

        for grant in existing {
            let desired = if read_set.contains(&grant.employee) {
                Some(Permission::Read)
            } else if write_set.contains(&grant.employee) {
                Some(Permission::ReadWrite)
            } else {
                None
            };
            match desired {
                Some(permission) if permission == grant.permission => {
                    // Already satisfied.
                    read_set.remove(&grant.employee);
                    write_set.remove(&grant.employee);
                }
                Some(permission) => {
                    let mut flipped = grant.clone();
                    flipped.permission = permission;
                    changes.extend(
                        ChangeSet::update("workflow_access", flipped.id)
                            .field("permission", grant.permission.as_str(), permission.as_str())
                            .into_changes(),
                    );
                    read_set.remove(&flipped.employee);
                    write_set.remove(&flipped.employee);
                    updates.push(flipped);
                }
                None => {
                    let mut retired = grant.clone();
                    retired.is_active = false;
                    changes.extend(
                        ChangeSet::delete("workflow_access", retired.id)
                            .field("is_active", true, false)
                            .into_changes(),
                    );
                    updates.push(retired);
                }
            }
        }

        let mut created: Vec<WorkflowAccess> = Vec::new();
        for (set, permission) in [(&read_set, Permission::Read), (&write_set, Permission::ReadWrite)]
        {
            for employee in set.iter() {
                let grant = WorkflowAccess::new(workflow_id, *employee, permission);
                changes.extend(grant.creation_changes());
                created.push(grant);
            }
        }

        if !updates.is_empty() {
            self.store.update_grants(&updates).await?;
        }
        if !created.is_empty() {
            self.store.insert_grants(&created).await?;
        }
        if !changes.is_empty() {
            self.history.record(changes).await?;
        }

        for grant in &created {
            self.try_notify(grant.employee, Notice::AccessGranted { workflow: workflow_id })
                .await;
        }

        info!(
            workflow_id = %workflow_id,
            updated = updates.len(),
            created = created.len(),
            "accessors reconciled"
        );

        self.store.active_grants(workflow_id).await
    }
}
