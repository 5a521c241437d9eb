//! Identity collaborator
//!
//! The engine never owns employee records; it reads them through the
//! directory trait for validation (company scope, active status, admin
//! flag) and treats everything else about identity as out of scope.

use async_trait::async_trait;
use flowline_core::{AppResult, CompanyId, EmployeeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Membership status within a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeStatus {
    /// Invited but has not joined yet.
    Invited,
    /// Active member.
    Active,
    /// Deactivated; cannot be assigned work or granted access.
    Inactive,
}

impl EmployeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invited => "invited",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

/// An employee's membership record in exactly one company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub company: CompanyId,
    pub full_name: String,
    pub status: EmployeeStatus,
    pub is_admin: bool,
}

impl Employee {
    pub fn new(company: CompanyId, full_name: impl Into<String>) -> Self {
        Self {
            id: EmployeeId::new(),
            company,
            full_name: full_name.into(),
            status: EmployeeStatus::Active,
            is_admin: false,
        }
    }

    pub fn with_status(mut self, status: EmployeeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == EmployeeStatus::Active
    }
}

/// Employee lookup collaborator.
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn find(&self, id: EmployeeId) -> AppResult<Option<Employee>>;
}

/// In-memory directory for tests and single-node setups.
pub struct InMemoryDirectory {
    employees: RwLock<HashMap<EmployeeId, Employee>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            employees: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, employee: Employee) {
        self.employees.write().await.insert(employee.id, employee);
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmployeeDirectory for InMemoryDirectory {
    async fn find(&self, id: EmployeeId) -> AppResult<Option<Employee>> {
        Ok(self.employees.read().await.get(&id).cloned())
    }
}
