//! Flowline workflow engine
//!
//! The temporal scheduling and conflict-resolution core: workflow and task
//! entities with forward-only state machines, the parent-chain time model,
//! per-employee conflict detection with request-scoped memoization, the
//! access-grant reconciler, and the workflow service orchestrating creation,
//! edits, and the completion cascade over collaborator traits.

pub mod access;
pub mod employee;
pub mod service;
pub mod store;
pub mod task;
pub mod timeline;
pub mod workflow;

pub use access::{Permission, WorkflowAccess};
pub use employee::{Employee, EmployeeDirectory, EmployeeStatus, InMemoryDirectory};
pub use service::{AccessorSpec, TaskSpec, TaskUpdate, WorkflowService, WorkflowSpec, WorkflowUpdate};
pub use store::{InMemoryStore, WorkflowStore};
pub use task::{Task, TaskStatus};
pub use timeline::{expected_start, has_conflict, intervals_overlap, ConflictMemo};
pub use workflow::{Workflow, WorkflowStatus};
