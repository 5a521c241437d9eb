//! Shared foundation for the Flowline scheduling engine
//!
//! This crate holds everything the engine and scheduler crates agree on:
//! - Newtype ids for companies, employees, workflows, tasks, and grants
//! - The error taxonomy (`AppError` / `AppResult`)
//! - Runtime configuration (lookahead windows, dispatch thresholds)
//! - The deferred-job dispatch contract (`JobDispatcher`)
//! - The notification contract (`Notifier`)

pub mod config;
pub mod dispatch;
pub mod error;
pub mod notify;
pub mod types;

pub use config::{AppConfig, SchedulerConfig};
pub use dispatch::{DispatchedJob, InMemoryDispatcher, Job, JobDispatcher};
pub use error::{AppError, AppResult};
pub use notify::{LoggingNotifier, Notice, Notifier, RecordingNotifier};
pub use types::{CompanyId, EmployeeId, GrantId, TaskId, TemplateId, WorkflowId};
