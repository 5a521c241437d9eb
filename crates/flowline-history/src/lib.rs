//! Field-level audit history
//!
//! Every create, update, and soft delete the scheduling core performs on a
//! workflow, task, or access grant is recorded as one entry per changed
//! field, with foreign keys stringified as ids. Recording is an explicit
//! step of each service transaction rather than an implicit save hook, so
//! ordering and failure isolation stay visible and testable.

pub mod record;
pub mod store;

pub use record::{ChangeSet, FieldChange, HistoryAction};
pub use store::{HistoryRecorder, InMemoryHistory};
