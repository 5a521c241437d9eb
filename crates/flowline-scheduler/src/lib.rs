//! Flowline scheduling loop
//!
//! The proactive half of the engine: periodic scans that catch workflows and
//! tasks approaching their start times, the bodies of the deferred start
//! jobs, and the long-running loop that ties scans and job execution
//! together over the in-process queue.

pub mod jobs;
pub mod run;
pub mod scheduler;

pub use run::{drain_and_execute, run_periodic};
pub use scheduler::Scheduler;
