//! Per-format rendering jobs.
//!
//! - `Job`: one format of a request (or a standalone job), with its state machine
//! - `JobStore`: owner-scoped persistence (in-memory or Postgres)

pub mod store;
pub mod types;

pub use store::{InMemoryJobStore, JobStore};
pub use types::{DEFAULT_PRIORITY, Job, JobState, JobStats, RETRY_PRIORITY};
