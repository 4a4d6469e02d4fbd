//! Job directory
//!
//! The relay answers `search jobs` queries through a `JobDirectory`. The
//! marketplace backend is the real owner of job data; `InMemoryJobDirectory`
//! mirrors whatever the notifier publishes so a standalone relay can answer
//! queries too.

pub mod memory;

use std::fmt::Debug;

use crate::model::{Job, SearchParams};
use crate::utils::error::SearchError;

pub use memory::InMemoryJobDirectory;

pub trait JobDirectory: Send + Sync + Debug {
    /// Run a query. Results are ordered and replace the client's list as a
    /// whole.
    fn search(&self, params: &SearchParams) -> Result<Vec<Job>, SearchError>;

    /// Insert a job or replace the stored job with the same id.
    fn upsert(&self, job: Job);

    fn remove(&self, job_id: &str);

    /// Mark a job closed. No-op for unknown ids.
    fn expire(&self, job_id: &str);
}
