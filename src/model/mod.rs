//! Domain types shared by the relay and the subscription client: jobs,
//! application-status updates, search parameters and topic naming.

pub mod job;
pub mod topic;

pub use job::{ApplicationUpdate, Job, JobId, JobStatus, SearchParams};
