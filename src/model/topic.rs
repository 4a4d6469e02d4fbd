//! Topic naming.
//!
//! Three families exist: one topic per job category, a single catch-all
//! topic for every job event, and one topic per user for application-status
//! updates. Topics are plain strings; the router knows nothing about these
//! families.

/// Catch-all topic receiving every job lifecycle event.
pub const ALL_JOBS: &str = "all jobs";

const CATEGORY_PREFIX: &str = "category:";
const USER_PREFIX: &str = "user:";

pub fn category(name: &str) -> String {
    format!("{CATEGORY_PREFIX}{name}")
}

pub fn user(user_id: &str) -> String {
    format!("{USER_PREFIX}{user_id}")
}

/// The two topics every job lifecycle event for `category_name` goes to.
pub fn job_targets(category_name: &str) -> [String; 2] {
    [category(category_name), ALL_JOBS.to_string()]
}
