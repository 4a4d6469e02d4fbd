//! Client-side job list.
//!
//! `JobFeed` is the state a UI renders: jobs most recent first, the last
//! query error, and application updates received on a user topic. It is
//! plain data; the subscription task applies incoming messages to it.

use crate::model::{ApplicationUpdate, Job, JobStatus};
use crate::transport::message::ServerMessage;

/// Where the subscription's connection stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFeed {
    jobs: Vec<Job>,
    error: Option<String>,
    application_updates: Vec<ApplicationUpdate>,
    /// Sequence number of the newest query whose answer has been applied.
    last_query: u64,
}

impl JobFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get(&self, job_id: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == job_id)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn application_updates(&self) -> &[ApplicationUpdate] {
        &self.application_updates
    }

    /// Apply a pushed event. Query responses are not events and are ignored
    /// here; they go through `apply_results` / `apply_error`. Returns whether
    /// the feed changed.
    pub fn apply(&mut self, message: &ServerMessage) -> bool {
        match message {
            ServerMessage::NewJob(job) => self.prepend(job.clone()),
            ServerMessage::JobUpdated(job) => self.replace(job),
            ServerMessage::JobRemoved(id) => self.remove(id),
            ServerMessage::JobExpired(id) => self.expire(id),
            ServerMessage::ApplicationUpdate(update) => {
                self.record_application(update.clone());
                true
            }
            ServerMessage::JobsResult(_) | ServerMessage::JobsError(_) => false,
        }
    }

    /// Put a new job at the front. A job already in the list under the same
    /// id is replaced by it rather than duplicated.
    pub fn prepend(&mut self, job: Job) -> bool {
        self.jobs.retain(|existing| existing.id != job.id);
        self.jobs.insert(0, job);
        true
    }

    pub fn replace(&mut self, job: &Job) -> bool {
        match self.jobs.iter_mut().find(|existing| existing.id == job.id) {
            Some(existing) => {
                *existing = job.clone();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, job_id: &str) -> bool {
        let before = self.jobs.len();
        self.jobs.retain(|job| job.id != job_id);
        self.jobs.len() != before
    }

    pub fn expire(&mut self, job_id: &str) -> bool {
        match self.jobs.iter_mut().find(|job| job.id == job_id) {
            Some(job) => {
                job.status = JobStatus::Closed;
                true
            }
            None => false,
        }
    }

    /// Keep the latest status per job; an update for a job seen before
    /// replaces the earlier one and moves to the end.
    pub fn record_application(&mut self, update: ApplicationUpdate) {
        self.application_updates
            .retain(|existing| existing.job_id != update.job_id);
        self.application_updates.push(update);
    }

    /// Replace the whole list with the answer to query number `seq` and
    /// clear any previous error. Answers to queries older than one already
    /// applied are discarded, so overlapping queries cannot roll the list
    /// back.
    pub fn apply_results(&mut self, seq: u64, jobs: Vec<Job>) -> bool {
        if seq <= self.last_query {
            return false;
        }
        self.last_query = seq;
        self.jobs = jobs;
        self.error = None;
        true
    }

    /// Record the failure of query number `seq`. The list is left alone.
    pub fn apply_error(&mut self, seq: u64, message: String) -> bool {
        if seq <= self.last_query {
            return false;
        }
        self.last_query = seq;
        self.error = Some(message);
        true
    }
}
