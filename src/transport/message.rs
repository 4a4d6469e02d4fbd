//! Wire protocol
//!
//! Every frame is a JSON text message `{"event": <name>, "data": <payload>}`.
//! Query responses echo the `requestId` of the request they answer.

use serde::{Deserialize, Serialize};
use tungstenite::protocol::Message as WsMessage;

use crate::model::{ApplicationUpdate, Job, JobId, SearchParams};

/// Event names as they appear on the wire.
pub mod event {
    pub const NEW_JOB: &str = "new job";
    pub const JOB_UPDATED: &str = "job updated";
    pub const JOB_REMOVED: &str = "job removed";
    pub const JOB_EXPIRED: &str = "job expired";
    pub const APPLICATION_UPDATE: &str = "application update";
    pub const JOBS_RESULT: &str = "jobs result";
    pub const JOBS_ERROR: &str = "jobs error";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// Join the named topic.
    #[serde(rename = "watch category")]
    WatchCategory(String),
    /// Leave the named topic.
    #[serde(rename = "unwatch category")]
    UnwatchCategory(String),
    #[serde(rename = "search jobs")]
    SearchJobs(SearchRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub request_id: String,
    #[serde(flatten)]
    pub params: SearchParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "new job")]
    NewJob(Job),
    #[serde(rename = "job updated")]
    JobUpdated(Job),
    #[serde(rename = "job removed")]
    JobRemoved(JobId),
    #[serde(rename = "job expired")]
    JobExpired(JobId),
    #[serde(rename = "application update")]
    ApplicationUpdate(ApplicationUpdate),
    #[serde(rename = "jobs result")]
    JobsResult(JobsResult),
    #[serde(rename = "jobs error")]
    JobsError(JobsError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsResult {
    pub request_id: String,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsError {
    pub request_id: String,
    pub message: String,
}

impl ClientMessage {
    pub fn to_frame(&self) -> Result<WsMessage, serde_json::Error> {
        Ok(WsMessage::text(serde_json::to_string(self)?))
    }
}

impl ServerMessage {
    pub fn to_frame(&self) -> Result<WsMessage, serde_json::Error> {
        Ok(WsMessage::text(serde_json::to_string(self)?))
    }
}
