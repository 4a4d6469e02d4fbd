//! Error types for the relay.
//!
//! Delivery failures have no variant: a publish to a connection that
//! went away is dropped and logged, never surfaced to the publisher.

use thiserror::Error;

/// Rejected input at the notification boundary. Nothing is published when
/// one of these is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

/// A `search jobs` query the directory refused to run. The `Display` text is
/// what travels to the client inside `jobs error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("invalid radius")]
    InvalidRadius,
    #[error("invalid coordinates")]
    InvalidCoordinates,
    #[error("radius requires lat and lng")]
    MissingCentre,
}

/// Failures seen by the subscription client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered the query with `jobs error`.
    #[error("search failed: {0}")]
    Search(String),
    #[error("not connected to the relay")]
    Disconnected,
    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),
    #[error("subscription has been closed")]
    Closed,
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures that stop the relay server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
