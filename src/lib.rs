//! # jobrelay
//!
//! `jobrelay` pushes job-marketplace events to connected clients in real
//! time over WebSockets, and keeps a client-side job list in step with them.
//!
//! ## Core Modules
//!
//! - `router`: topic membership per connection and event fan-out.
//! - `notify`: the `Notifier` backend code calls when a job or application changes.
//! - `directory`: answers `search jobs` queries (`JobDirectory`, with an in-memory implementation).
//! - `transport`: the wire protocol and the WebSocket server.
//! - `client`: `JobSubscription`, the reconnecting subscriber and its `JobFeed`.
//! - `model`: jobs, query filters and topic names.
//! - `config`: layered settings from file and environment.
//! - `utils`: error types and logging setup.

pub mod client;
pub mod config;
pub mod directory;
pub mod model;
pub mod notify;
pub mod router;
pub mod transport;
pub mod utils;
