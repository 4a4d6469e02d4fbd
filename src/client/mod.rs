//! The `client` module is the subscriber side of the relay.
//!
//! `JobSubscription` owns one WebSocket connection scoped to `all jobs` and,
//! optionally, one category. It keeps a `JobFeed` current from pushed events
//! and query answers, and reconnects with `Backoff` when the relay goes away.

pub mod backoff;
pub mod feed;
pub mod subscription;

pub use backoff::Backoff;
pub use feed::{ConnectionState, JobFeed};
pub use subscription::JobSubscription;
