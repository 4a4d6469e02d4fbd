//! Topic router
//!
//! Owns the only shared mutable state in the relay: which connection is a
//! member of which topic. Everything else (the notifier, the websocket
//! transport) goes through the router's methods.

pub mod connection;
pub mod engine;
pub mod topic;

use std::sync::{Arc, Mutex, MutexGuard};

pub use connection::{Connection, ConnectionId};
pub use engine::TopicRouter;

/// Router handle shared between the transport and the notifier.
pub type SharedRouter = Arc<Mutex<TopicRouter>>;

pub fn shared(router: TopicRouter) -> SharedRouter {
    Arc::new(Mutex::new(router))
}

/// Lock the router. Every mutation is a single synchronous call, so a panic
/// elsewhere cannot leave the membership map half-updated and a poisoned
/// lock is still safe to use.
pub fn lock(router: &SharedRouter) -> MutexGuard<'_, TopicRouter> {
    router
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests;
