//! Shared pieces used by both the relay server and the subscription client:
//! the crate's error types and the tracing bootstrap.

pub mod error;
pub mod logging;
