//! Notification emitter
//!
//! Turns job lifecycle and application-status events coming from the
//! marketplace backend into topic-addressed messages on the router.

pub mod emitter;

pub use emitter::Notifier;
