//! The `transport` module carries the relay over WebSockets: the JSON
//! envelope vocabulary shared by server and client, and the server loop that
//! registers connections with the router and answers client requests.

pub mod message;
pub mod websocket;

pub use message::{ClientMessage, JobsError, JobsResult, SearchRequest, ServerMessage};
pub use websocket::{serve, start_websocket_server};

#[cfg(test)]
mod tests;
#[cfg(test)]
mod websocket_tests;
