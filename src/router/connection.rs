//! Server-side view of one live client session.
//!
//! A `Connection` holds the sending half of the per-connection channel that
//! the websocket writer task drains, plus the set of topics it has joined so
//! the router can drop every membership on disconnect without scanning all
//! topics.

use std::collections::HashSet;

use tokio::sync::mpsc::UnboundedSender;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

pub type ConnectionId = String;

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub sender: UnboundedSender<WsMessage>,
    pub topics: HashSet<String>,
}

impl Connection {
    pub fn new(sender: UnboundedSender<WsMessage>) -> Self {
        Self {
            id: format!("conn-{}", Uuid::new_v4()),
            sender,
            topics: HashSet::new(),
        }
    }

    /// Queue a frame for this connection. Returns `false` when the writer
    /// side is gone, in which case the frame is dropped.
    pub fn send(&self, frame: WsMessage) -> bool {
        self.sender.send(frame).is_ok()
    }
}
