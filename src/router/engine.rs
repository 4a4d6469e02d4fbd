//! Router engine
//!
//! Keeps topic → member connections and connection → joined topics in step,
//! and fans a named event out to every member of a topic.
//!
//! The API is synchronous and meant to sit behind `SharedRouter`. Callers
//! must not hold the lock across network I/O; `publish` only enqueues frames
//! on per-connection channels, so it never waits on a socket.

use std::collections::{HashMap, HashSet};

use serde_json::{Value, json};
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;

use super::connection::{Connection, ConnectionId};
use super::topic::Topic;

#[derive(Debug, Default)]
pub struct TopicRouter {
    pub(crate) topics: HashMap<String, Topic>,
    pub(crate) connections: HashMap<ConnectionId, Connection>,
}

impl TopicRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connection: Connection) {
        debug!(conn_id = %connection.id, "connection registered");
        self.connections.insert(connection.id.clone(), connection);
    }

    pub fn is_registered(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Add a connection to a topic, creating the topic on first use.
    ///
    /// Idempotent. Returns `true` only when the membership is new. Unknown
    /// connections are refused.
    pub fn join(&mut self, id: &ConnectionId, topic: &str) -> bool {
        let Some(connection) = self.connections.get_mut(id) else {
            warn!(conn_id = %id, topic, "join from unregistered connection");
            return false;
        };

        connection.topics.insert(topic.to_string());
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .join(id.clone())
    }

    /// Remove a connection from a topic. No-op if it was not a member.
    pub fn leave(&mut self, id: &ConnectionId, topic: &str) -> bool {
        if let Some(connection) = self.connections.get_mut(id) {
            connection.topics.remove(topic);
        }
        self.leave_topic(id, topic)
    }

    fn leave_topic(&mut self, id: &ConnectionId, topic: &str) -> bool {
        let Some(entry) = self.topics.get_mut(topic) else {
            return false;
        };
        let removed = entry.leave(id);
        if entry.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }

    /// Deliver `{event, data}` to every current member of `topic`.
    ///
    /// Members whose channel has closed are skipped silently. Returns how
    /// many connections the frame was queued for.
    pub fn publish(&self, topic: &str, event: &str, payload: &Value) -> usize {
        self.publish_to(&[topic], event, payload)
    }

    /// Deliver one event to several topics at once. A connection that is a
    /// member of more than one of them receives the frame once.
    pub fn publish_to(&self, topics: &[&str], event: &str, payload: &Value) -> usize {
        self.publish_except(topics, &[], event, payload)
    }

    /// Like `publish_to`, but skips every connection that is a member of
    /// any of the `except` topics.
    pub fn publish_except(
        &self,
        topics: &[&str],
        except: &[&str],
        event: &str,
        payload: &Value,
    ) -> usize {
        let mut seen: HashSet<&ConnectionId> = except
            .iter()
            .filter_map(|topic| self.topics.get(*topic))
            .flat_map(|entry| entry.members.iter())
            .collect();

        let mut recipients: Vec<&ConnectionId> = Vec::new();
        for topic in topics {
            if let Some(entry) = self.topics.get(*topic) {
                recipients.extend(entry.members.iter().filter(|id| seen.insert(*id)));
            }
        }

        if recipients.is_empty() {
            debug!(?topics, event, "no members, nothing to deliver");
            return 0;
        }

        let frame = WsMessage::text(json!({ "event": event, "data": payload }).to_string());

        let mut delivered = 0;
        for member in recipients {
            match self.connections.get(member) {
                Some(connection) if connection.send(frame.clone()) => delivered += 1,
                Some(_) => debug!(conn_id = %member, event, "dropped, connection closing"),
                None => debug!(conn_id = %member, event, "member without a live connection"),
            }
        }

        debug!(?topics, ?except, event, delivered, "published");
        delivered
    }

    /// Disconnect hook: forget the connection and every membership it held.
    /// Safe to call more than once.
    pub fn disconnect(&mut self, id: &ConnectionId) {
        let Some(connection) = self.connections.remove(id) else {
            return;
        };

        for topic in &connection.topics {
            self.leave_topic(id, topic);
        }

        debug!(conn_id = %id, topics = connection.topics.len(), "connection cleaned up");
    }

    pub fn members(&self, topic: &str) -> Vec<ConnectionId> {
        self.topics
            .get(topic)
            .map(|t| t.members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn topics_of(&self, id: &ConnectionId) -> Vec<String> {
        let mut topics: Vec<String> = self
            .connections
            .get(id)
            .map(|c| c.topics.iter().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }
}
