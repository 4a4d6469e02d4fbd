use serde_json::json;
use tokio::sync::mpsc;
use tungstenite::protocol::Message as WsMessage;

use crate::directory::{InMemoryJobDirectory, JobDirectory};
use crate::model::{Job, SearchParams};
use crate::router::{self, Connection, ConnectionId, SharedRouter, TopicRouter};
use crate::transport::message::{ClientMessage, JobsError, SearchRequest, ServerMessage};
use crate::transport::websocket::handle_client_message;

struct Harness {
    router: SharedRouter,
    directory: InMemoryJobDirectory,
    id: ConnectionId,
    tx: mpsc::UnboundedSender<WsMessage>,
    rx: mpsc::UnboundedReceiver<WsMessage>,
}

impl Harness {
    fn new() -> Self {
        let router = router::shared(TopicRouter::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Connection::new(tx.clone());
        let id = connection.id.clone();
        router::lock(&router).register(connection);
        Self {
            router,
            directory: InMemoryJobDirectory::new(),
            id,
            tx,
            rx,
        }
    }

    fn handle(&self, msg: serde_json::Value) {
        handle_client_message(
            &self.router,
            &self.directory,
            &self.id,
            &self.tx,
            &msg.to_string(),
        );
    }

    fn next_reply(&mut self) -> ServerMessage {
        let text = self.rx.try_recv().unwrap().into_text().unwrap();
        serde_json::from_str(text.as_str()).unwrap()
    }
}

#[test]
fn test_handle_watch_and_unwatch() {
    let h = Harness::new();

    h.handle(json!({"event": "watch category", "data": "category:delivery"}));
    assert_eq!(
        router::lock(&h.router).members("category:delivery"),
        vec![h.id.clone()]
    );

    h.handle(json!({"event": "unwatch category", "data": "category:delivery"}));
    assert!(router::lock(&h.router).members("category:delivery").is_empty());
}

#[test]
fn test_handle_search_replies_to_sender_only() {
    let mut h = Harness::new();
    h.directory.upsert(Job::new("job1", "delivery"));
    h.directory.upsert(Job::new("job2", "cleaning"));

    h.handle(json!({
        "event": "search jobs",
        "data": {"requestId": "r1", "category": "delivery"}
    }));

    match h.next_reply() {
        ServerMessage::JobsResult(result) => {
            assert_eq!(result.request_id, "r1");
            assert_eq!(result.jobs, vec![Job::new("job1", "delivery")]);
        }
        other => panic!("Expected jobs result, got {other:?}"),
    }
    assert!(h.rx.try_recv().is_err());
}

#[test]
fn test_handle_search_error() {
    let mut h = Harness::new();
    h.handle(json!({
        "event": "search jobs",
        "data": {"requestId": "r2", "lat": 1, "lng": 2, "radius": -5}
    }));

    assert_eq!(
        h.next_reply(),
        ServerMessage::JobsError(JobsError {
            request_id: "r2".to_string(),
            message: "invalid radius".to_string(),
        })
    );
}

#[test]
fn test_invalid_message_is_ignored() {
    let mut h = Harness::new();
    handle_client_message(&h.router, &h.directory, &h.id, &h.tx, "not json");
    h.handle(json!({"event": "publish", "data": "x"}));
    assert!(h.rx.try_recv().is_err());
    assert!(router::lock(&h.router).topics_of(&h.id).is_empty());
}

#[test]
fn test_client_message_wire_format() {
    let msg = ClientMessage::SearchJobs(SearchRequest {
        request_id: "abc".to_string(),
        params: SearchParams {
            job_type: Some("gig".to_string()),
            ..SearchParams::category("delivery")
        },
    });
    assert_eq!(
        serde_json::to_value(&msg).unwrap(),
        json!({
            "event": "search jobs",
            "data": {"requestId": "abc", "category": "delivery", "type": "gig"}
        })
    );

    let watch: ClientMessage =
        serde_json::from_value(json!({"event": "watch category", "data": "all jobs"})).unwrap();
    assert_eq!(watch, ClientMessage::WatchCategory("all jobs".to_string()));
}

#[test]
fn test_server_message_wire_format() {
    let removed = ServerMessage::JobRemoved("job1".to_string());
    assert_eq!(
        serde_json::to_value(&removed).unwrap(),
        json!({"event": "job removed", "data": "job1"})
    );

    let parsed: ServerMessage = serde_json::from_value(json!({
        "event": "jobs error",
        "data": {"requestId": "r", "message": "invalid radius"}
    }))
    .unwrap();
    assert!(matches!(parsed, ServerMessage::JobsError(e) if e.message == "invalid radius"));
}
