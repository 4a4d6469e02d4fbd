use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tungstenite::protocol::Message as WsMessage;

use crate::config::RelaySettings;
use crate::directory::{InMemoryJobDirectory, JobDirectory};
use crate::model::{Job, SearchParams, topic};
use crate::notify::Notifier;
use crate::router::{self, SharedRouter, TopicRouter};
use crate::transport::message::{ClientMessage, SearchRequest, ServerMessage};
use crate::transport::websocket::serve;

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn setup_server(max_connections: usize) -> (String, SharedRouter, Arc<InMemoryJobDirectory>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let url = format!("ws://{}", listener.local_addr().expect("No local addr"));
    let router = router::shared(TopicRouter::new());
    let directory = Arc::new(InMemoryJobDirectory::new());

    tokio::spawn(serve(
        listener,
        router.clone(),
        directory.clone(),
        RelaySettings { max_connections },
    ));

    (url, router, directory)
}

async fn open(url: &str) -> Socket {
    let (ws, _) = connect_async(url).await.expect("WebSocket handshake failed");
    ws
}

async fn send(ws: &mut Socket, msg: ClientMessage) {
    ws.send(msg.to_frame().unwrap())
        .await
        .expect("Failed to send message");
}

async fn recv(ws: &mut Socket) -> ServerMessage {
    let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("Timed out waiting for a frame")
        .expect("Stream ended")
        .expect("Read failed");
    let raw = frame.into_data();
    serde_json::from_slice(&raw)
        .unwrap_or_else(|e| panic!("Failed to deserialize ServerMessage from '{raw:?}': {e}"))
}

async fn wait_for(router: &SharedRouter, check: impl Fn(&TopicRouter) -> bool) {
    for _ in 0..200 {
        if check(&router::lock(router)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Router never reached the expected state");
}

#[tokio::test]
async fn test_watch_then_receive_job_event() {
    let (url, router, _) = setup_server(10).await;
    let mut ws = open(&url).await;

    send(&mut ws, ClientMessage::WatchCategory(topic::category("delivery"))).await;
    wait_for(&router, |r| r.members(&topic::category("delivery")).len() == 1).await;

    let job = Job::new("job1", "delivery");
    Notifier::new(router.clone()).notify_new_job(&job).unwrap();

    assert_eq!(recv(&mut ws).await, ServerMessage::NewJob(job));
}

#[tokio::test]
async fn test_search_answered_over_socket() {
    let (url, _, directory) = setup_server(10).await;
    directory.upsert(Job::new("job1", "delivery"));
    let mut ws = open(&url).await;

    send(
        &mut ws,
        ClientMessage::SearchJobs(SearchRequest {
            request_id: "q1".to_string(),
            params: SearchParams::category("delivery"),
        }),
    )
    .await;

    match recv(&mut ws).await {
        ServerMessage::JobsResult(result) => {
            assert_eq!(result.request_id, "q1");
            assert_eq!(result.jobs, vec![Job::new("job1", "delivery")]);
        }
        other => panic!("Expected jobs result, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disconnect_removes_memberships() {
    let (url, router, _) = setup_server(10).await;
    let mut ws = open(&url).await;

    send(&mut ws, ClientMessage::WatchCategory(topic::ALL_JOBS.to_string())).await;
    send(&mut ws, ClientMessage::WatchCategory(topic::user("u1"))).await;
    wait_for(&router, |r| r.members(&topic::user("u1")).len() == 1).await;

    ws.close(None).await.expect("Failed to close");

    wait_for(&router, |r| r.connection_count() == 0).await;
    let guard = router::lock(&router);
    assert!(guard.members(topic::ALL_JOBS).is_empty());
    assert!(guard.members(&topic::user("u1")).is_empty());
}

#[tokio::test]
async fn test_abrupt_drop_is_cleaned_up() {
    let (url, router, _) = setup_server(10).await;
    let mut ws = open(&url).await;
    send(&mut ws, ClientMessage::WatchCategory(topic::ALL_JOBS.to_string())).await;
    wait_for(&router, |r| r.members(topic::ALL_JOBS).len() == 1).await;

    drop(ws);

    wait_for(&router, |r| r.connection_count() == 0).await;
}

#[tokio::test]
async fn test_connection_limit() {
    let (url, router, _) = setup_server(1).await;
    let _first = open(&url).await;
    wait_for(&router, |r| r.connection_count() == 1).await;

    let mut second = open(&url).await;
    let frame = tokio::time::timeout(Duration::from_secs(2), second.next())
        .await
        .expect("Timed out waiting for close");
    assert!(matches!(
        frame,
        Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None
    ));
    assert_eq!(router::lock(&router).connection_count(), 1);
}
