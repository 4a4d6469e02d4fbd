//! WebSocket transport
//!
//! Responsibilities:
//! - accept TCP/WebSocket connections and register a `Connection` for each
//! - forward router output to the socket through a per-connection writer task
//! - turn `watch category` / `unwatch category` into router joins and leaves
//! - answer `search jobs` from the `JobDirectory`, to the asking connection only
//! - remove the connection from every topic once either side of it closes

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::config::{RelaySettings, Settings};
use crate::directory::JobDirectory;
use crate::router::{self, Connection, ConnectionId, SharedRouter};
use crate::transport::message::{ClientMessage, JobsError, JobsResult, ServerMessage};
use crate::utils::error::ServerError;

/// Bind `settings.server` and serve until the listener fails.
pub async fn start_websocket_server(
    settings: Settings,
    router: SharedRouter,
    directory: Arc<dyn JobDirectory>,
) -> Result<(), ServerError> {
    let addr = settings.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("WebSocket server listening on ws://{addr}");
    serve(listener, router, directory, settings.relay).await
}

/// Accept loop over an already bound listener.
pub async fn serve(
    listener: TcpListener,
    router: SharedRouter,
    directory: Arc<dyn JobDirectory>,
    relay: RelaySettings,
) -> Result<(), ServerError> {
    loop {
        let (stream, peer) = listener.accept().await?;
        spawn(handle_connection(
            stream,
            peer,
            router.clone(),
            directory.clone(),
            relay.max_connections,
        ));
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: SharedRouter,
    directory: Arc<dyn JobDirectory>,
    max_connections: usize,
) {
    let mut ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, "WebSocket handshake error: {e}");
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let connection = Connection::new(tx.clone());
    let connection_id = connection.id.clone();

    let admitted = {
        let mut guard = router::lock(&router);
        if guard.connection_count() >= max_connections {
            false
        } else {
            guard.register(connection);
            true
        }
    };
    if !admitted {
        warn!(%peer, max_connections, "connection limit reached, closing");
        let _ = ws_stream.close(None).await;
        return;
    }
    info!(conn_id = %connection_id, %peer, "client connected");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let cleanup_called = Arc::new(AtomicBool::new(false));
    let do_cleanup = {
        let router = router.clone();
        let connection_id = connection_id.clone();
        let cleanup_called = cleanup_called.clone();

        move || {
            if !cleanup_called.swap(true, Ordering::SeqCst) {
                router::lock(&router).disconnect(&connection_id);
                info!(conn_id = %connection_id, "client disconnected");
            }
        }
    };

    {
        let connection_id = connection_id.clone();
        let do_cleanup = do_cleanup.clone();

        spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = ws_sender.send(frame).await {
                    debug!(conn_id = %connection_id, "send failed: {e}");
                    break;
                }
            }
            do_cleanup();
            let _ = ws_sender.close().await;
        });
    }

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                handle_client_message(
                    &router,
                    directory.as_ref(),
                    &connection_id,
                    &tx,
                    text.as_str(),
                );
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(conn_id = %connection_id, "read failed: {e}");
                break;
            }
        }
    }

    // The writer task ends once the router has dropped its sender and ours
    // goes out of scope.
    do_cleanup();
}

/// Apply one client frame. Never holds the router lock while searching.
pub(crate) fn handle_client_message(
    router: &SharedRouter,
    directory: &dyn JobDirectory,
    connection_id: &ConnectionId,
    reply: &UnboundedSender<WsMessage>,
    text: &str,
) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::WatchCategory(topic)) => {
            router::lock(router).join(connection_id, &topic);
            debug!(conn_id = %connection_id, topic = %topic, "joined");
        }
        Ok(ClientMessage::UnwatchCategory(topic)) => {
            router::lock(router).leave(connection_id, &topic);
            debug!(conn_id = %connection_id, topic = %topic, "left");
        }
        Ok(ClientMessage::SearchJobs(request)) => {
            let response = match directory.search(&request.params) {
                Ok(jobs) => {
                    debug!(conn_id = %connection_id, hits = jobs.len(), "search answered");
                    ServerMessage::JobsResult(JobsResult {
                        request_id: request.request_id,
                        jobs,
                    })
                }
                Err(e) => {
                    debug!(conn_id = %connection_id, "search rejected: {e}");
                    ServerMessage::JobsError(JobsError {
                        request_id: request.request_id,
                        message: e.to_string(),
                    })
                }
            };
            match response.to_frame() {
                Ok(frame) => {
                    let _ = reply.send(frame);
                }
                Err(e) => error!(conn_id = %connection_id, "failed to encode response: {e}"),
            }
        }
        Err(err) => {
            warn!(
                conn_id = %connection_id,
                "Invalid client message: {err} | {}",
                text.chars().take(100).collect::<String>()
            );
        }
    }
}
