//! Subscription manager
//!
//! `JobSubscription` is the client half of the relay. Spawning one starts a
//! supervising task that:
//! - connects to the relay and joins `all jobs`, then `category:<c>` if a
//!   category was given
//! - applies pushed events to the local `JobFeed`
//! - routes `jobs result` / `jobs error` to the waiting `search_jobs` call
//!   by request id
//! - on connection loss, fails outstanding queries, backs off, reconnects
//!   and joins the same topics again
//! - on `close()` or drop, leaves its topics (category first) and closes the
//!   socket
//!
//! Connection state and feed revisions are exposed as `watch` channels so a
//! UI can re-render when either changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use super::backoff::Backoff;
use super::feed::{ConnectionState, JobFeed};
use crate::config::ClientSettings;
use crate::model::{Job, SearchParams, topic};
use crate::transport::message::{ClientMessage, SearchRequest, ServerMessage};
use crate::utils::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type QueryReply = Result<Vec<Job>, ClientError>;

#[derive(Debug)]
struct PendingQuery {
    seq: u64,
    reply: oneshot::Sender<QueryReply>,
}

#[derive(Debug)]
enum Command {
    Watch(String),
    Unwatch(String),
    Search(SearchRequest),
}

/// State shared by the handle and its supervising task.
#[derive(Debug)]
struct Shared {
    feed: Mutex<JobFeed>,
    pending: Mutex<HashMap<String, PendingQuery>>,
    revision: watch::Sender<u64>,
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    fn new() -> Self {
        Self {
            feed: Mutex::new(JobFeed::new()),
            pending: Mutex::new(HashMap::new()),
            revision: watch::channel(0).0,
            state: watch::channel(ConnectionState::Disconnected).0,
        }
    }

    fn feed(&self) -> MutexGuard<'_, JobFeed> {
        self.feed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, PendingQuery>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "connection state changed");
        }
    }

    fn update(&self, apply: impl FnOnce(&mut JobFeed) -> bool) {
        let changed = apply(&mut *self.feed());
        if changed {
            self.revision.send_modify(|revision| *revision += 1);
        }
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::JobsResult(result)) => {
                self.resolve(&result.request_id, Ok(result.jobs));
            }
            Ok(ServerMessage::JobsError(error)) => {
                self.resolve(&error.request_id, Err(error.message));
            }
            Ok(event) => self.update(|feed| feed.apply(&event)),
            Err(e) => warn!("ignoring malformed frame from relay: {e}"),
        }
    }

    fn resolve(&self, request_id: &str, outcome: Result<Vec<Job>, String>) {
        let Some(pending) = self.pending().remove(request_id) else {
            debug!(request_id, "response for an unknown or expired query");
            return;
        };

        let reply = match outcome {
            Ok(jobs) => {
                self.update(|feed| feed.apply_results(pending.seq, jobs.clone()));
                Ok(jobs)
            }
            Err(message) => {
                self.update(|feed| feed.apply_error(pending.seq, message.clone()));
                Err(ClientError::Search(message))
            }
        };
        let _ = pending.reply.send(reply);
    }

    fn fail_query(&self, request_id: &str) {
        if let Some(pending) = self.pending().remove(request_id) {
            let _ = pending.reply.send(Err(ClientError::Disconnected));
        }
    }

    fn fail_pending(&self) {
        let drained: Vec<PendingQuery> = self.pending().drain().map(|(_, p)| p).collect();
        for pending in drained {
            let _ = pending.reply.send(Err(ClientError::Disconnected));
        }
    }
}

/// A live subscription scope: one connection, its topics and its job list.
#[derive(Debug)]
pub struct JobSubscription {
    settings: ClientSettings,
    category: Option<String>,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    next_query: AtomicU64,
    users: Mutex<Vec<String>>,
}

impl JobSubscription {
    /// Start subscribing. Returns immediately in the `connecting` state; the
    /// connection is made by a background task, so this must be called from
    /// within a Tokio runtime.
    pub fn spawn(settings: ClientSettings, category: Option<String>) -> Self {
        let mut topics = vec![topic::ALL_JOBS.to_string()];
        if let Some(name) = &category {
            topics.push(topic::category(name));
        }

        let shared = Arc::new(Shared::new());
        shared.set_state(ConnectionState::Connecting);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let supervisor = Supervisor {
            url: settings.url.clone(),
            topics,
            backoff: Backoff::from_settings(&settings),
            shared: shared.clone(),
            commands: command_rx,
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(supervisor.run());

        Self {
            settings,
            category,
            shared,
            commands,
            shutdown,
            task,
            next_query: AtomicU64::new(0),
            users: Mutex::new(Vec::new()),
        }
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Ticks every time the feed changes.
    pub fn feed_changes(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    pub async fn wait_for_state(&self, wanted: ConnectionState) {
        let mut changes = self.state_changes();
        let _ = changes.wait_for(|state| *state == wanted).await;
    }

    /// Snapshot of the feed.
    pub fn feed(&self) -> JobFeed {
        self.shared.feed().clone()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.shared.feed().jobs().to_vec()
    }

    pub fn error(&self) -> Option<String> {
        self.shared.feed().error().map(str::to_string)
    }

    /// Also receive application updates for `user_id`. Kept across
    /// reconnects and `rescope`, like the scope's own topics.
    pub fn watch_user(&self, user_id: &str) -> Result<(), ClientError> {
        self.command(Command::Watch(topic::user(user_id)))?;
        let mut users = self.users();
        if !users.iter().any(|u| u == user_id) {
            users.push(user_id.to_string());
        }
        Ok(())
    }

    pub fn unwatch_user(&self, user_id: &str) -> Result<(), ClientError> {
        self.command(Command::Unwatch(topic::user(user_id)))?;
        self.users().retain(|u| u != user_id);
        Ok(())
    }

    /// Users whose application updates this scope receives.
    pub fn watched_users(&self) -> Vec<String> {
        self.users().clone()
    }

    /// Run a one-shot query and wait for its answer.
    ///
    /// On success the local list is replaced by the result. On `jobs error`
    /// the feed's error is set, the list is kept, and the error is returned.
    /// Every call gets its own request id, so overlapping queries resolve
    /// independently and an older answer never overwrites a newer one.
    pub async fn search_jobs(&self, params: SearchParams) -> Result<Vec<Job>, ClientError> {
        if self.state() != ConnectionState::Connected {
            return Err(ClientError::Disconnected);
        }

        let request_id = Uuid::new_v4().to_string();
        let seq = self.next_query.fetch_add(1, Ordering::Relaxed) + 1;
        let (reply, answer) = oneshot::channel();
        self.shared
            .pending()
            .insert(request_id.clone(), PendingQuery { seq, reply });

        let request = SearchRequest {
            request_id: request_id.clone(),
            params,
        };
        if let Err(e) = self.command(Command::Search(request)) {
            self.shared.pending().remove(&request_id);
            return Err(e);
        }

        let timeout = self.settings.query_timeout();
        match tokio::time::timeout(timeout, answer).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(ClientError::Disconnected),
            Err(_) => {
                self.shared.pending().remove(&request_id);
                Err(ClientError::Timeout(timeout))
            }
        }
    }

    /// Leave every topic, close the connection and wait for the background
    /// task to finish.
    pub async fn close(self) {
        let Self { shutdown, task, .. } = self;
        let _ = shutdown.send(true);
        if let Err(e) = task.await {
            warn!("subscription task ended abnormally: {e}");
        }
    }

    /// Tear this scope down completely, then start a new one for `category`
    /// against the same relay. Watched users carry over to the new scope.
    pub async fn rescope(self, category: Option<String>) -> Self {
        let settings = self.settings.clone();
        let users = self.watched_users();
        self.close().await;

        let next = Self::spawn(settings, category);
        for user in &users {
            if let Err(e) = next.watch_user(user) {
                warn!(user_id = %user, "failed to carry user watch over: {e}");
            }
        }
        next
    }

    fn users(&self) -> MutexGuard<'_, Vec<String>> {
        self.users
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn command(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::Closed)
    }
}

enum SessionEnd {
    Shutdown,
    Lost,
}

struct Supervisor {
    url: String,
    topics: Vec<String>,
    backoff: Backoff,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    async fn run(mut self) {
        loop {
            self.shared.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                result = connect_async(self.url.as_str()) => result,
                _ = self.shutdown.changed() => break,
            };

            match connected {
                Ok((ws, _)) => {
                    self.backoff.reset();
                    info!(url = %self.url, topics = ?self.topics, "connected to relay");
                    let end = self.session(ws).await;
                    self.shared.fail_pending();
                    if matches!(end, SessionEnd::Shutdown) {
                        break;
                    }
                    warn!(url = %self.url, "connection to relay lost");
                }
                Err(e) => warn!(url = %self.url, "failed to connect to relay: {e}"),
            }

            self.shared.set_state(ConnectionState::Disconnected);
            if !self.wait_before_retry().await {
                break;
            }
        }

        self.shared.fail_pending();
        self.shared.set_state(ConnectionState::Disconnected);
        debug!(url = %self.url, "subscription closed");
    }

    async fn session(&mut self, ws: WsStream) -> SessionEnd {
        let (mut sink, mut stream) = ws.split();

        for topic in &self.topics {
            let watch = ClientMessage::WatchCategory(topic.clone());
            if let Err(e) = send(&mut sink, &watch).await {
                warn!("failed to join {topic}: {e}");
                return SessionEnd::Lost;
            }
        }
        self.shared.set_state(ConnectionState::Connected);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    leave_all(&mut sink, &self.topics).await;
                    return SessionEnd::Shutdown;
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        leave_all(&mut sink, &self.topics).await;
                        return SessionEnd::Shutdown;
                    };
                    if let Err(e) = self.apply_online(&mut sink, command).await {
                        warn!("failed to send to relay: {e}");
                        return SessionEnd::Lost;
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => self.shared.dispatch(text.as_str()),
                    Some(Ok(WsMessage::Close(_))) | None => return SessionEnd::Lost,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("failed to read from relay: {e}");
                        return SessionEnd::Lost;
                    }
                }
            }
        }
    }

    async fn apply_online(&mut self, sink: &mut WsSink, command: Command) -> Result<(), ClientError> {
        match command {
            Command::Watch(topic) => {
                if !self.topics.contains(&topic) {
                    self.topics.push(topic.clone());
                    send(sink, &ClientMessage::WatchCategory(topic)).await?;
                }
            }
            Command::Unwatch(topic) => {
                if self.remove_topic(&topic) {
                    send(sink, &ClientMessage::UnwatchCategory(topic)).await?;
                }
            }
            Command::Search(request) => {
                send(sink, &ClientMessage::SearchJobs(request)).await?;
            }
        }
        Ok(())
    }

    /// Topic changes made while offline are replayed on the next connect;
    /// queries fail straight away.
    fn apply_offline(&mut self, command: Command) {
        match command {
            Command::Watch(topic) => {
                if !self.topics.contains(&topic) {
                    self.topics.push(topic);
                }
            }
            Command::Unwatch(topic) => {
                self.remove_topic(&topic);
            }
            Command::Search(request) => self.shared.fail_query(&request.request_id),
        }
    }

    fn remove_topic(&mut self, topic: &str) -> bool {
        let before = self.topics.len();
        self.topics.retain(|t| t != topic);
        self.topics.len() != before
    }

    /// Sleep for the next backoff delay. Returns `false` if the
    /// subscription was closed meanwhile.
    async fn wait_before_retry(&mut self) -> bool {
        let delay = self.backoff.next_delay();
        debug!(?delay, "reconnecting to relay after delay");

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                _ = self.shutdown.changed() => return false,
                command = self.commands.recv() => match command {
                    Some(command) => self.apply_offline(command),
                    None => return false,
                },
            }
        }
    }
}

async fn send(sink: &mut WsSink, message: &ClientMessage) -> Result<(), ClientError> {
    sink.send(message.to_frame()?).await?;
    Ok(())
}

/// Leave topics in reverse join order (category before `all jobs`), then
/// close. Errors are ignored: the connection is going away either way.
async fn leave_all(sink: &mut WsSink, topics: &[String]) {
    for topic in topics.iter().rev() {
        let _ = send(sink, &ClientMessage::UnwatchCategory(topic.clone())).await;
    }
    let _ = sink.close().await;
}
