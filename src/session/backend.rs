//! One persistent backend connection per user identity.
//!
//! # Responsibilities
//! - Run the login handshake right after connecting
//! - Own the pending-reply queue and correlate replies by position (FIFO)
//! - Tear down on error or close, failing every queued caller
//!
//! # Design Decisions
//! - Each session is a task that exclusively owns the socket and the queue;
//!   callers talk to it through a cloneable [`BackendSession`] handle
//! - Lifecycle is published on a watch channel so any number of callers can
//!   await the handshake outcome
//! - Replies carry no correlation id: the head of the queue receives the
//!   next non-handshake message, whatever its content

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use crate::config::BackendConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::observability::metrics;
use crate::session::connection::{connect, ConnectionId, LineWriter};
use crate::session::registry::SessionRegistry;
use crate::wire::{classify, detail, MessageKind, WireMessage};

/// Session lifecycle.
///
/// ```text
/// Disconnected → Connecting → Active | Errored
/// Active → Closed | Errored
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Active,
    Closed,
    Errored,
}

impl SessionState {
    /// True once the handshake has an outcome.
    pub fn is_settled(self) -> bool {
        !matches!(self, SessionState::Disconnected | SessionState::Connecting)
    }

    /// True for states a session never leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Errored)
    }
}

/// Snapshot published by the session task.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Why the session ended, once terminal.
    pub failure: Option<BridgeError>,
    /// Number of callers waiting for a reply.
    pub pending: usize,
}

impl SessionStatus {
    fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            failure: None,
            pending: 0,
        }
    }
}

type ReplySender = oneshot::Sender<BridgeResult<String>>;

enum SessionCommand {
    Send { message: String, reply: ReplySender },
    Close,
}

/// A reply the caller is waiting for.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<BridgeResult<String>>,
}

impl PendingReply {
    /// Wait for the raw backend reply.
    ///
    /// Dropping this before it resolves leaves the queue slot in place, so
    /// the reply meant for it is consumed and discarded rather than handed
    /// to the next caller.
    pub async fn recv(self) -> BridgeResult<String> {
        self.rx.await.unwrap_or(Err(BridgeError::ConnectionClosed))
    }
}

/// Handle to a backend session task.
#[derive(Debug, Clone)]
pub struct BackendSession {
    username: Arc<str>,
    id: ConnectionId,
    commands: mpsc::UnboundedSender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionCommand::Send { message, .. } => {
                f.debug_tuple("Send").field(message).finish()
            }
            SessionCommand::Close => f.write_str("Close"),
        }
    }
}

impl BackendSession {
    /// Spawn the session task. The connection and login start immediately.
    pub(crate) fn spawn(
        username: &str,
        config: &BackendConfig,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        let id = ConnectionId::new();
        let username: Arc<str> = Arc::from(username);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::new());

        let task = SessionTask {
            username: Arc::clone(&username),
            id,
            address: config.address.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            max_line: config.max_line_bytes,
            state: SessionState::Disconnected,
            commands: commands_rx,
            status: status_tx,
            queue: VecDeque::new(),
            registry,
        };

        let span = tracing::info_span!("session", username = %username, session_id = %id);
        tokio::spawn(task.run().instrument(span));

        Self {
            username,
            id,
            commands: commands_tx,
            status: status_rx,
        }
    }

    /// User identity this session belongs to.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Connection identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    /// Current status snapshot.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Wait for the login handshake to finish.
    ///
    /// Every caller sharing this session observes the same outcome.
    pub async fn wait_open(&self) -> BridgeResult<()> {
        let mut status = self.status.clone();
        let outcome = match status.wait_for(|s| s.state.is_settled()).await {
            Ok(s) if s.state == SessionState::Active => Ok(()),
            Ok(s) => Err(s.failure.clone().unwrap_or_else(closed_during_login)),
            Err(_) => Err(closed_during_login()),
        };
        outcome
    }

    /// Wait until the session has reached a terminal state.
    pub async fn closed(&self) {
        let mut status = self.status.clone();
        let _ = status.wait_for(|s| s.state.is_terminal()).await;
    }

    /// Queue a continuation and forward `message` to the backend.
    ///
    /// Fails without writing anything unless the session is Active.
    pub fn send(&self, message: &WireMessage) -> BridgeResult<PendingReply> {
        if !self.is_active() {
            return Err(BridgeError::SessionNotActive(self.username.to_string()));
        }

        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::Send {
                message: message.encode(),
                reply,
            })
            .map_err(|_| BridgeError::ConnectionClosed)?;

        Ok(PendingReply { rx })
    }

    /// Log out and close the connection.
    pub fn close(&self) {
        let _ = self.commands.send(SessionCommand::Close);
    }
}

/// Login outcome when the connection ends before the handshake does.
fn closed_during_login() -> BridgeError {
    BridgeError::ConnectionFailed("closed during login".to_string())
}

enum Event {
    Inbound(std::io::Result<Option<String>>),
    Command(Option<SessionCommand>),
}

#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// The task side of a session: sole owner of the socket and the queue.
struct SessionTask {
    username: Arc<str>,
    id: ConnectionId,
    address: String,
    connect_timeout: Duration,
    max_line: usize,
    state: SessionState,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    status: watch::Sender<SessionStatus>,
    queue: VecDeque<ReplySender>,
    registry: Arc<SessionRegistry>,
}

impl SessionTask {
    async fn run(mut self) {
        self.set_state(SessionState::Connecting);
        tracing::info!(address = %self.address, "Connecting to backend");

        let connected = connect(&self.address, self.connect_timeout, self.max_line).await;
        let (mut reader, mut writer) = match connected {
            Ok(halves) => halves,
            Err(e) => {
                tracing::error!(error = %e, "Backend connect failed");
                self.fail(e);
                self.drain_commands();
                return;
            }
        };

        if let Err(e) = writer.send(&WireMessage::login(&self.username).encode()).await {
            tracing::error!(error = %e, "Failed to send login");
            self.fail(BridgeError::ConnectionFailed(e.to_string()));
            self.drain_commands();
            return;
        }

        loop {
            let event = tokio::select! {
                inbound = reader.next_message() => Event::Inbound(inbound),
                command = self.commands.recv() => Event::Command(command),
            };

            let flow = match event {
                Event::Inbound(Ok(Some(message))) => self.on_message(message, &mut writer).await,
                Event::Inbound(Ok(None)) => {
                    self.on_eof();
                    Flow::Stop
                }
                Event::Inbound(Err(e)) => {
                    tracing::error!(error = %e, "Backend connection error");
                    self.fail(BridgeError::ConnectionFailed(e.to_string()));
                    Flow::Stop
                }
                Event::Command(Some(SessionCommand::Send { message, reply })) => {
                    self.on_send(message, reply, &mut writer).await
                }
                Event::Command(Some(SessionCommand::Close)) | Event::Command(None) => {
                    self.on_close(&mut writer).await;
                    Flow::Stop
                }
            };

            if flow == Flow::Stop {
                break;
            }
        }

        self.drain_commands();
    }

    async fn on_message(&mut self, message: String, writer: &mut LineWriter) -> Flow {
        let kind = classify(&message);
        tracing::debug!(kind = %kind, message = %message, "Received from backend");

        match (self.state, &kind) {
            (SessionState::Connecting, MessageKind::LoginSuccess) => {
                self.set_state(SessionState::Active);
                metrics::session_activated();
                tracing::info!("Login accepted");
                Flow::Continue
            }
            (SessionState::Connecting, MessageKind::LoginError) => {
                let detail = detail(&message);
                tracing::warn!(detail = %detail, "Login rejected");
                writer.shutdown().await;
                self.fail(BridgeError::LoginFailed { detail });
                Flow::Stop
            }
            (SessionState::Active, MessageKind::LoginSuccess | MessageKind::LoginError) => {
                tracing::warn!(message = %message, "Handshake reply on an active session dropped");
                metrics::record_push_dropped();
                Flow::Continue
            }
            (SessionState::Active, _) => {
                self.deliver(message);
                Flow::Continue
            }
            _ => {
                tracing::debug!(message = %message, "Message before login completed dropped");
                metrics::record_push_dropped();
                Flow::Continue
            }
        }
    }

    /// Hand a reply to the oldest waiting caller.
    fn deliver(&mut self, message: String) {
        match self.queue.pop_front() {
            Some(waiter) => {
                self.publish_pending();
                metrics::record_reply();
                if waiter.send(Ok(message)).is_err() {
                    tracing::debug!("Caller gave up before its reply arrived; reply dropped");
                }
            }
            None => {
                tracing::info!(message = %message, "Unsolicited backend message dropped");
                metrics::record_push_dropped();
            }
        }
    }

    async fn on_send(
        &mut self,
        message: String,
        reply: ReplySender,
        writer: &mut LineWriter,
    ) -> Flow {
        if self.state != SessionState::Active {
            let _ = reply.send(Err(BridgeError::SessionNotActive(self.username.to_string())));
            return Flow::Continue;
        }

        self.queue.push_back(reply);
        self.publish_pending();

        if let Err(e) = writer.send(&message).await {
            tracing::error!(error = %e, "Failed to write command");
            self.fail(BridgeError::ConnectionFailed(e.to_string()));
            return Flow::Stop;
        }

        tracing::debug!(message = %message, pending = self.queue.len(), "Command forwarded");
        Flow::Continue
    }

    fn on_eof(&mut self) {
        if self.state == SessionState::Active {
            tracing::info!("Backend closed the connection");
            self.terminate(SessionState::Closed, BridgeError::ConnectionClosed);
        } else {
            tracing::warn!("Backend closed the connection during login");
            self.fail(closed_during_login());
        }
    }

    async fn on_close(&mut self, writer: &mut LineWriter) {
        if self.state == SessionState::Active {
            if let Err(e) = writer.send(&WireMessage::logout(&self.username).encode()).await {
                tracing::debug!(error = %e, "Failed to send logout");
            }
        }
        writer.shutdown().await;

        tracing::info!("Session closed");
        if self.state == SessionState::Active {
            self.terminate(SessionState::Closed, BridgeError::ConnectionClosed);
        } else {
            self.terminate(SessionState::Errored, closed_during_login());
        }
    }

    fn fail(&mut self, error: BridgeError) {
        metrics::record_session_failure(error.kind());
        self.terminate(SessionState::Errored, error);
    }

    /// Enter a terminal state, deregister, then fail every queued caller.
    fn terminate(&mut self, state: SessionState, error: BridgeError) {
        let was_active = self.state == SessionState::Active;
        self.state = state;
        self.registry.release(&self.username, self.id);
        self.status.send_modify(|s| {
            s.state = state;
            s.failure = Some(error.clone());
            s.pending = 0;
        });

        let pending = std::mem::take(&mut self.queue);
        if !pending.is_empty() {
            tracing::warn!(count = pending.len(), error = %error, "Failing pending requests");
        }
        for waiter in pending {
            let _ = waiter.send(Err(error.clone()));
        }

        if was_active {
            metrics::session_deactivated();
        }
    }

    /// Reject commands that were sent but never picked up by the loop.
    fn drain_commands(&mut self) {
        self.commands.close();
        let error = self
            .status
            .borrow()
            .failure
            .clone()
            .unwrap_or(BridgeError::ConnectionClosed);
        while let Ok(command) = self.commands.try_recv() {
            if let SessionCommand::Send { reply, .. } = command {
                let _ = reply.send(Err(error.clone()));
            }
        }
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.status.send_modify(|s| s.state = state);
    }

    fn publish_pending(&self) {
        let pending = self.queue.len();
        self.status.send_modify(|s| s.pending = pending);
    }
}
