//! Session orchestrator.
//!
//! Owns the [`SessionRegistry`] and exactly one running transport per session.
//! Each transport lives on its own task from the moment its record is created
//! until the record is removed, regardless of which tab is focused. Output of
//! unfocused sessions keeps arriving and is retained in a per-session
//! [`Scrollback`] so the tab can be redrawn on refocus.
//!
//! The UI side talks to the orchestrator only through plain method calls
//! (`open_session`, `send_input`, `resize`, `focus`, `close_session`) and the
//! [`SessionEvent`] stream returned by `next_event`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use relay_core::error::RelayResult;
use relay_core::transport::Connector;

use crate::hosts::Host;
use crate::registry::{SessionRecord, SessionRegistry};
use crate::retry::{connect_with_retry, RetryPolicy};
use crate::scrollback::{Scrollback, DEFAULT_SCROLLBACK_BYTES};
use crate::session::{CloseReason, SessionOpts, SessionTransport, TransportHandler};
use crate::transport::terminal_url;

/// How long `close_session` waits for a session task before aborting it.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Origin the terminal URLs are derived from.
    pub origin: String,
    /// Command sent in `start_session`; `None` lets the host choose.
    pub command: Option<Vec<String>>,
    /// Bytes of output retained per session.
    pub scrollback_bytes: usize,
    /// Handshake retry policy.
    pub retry: RetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            command: Some(vec!["/bin/bash".to_string()]),
            scrollback_bytes: DEFAULT_SCROLLBACK_BYTES,
            retry: RetryPolicy::default(),
        }
    }
}

/// Connection status of a session as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Connected,
    /// The handshake never succeeded.
    Failed(String),
    /// The host ended the session (the process exited).
    Ended { exit_code: Option<i32> },
    /// The channel dropped mid-session.
    Disconnected,
}

impl SessionStatus {
    /// Whether the session's transport is gone for good.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Failed(_) | SessionStatus::Ended { .. } | SessionStatus::Disconnected
        )
    }
}

/// Something the UI should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session_id: String,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEventKind {
    /// PTY output. Already appended to the session's scrollback.
    Output(Vec<u8>),
    /// Non-fatal error from the host or channel.
    Error(String),
    Status(SessionStatus),
}

/// Instructions from the UI to a session task.
#[derive(Debug)]
enum SessionCommand {
    Input(Vec<u8>),
    Resize { rows: u16, cols: u16 },
    Close,
}

struct LiveSession {
    commands: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<()>,
    scrollback: Scrollback,
    status: SessionStatus,
}

/// Forwards transport callbacks into the orchestrator's event stream.
#[derive(Clone)]
struct EventForwarder {
    session_id: String,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl EventForwarder {
    fn emit(&self, kind: SessionEventKind) {
        let event = SessionEvent {
            session_id: self.session_id.clone(),
            kind,
        };
        if self.events.send(event).is_err() {
            debug!(session_id = %self.session_id, "event receiver gone");
        }
    }
}

impl TransportHandler for EventForwarder {
    fn on_data(&mut self, data: &[u8]) {
        self.emit(SessionEventKind::Output(data.to_vec()));
    }

    fn on_error(&mut self, message: &str) {
        self.emit(SessionEventKind::Error(message.to_string()));
    }

    fn on_close(&mut self, reason: CloseReason) {
        let status = match reason {
            CloseReason::RemoteTermination { exit_code } => SessionStatus::Ended { exit_code },
            CloseReason::ChannelDropped => SessionStatus::Disconnected,
        };
        self.emit(SessionEventKind::Status(status));
    }
}

/// Registry plus one transport task per session.
pub struct SessionOrchestrator {
    registry: SessionRegistry,
    connector: Arc<dyn Connector>,
    config: OrchestratorConfig,
    live: HashMap<String, LiveSession>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    /// Last size reported by the terminal; applied to sessions as they open.
    size: Option<(u16, u16)>,
}

impl SessionOrchestrator {
    pub fn new(connector: Arc<dyn Connector>, config: OrchestratorConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            registry: SessionRegistry::new(),
            connector,
            config,
            live: HashMap::new(),
            events_tx,
            events_rx,
            size: None,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Open a session against a discovered host.
    ///
    /// Offline hosts are attempted anyway; discovery may be stale.
    pub fn open_host(&mut self, host: &Host, display_name: Option<String>) -> RelayResult<String> {
        if !host.is_online() {
            warn!(host_id = %host.id, "host reported offline, connecting anyway");
        }
        self.open_session(&host.id, display_name)
    }

    /// Create a session record for `host_id`, focus it, and start its transport.
    ///
    /// Fails only when no terminal URL can be derived; no record is created then.
    pub fn open_session(&mut self, host_id: &str, display_name: Option<String>) -> RelayResult<String> {
        let url = terminal_url(&self.config.origin, host_id)?;
        let session_id = self.registry.create_session(host_id, display_name);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let task = SessionTask {
            session_id: session_id.clone(),
            host_id: host_id.to_string(),
            url,
            opts: SessionOpts {
                command: self.config.command.clone(),
            },
            retry: self.config.retry.clone(),
            connector: self.connector.clone(),
            commands: commands_rx,
            events: self.events_tx.clone(),
            size: self.size,
        };
        let handle = tokio::spawn(task.run());

        self.live.insert(
            session_id.clone(),
            LiveSession {
                commands: commands_tx,
                task: handle,
                scrollback: Scrollback::new(self.config.scrollback_bytes),
                status: SessionStatus::Connecting,
            },
        );
        info!(session_id = %session_id, host_id, "session opened");
        Ok(session_id)
    }

    /// Remove a session and close its transport. Unknown ids are ignored.
    pub async fn close_session(&mut self, session_id: &str) {
        self.registry.remove_session(session_id);
        let Some(mut live) = self.live.remove(session_id) else {
            return;
        };

        let _ = live.commands.send(SessionCommand::Close);
        if time::timeout(CLOSE_GRACE, &mut live.task).await.is_err() {
            warn!(session_id, "session task did not stop in time, aborting");
            live.task.abort();
        }
        info!(session_id, "session closed");
    }

    /// Close every session.
    pub async fn shutdown(&mut self) {
        let ids: Vec<String> = self.registry.list_sessions().iter().map(|s| s.id.clone()).collect();
        for id in ids {
            self.close_session(&id).await;
        }
    }

    /// Focus a session and return its scrollback for redrawing.
    pub fn focus(&mut self, session_id: &str) -> RelayResult<Vec<u8>> {
        self.registry.set_active(session_id)?;
        Ok(self.scrollback(session_id).unwrap_or_default())
    }

    /// Focus the session `offset` tabs away from the current one, wrapping.
    pub fn focus_relative(&mut self, offset: isize) -> Option<String> {
        let len = self.registry.len() as isize;
        if len == 0 {
            return None;
        }
        let current = self
            .registry
            .active_id()
            .and_then(|id| self.registry.position(id))
            .unwrap_or(0) as isize;
        let target = (current + offset).rem_euclid(len) as usize;
        let id = self.registry.list_sessions()[target].id.clone();
        self.registry.set_active(&id).ok()?;
        Some(id)
    }

    pub fn active(&self) -> Option<&SessionRecord> {
        self.registry.active()
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.registry.is_active(session_id)
    }

    pub fn status(&self, session_id: &str) -> Option<&SessionStatus> {
        self.live.get(session_id).map(|l| &l.status)
    }

    pub fn scrollback(&self, session_id: &str) -> Option<Vec<u8>> {
        self.live.get(session_id).map(|l| l.scrollback.snapshot())
    }

    /// Forward input to the focused session. Dropped when nothing is focused.
    pub fn send_input(&self, data: &[u8]) {
        let Some(id) = self.registry.active_id() else {
            debug!("no active session, dropping input");
            return;
        };
        self.command(id, SessionCommand::Input(data.to_vec()));
    }

    /// Forward input to a specific session.
    pub fn send_input_to(&self, session_id: &str, data: &[u8]) {
        self.command(session_id, SessionCommand::Input(data.to_vec()));
    }

    /// Apply a terminal size to every live session, focused or not.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.size = Some((rows, cols));
        for (id, live) in &self.live {
            if live.commands.send(SessionCommand::Resize { rows, cols }).is_err() {
                debug!(session_id = %id, "resize skipped: session task finished");
            }
        }
    }

    /// Next event for a session that is still registered.
    ///
    /// Output is appended to the session's scrollback and status changes are
    /// recorded before the event is returned. Events for removed sessions are
    /// discarded.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            let event = self.events_rx.recv().await?;
            let Some(live) = self.live.get_mut(&event.session_id) else {
                debug!(session_id = %event.session_id, "dropping event for removed session");
                continue;
            };
            match &event.kind {
                SessionEventKind::Output(bytes) => live.scrollback.write(bytes),
                SessionEventKind::Status(status) => live.status = status.clone(),
                SessionEventKind::Error(_) => {}
            }
            return Some(event);
        }
    }

    fn command(&self, session_id: &str, cmd: SessionCommand) {
        match self.live.get(session_id) {
            Some(live) => {
                if live.commands.send(cmd).is_err() {
                    debug!(session_id, "session task finished, command dropped");
                }
            }
            None => debug!(session_id, "no such session, command dropped"),
        }
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        for live in self.live.values() {
            live.task.abort();
        }
    }
}

/// Everything one session task needs; moved onto its own task.
struct SessionTask {
    session_id: String,
    host_id: String,
    url: String,
    opts: SessionOpts,
    retry: RetryPolicy,
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
    size: Option<(u16, u16)>,
}

impl SessionTask {
    async fn run(mut self) {
        let forwarder = EventForwarder {
            session_id: self.session_id.clone(),
            events: self.events.clone(),
        };
        forwarder.emit(SessionEventKind::Status(SessionStatus::Connecting));

        let Some(mut transport) = self.connect(&forwarder).await else {
            return;
        };
        forwarder.emit(SessionEventKind::Status(SessionStatus::Connected));

        if let Some((rows, cols)) = self.size {
            transport.resize(rows, cols).await;
        }

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(SessionCommand::Input(bytes)) => transport.send(&bytes).await,
                    Some(SessionCommand::Resize { rows, cols }) => transport.resize(rows, cols).await,
                    Some(SessionCommand::Close) | None => {
                        transport.close().await;
                        break;
                    }
                },
                open = transport.pump() => {
                    if !open {
                        break;
                    }
                }
            }
        }
        debug!(session_id = %self.session_id, "session task finished");
    }

    /// Connect, while still honouring close requests and remembering resizes.
    async fn connect(&mut self, forwarder: &EventForwarder) -> Option<SessionTransport> {
        let make = || {
            SessionTransport::new(
                self.session_id.clone(),
                self.host_id.clone(),
                self.url.clone(),
                self.opts.clone(),
                Box::new(forwarder.clone()),
            )
        };
        let connecting = connect_with_retry(&self.retry, self.connector.as_ref(), make);
        tokio::pin!(connecting);

        loop {
            tokio::select! {
                result = &mut connecting => {
                    return match result {
                        Ok(transport) => Some(transport),
                        Err(e) => {
                            forwarder.emit(SessionEventKind::Status(SessionStatus::Failed(e.to_string())));
                            None
                        }
                    };
                }
                cmd = self.commands.recv() => match cmd {
                    Some(SessionCommand::Resize { rows, cols }) => self.size = Some((rows, cols)),
                    Some(SessionCommand::Input(_)) => {
                        warn!(session_id = %self.session_id, "dropping input: session not connected yet");
                    }
                    Some(SessionCommand::Close) | None => {
                        debug!(session_id = %self.session_id, "closed while connecting");
                        return None;
                    }
                },
            }
        }
    }
}
