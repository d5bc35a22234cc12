//! Client-side session transport.
//!
//! A `SessionTransport` owns exactly one channel to one host for one session.
//! It performs the `start_session` handshake, demultiplexes inbound frames into
//! data and control, and serializes outbound keystrokes and resizes.
//!
//! State machine: `Idle → Connecting → Open → Closed`. `Closed` is terminal; a
//! new attempt needs a new transport bound to the same session id.

use tracing::{debug, info, warn};

use relay_core::codec::{decode_control, encode_control, Frame};
use relay_core::error::{RelayError, RelayResult};
use relay_core::messages::{ControlMessage, ResizePayload, StartSessionPayload};
use relay_core::transport::{Connector, FrameChannel};

/// Connection state of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Created, `connect` not called yet.
    Idle,
    /// Channel opening, handshake not yet sent.
    Connecting,
    /// Handshake sent; data and control frames flow.
    Open,
    /// Terminal. Nothing is sent or delivered anymore.
    Closed,
}

/// Why an open transport closed without the caller asking it to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The host reported `session_ended`.
    RemoteTermination { exit_code: Option<i32> },
    /// The channel went away (peer close or read failure).
    ChannelDropped,
}

/// Receives inbound traffic from a transport.
///
/// Callbacks only fire while the transport is open. `on_close` fires at most
/// once and nothing fires after it. A local `close()` does not call `on_close`.
pub trait TransportHandler: Send {
    /// Raw PTY output, byte-for-byte as received.
    fn on_data(&mut self, data: &[u8]);
    /// A non-fatal error reported by the host or the channel.
    fn on_error(&mut self, message: &str);
    /// The transport closed on its own.
    fn on_close(&mut self, reason: CloseReason);
}

/// Options for a session transport.
#[derive(Debug, Clone, Default)]
pub struct SessionOpts {
    /// Command vector for `start_session`. `None` lets the host pick its shell.
    pub command: Option<Vec<String>>,
}

/// One session's connection to its host.
pub struct SessionTransport {
    session_id: String,
    host_id: String,
    url: String,
    opts: SessionOpts,
    state: TransportState,
    last_error: Option<String>,
    channel: Option<Box<dyn FrameChannel>>,
    handler: Box<dyn TransportHandler>,
}

impl SessionTransport {
    pub fn new(
        session_id: impl Into<String>,
        host_id: impl Into<String>,
        url: impl Into<String>,
        opts: SessionOpts,
        handler: Box<dyn TransportHandler>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            host_id: host_id.into(),
            url: url.into(),
            opts,
            state: TransportState::Idle,
            last_error: None,
            channel: None,
            handler,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TransportState::Open
    }

    /// Most recent error seen by this transport, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Open the channel and send the `start_session` handshake.
    ///
    /// Only valid from `Idle`. On failure the transport ends up `Closed` and the
    /// error is a [`RelayError::HandshakeFailure`]; no callbacks fire.
    pub async fn connect(&mut self, connector: &dyn Connector) -> RelayResult<()> {
        if self.state != TransportState::Idle {
            return Err(RelayError::HandshakeFailure(format!(
                "transport for session {} cannot connect from state {:?}",
                self.session_id, self.state
            )));
        }
        self.state = TransportState::Connecting;
        info!(session_id = %self.session_id, host_id = %self.host_id, url = %self.url, "connecting");

        let mut channel = match connector.open(&self.url).await {
            Ok(channel) => channel,
            Err(e) => return Err(self.fail_handshake(e)),
        };

        let hello = ControlMessage::StartSession(StartSessionPayload {
            session_id: self.session_id.clone(),
            command: self.opts.command.clone(),
        });
        let sent = match encode_control(&hello) {
            Ok(frame) => channel.send(frame).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            let _ = channel.close().await;
            return Err(self.fail_handshake(e));
        }

        self.channel = Some(channel);
        self.state = TransportState::Open;
        info!(session_id = %self.session_id, "session open");
        Ok(())
    }

    /// Send raw input bytes. A no-op (with a warning) unless open.
    pub async fn send(&mut self, data: &[u8]) {
        let result = match self.open_channel("send") {
            Some(channel) => channel.send(Frame::Data(data.to_vec())).await,
            None => return,
        };
        if let Err(e) = result {
            self.channel_failed(e).await;
        }
    }

    /// Report new terminal dimensions. A no-op (with a warning) unless open.
    pub async fn resize(&mut self, rows: u16, cols: u16) {
        let msg = ControlMessage::Resize(ResizePayload {
            session_id: self.session_id.clone(),
            rows,
            cols,
        });
        let frame = match encode_control(&msg) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(session_id = %self.session_id, "failed to encode resize: {}", e);
                return;
            }
        };
        let result = match self.open_channel("resize") {
            Some(channel) => channel.send(frame).await,
            None => return,
        };
        if let Err(e) = result {
            self.channel_failed(e).await;
        }
    }

    /// Close the transport. Idempotent; no callbacks fire afterwards.
    pub async fn close(&mut self) {
        if self.state == TransportState::Closed {
            return;
        }
        self.state = TransportState::Closed;
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                debug!(session_id = %self.session_id, "channel close: {}", e);
            }
        }
        info!(session_id = %self.session_id, "transport closed");
    }

    /// Wait for the next inbound frame and dispatch it.
    ///
    /// Returns `false` once the transport is closed; callers stop pumping then.
    pub async fn pump(&mut self) -> bool {
        let next = match (self.state, self.channel.as_mut()) {
            (TransportState::Open, Some(channel)) => channel.recv().await,
            _ => return false,
        };

        match next {
            Some(Ok(frame)) => self.handle_frame(frame).await,
            Some(Err(e)) => self.channel_failed(e).await,
            None => {
                debug!(session_id = %self.session_id, "channel ended");
                self.shutdown(CloseReason::ChannelDropped).await;
            }
        }
        self.is_open()
    }

    /// Dispatch one inbound frame. Ignored unless open.
    pub async fn handle_frame(&mut self, frame: Frame) {
        if !self.is_open() {
            debug!(session_id = %self.session_id, "dropping frame for closed transport");
            return;
        }

        let text = match frame {
            Frame::Data(bytes) => {
                self.handler.on_data(&bytes);
                return;
            }
            Frame::Control(text) => text,
        };

        let msg = match decode_control(&text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(session_id = %self.session_id, "dropping malformed control frame: {}", e);
                return;
            }
        };

        match msg {
            ControlMessage::SessionStarted(_) => {
                debug!(session_id = %self.session_id, "session started on host");
            }
            ControlMessage::SessionEnded(payload) => {
                info!(session_id = %self.session_id, exit_code = ?payload.exit_code, "session ended by host");
                self.shutdown(CloseReason::RemoteTermination {
                    exit_code: payload.exit_code,
                })
                .await;
            }
            ControlMessage::Error(payload) => {
                let message = payload.message().to_string();
                warn!(session_id = %self.session_id, code = ?payload.code, "host error: {}", message);
                self.last_error = Some(message.clone());
                self.handler.on_error(&message);
            }
            ControlMessage::StartSession(_) | ControlMessage::Resize(_) => {
                warn!(session_id = %self.session_id, msg_type = msg.msg_type(), "ignoring client-bound message type from host");
            }
            ControlMessage::Unknown { msg_type, .. } => {
                warn!(session_id = %self.session_id, %msg_type, "ignoring unknown control message type");
            }
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn open_channel(&mut self, op: &str) -> Option<&mut Box<dyn FrameChannel>> {
        if self.state != TransportState::Open {
            warn!(session_id = %self.session_id, state = ?self.state, "cannot {}: not connected", op);
            return None;
        }
        self.channel.as_mut()
    }

    fn fail_handshake(&mut self, cause: RelayError) -> RelayError {
        let reason = match cause {
            RelayError::HandshakeFailure(reason) => reason,
            other => other.to_string(),
        };
        warn!(session_id = %self.session_id, host_id = %self.host_id, "handshake failed: {}", reason);
        self.state = TransportState::Closed;
        self.last_error = Some(reason.clone());
        RelayError::HandshakeFailure(reason)
    }

    /// A post-handshake channel failure: report it, then close.
    async fn channel_failed(&mut self, cause: RelayError) {
        let message = cause.to_string();
        warn!(session_id = %self.session_id, "channel failure: {}", message);
        self.last_error = Some(message.clone());
        self.handler.on_error(&message);
        self.shutdown(CloseReason::ChannelDropped).await;
    }

    /// Close on the transport's own initiative and notify the handler once.
    ///
    /// The handler hears about it before the channel close is awaited, so a
    /// caller dropping this future mid-close cannot swallow the notification.
    async fn shutdown(&mut self, reason: CloseReason) {
        if self.state == TransportState::Closed {
            return;
        }
        self.state = TransportState::Closed;
        let channel = self.channel.take();
        self.handler.on_close(reason);
        if let Some(mut channel) = channel {
            if let Err(e) = channel.close().await {
                debug!(session_id = %self.session_id, "channel close after shutdown: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryChannel, MemoryConnector, MemoryPeer};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Data(Vec<u8>),
        Error(String),
        Close(CloseReason),
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Event>>>);

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.0.lock().unwrap().clone()
        }
    }

    impl TransportHandler for Recorder {
        fn on_data(&mut self, data: &[u8]) {
            self.0.lock().unwrap().push(Event::Data(data.to_vec()));
        }
        fn on_error(&mut self, message: &str) {
            self.0.lock().unwrap().push(Event::Error(message.to_string()));
        }
        fn on_close(&mut self, reason: CloseReason) {
            self.0.lock().unwrap().push(Event::Close(reason));
        }
    }

    fn bash() -> SessionOpts {
        SessionOpts {
            command: Some(vec!["/bin/bash".into()]),
        }
    }

    async fn open_transport() -> (SessionTransport, MemoryPeer, Recorder) {
        let (connector, mut peers) = MemoryConnector::new();
        let recorder = Recorder::default();
        let mut transport = SessionTransport::new(
            "sess-1",
            "h1",
            "ws://localhost:8080/ws/terminal/h1",
            bash(),
            Box::new(recorder.clone()),
        );
        transport.connect(&connector).await.unwrap();
        let peer = peers.recv().await.unwrap();
        (transport, peer, recorder)
    }

    fn json(frame: &Frame) -> serde_json::Value {
        match frame {
            Frame::Control(text) => serde_json::from_str(text).unwrap(),
            Frame::Data(_) => panic!("expected control frame"),
        }
    }

    #[tokio::test]
    async fn handshake_precedes_all_frames() {
        let (mut transport, mut peer, _) = open_transport().await;
        assert_eq!(transport.state(), TransportState::Open);

        transport.send(b"echo hi\r").await;
        transport.resize(24, 80).await;

        let sent = peer.drain_sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(
            json(&sent[0]),
            serde_json::json!({
                "type": "start_session",
                "payload": { "session_id": "sess-1", "command": ["/bin/bash"] }
            })
        );
        assert_eq!(sent[1], Frame::Data(b"echo hi\r".to_vec()));
        assert!(sent[2].is_control());
    }

    #[tokio::test]
    async fn resize_emits_one_control_frame() {
        let (mut transport, mut peer, _) = open_transport().await;
        peer.drain_sent();

        transport.resize(40, 120).await;

        let sent = peer.drain_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            json(&sent[0]),
            serde_json::json!({
                "type": "resize",
                "payload": { "session_id": "sess-1", "rows": 40, "cols": 120 }
            })
        );
    }

    #[tokio::test]
    async fn send_before_open_is_noop() {
        let (connector, _peers) = MemoryConnector::new();
        let recorder = Recorder::default();
        let mut transport = SessionTransport::new("s", "h1", "ws://x", bash(), Box::new(recorder.clone()));

        transport.send(b"lost").await;
        transport.resize(10, 10).await;
        assert_eq!(transport.state(), TransportState::Idle);
        assert!(recorder.events().is_empty());

        // Still connectable afterwards.
        transport.connect(&connector).await.unwrap();
        assert!(transport.is_open());
    }

    #[tokio::test]
    async fn send_after_close_emits_nothing() {
        let (mut transport, mut peer, recorder) = open_transport().await;
        peer.drain_sent();

        transport.close().await;
        transport.send(b"x").await;
        transport.resize(1, 1).await;

        assert!(peer.drain_sent().is_empty());
        assert!(peer.is_closed());
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut transport, _peer, recorder) = open_transport().await;
        transport.close().await;
        transport.close().await;
        assert_eq!(transport.state(), TransportState::Closed);
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn handshake_failure_closes_transport() {
        let (connector, _peers) = MemoryConnector::new();
        connector.fail_next("401 Unauthorized");
        let recorder = Recorder::default();
        let mut transport = SessionTransport::new("s", "h1", "ws://x", bash(), Box::new(recorder.clone()));

        let err = transport.connect(&connector).await.unwrap_err();
        assert!(matches!(err, RelayError::HandshakeFailure(ref r) if r == "401 Unauthorized"));
        assert_eq!(transport.state(), TransportState::Closed);
        assert_eq!(transport.last_error(), Some("401 Unauthorized"));
        assert!(recorder.events().is_empty());

        // Closed is terminal.
        assert!(transport.connect(&connector).await.is_err());
    }

    #[tokio::test]
    async fn binary_frames_pass_through_unmodified() {
        let (mut transport, peer, recorder) = open_transport().await;
        let payload = vec![0x00, 0x1b, b'[', 0xff, 0xfe, 0xc3, 0x28, 0x00];

        peer.push(Frame::Data(payload.clone()));
        assert!(transport.pump().await);

        assert_eq!(recorder.events(), vec![Event::Data(payload)]);
    }

    #[tokio::test]
    async fn session_ended_closes_once_and_silences_later_frames() {
        let (mut transport, peer, recorder) = open_transport().await;

        peer.push_text(r#"{"type":"session_ended","payload":{"session_id":"sess-1","exit_code":0}}"#);
        peer.push(Frame::Data(b"late".to_vec()));
        peer.push_text(r#"{"type":"error","payload":{"message":"late"}}"#);

        assert!(!transport.pump().await);
        assert!(!transport.pump().await);
        transport.handle_frame(Frame::Data(b"later".to_vec())).await;

        assert_eq!(
            recorder.events(),
            vec![Event::Close(CloseReason::RemoteTermination { exit_code: Some(0) })]
        );
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn error_frame_reports_message() {
        let (mut transport, peer, recorder) = open_transport().await;

        peer.push_text(r#"{"type":"error","payload":{"message":"runner not found"}}"#);
        peer.push_text(r#"{"type":"error"}"#);
        assert!(transport.pump().await);
        assert!(transport.pump().await);

        assert_eq!(
            recorder.events(),
            vec![
                Event::Error("runner not found".into()),
                Event::Error("Unknown error".into()),
            ]
        );
        assert!(transport.is_open());
    }

    #[tokio::test]
    async fn unknown_and_malformed_control_frames_are_dropped() {
        let (mut transport, peer, recorder) = open_transport().await;

        peer.push_text(r#"{"type":"metrics","payload":{"cpu":1}}"#);
        peer.push_text("{not json");
        peer.push_text(r#"{"type":"session_started","payload":{"session_id":"sess-1"}}"#);
        for _ in 0..3 {
            assert!(transport.pump().await);
        }

        assert!(recorder.events().is_empty());
        assert!(transport.is_open());
    }

    #[tokio::test]
    async fn read_error_reports_then_closes() {
        let (mut transport, peer, recorder) = open_transport().await;

        peer.push_error("connection reset");
        assert!(!transport.pump().await);

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::Error(ref m) if m.contains("connection reset")));
        assert_eq!(events[1], Event::Close(CloseReason::ChannelDropped));
    }

    #[tokio::test]
    async fn peer_hang_up_closes() {
        let (mut transport, mut peer, recorder) = open_transport().await;
        peer.hang_up();

        assert!(!transport.pump().await);
        assert_eq!(recorder.events(), vec![Event::Close(CloseReason::ChannelDropped)]);
    }

    #[tokio::test]
    async fn close_callback_fires_even_if_pump_is_cancelled_mid_close() {
        let (mut transport, mut peer, recorder) = open_transport().await;
        peer.stall_close();
        peer.hang_up();

        let pumped = tokio::time::timeout(std::time::Duration::from_millis(50), transport.pump()).await;
        assert!(pumped.is_err(), "close should still be pending");

        assert_eq!(recorder.events(), vec![Event::Close(CloseReason::ChannelDropped)]);
        assert_eq!(transport.state(), TransportState::Closed);
        assert!(!transport.pump().await);
        assert_eq!(recorder.events().len(), 1);
    }

    #[tokio::test]
    async fn handshake_without_command_omits_it() {
        let (channel, mut peer) = MemoryChannel::pair("ws://x");
        let connector = SingleUse(Mutex::new(Some(channel)));
        let mut transport = SessionTransport::new(
            "s",
            "h1",
            "ws://x",
            SessionOpts::default(),
            Box::new(Recorder::default()),
        );
        transport.connect(&connector).await.unwrap();

        let sent = peer.drain_sent();
        assert_eq!(
            json(&sent[0]),
            serde_json::json!({ "type": "start_session", "payload": { "session_id": "s" } })
        );
    }

    struct SingleUse(Mutex<Option<MemoryChannel>>);

    impl Connector for SingleUse {
        fn open<'a>(
            &'a self,
            _url: &'a str,
        ) -> relay_core::transport::BoxFuture<'a, RelayResult<Box<dyn FrameChannel>>> {
            Box::pin(async move {
                let channel = self
                    .0
                    .lock()
                    .unwrap()
                    .take()
                    .ok_or_else(|| RelayError::HandshakeFailure("already used".into()))?;
                Ok(Box::new(channel) as Box<dyn FrameChannel>)
            })
        }
    }
}
