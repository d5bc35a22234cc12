//! In-memory channel for tests and local wiring.
//!
//! `MemoryChannel` is the client half; `MemoryPeer` plays the host: it sees
//! every frame the client sends and can inject frames, read errors, or hang up.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use relay_core::codec::Frame;
use relay_core::error::{RelayError, RelayResult};
use relay_core::transport::{BoxFuture, Connector, FrameChannel};

/// Client side of an in-memory channel.
pub struct MemoryChannel {
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: mpsc::UnboundedReceiver<RelayResult<Frame>>,
    closed: Arc<AtomicBool>,
    stall_close: Arc<AtomicBool>,
}

/// Host side of an in-memory channel.
pub struct MemoryPeer {
    url: String,
    sent: mpsc::UnboundedReceiver<Frame>,
    inject: Option<mpsc::UnboundedSender<RelayResult<Frame>>>,
    closed: Arc<AtomicBool>,
    stall_close: Arc<AtomicBool>,
}

impl MemoryChannel {
    /// Create a connected channel/peer pair.
    pub fn pair(url: impl Into<String>) -> (MemoryChannel, MemoryPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let stall_close = Arc::new(AtomicBool::new(false));

        let channel = MemoryChannel {
            outbound: out_tx,
            inbound: in_rx,
            closed: closed.clone(),
            stall_close: stall_close.clone(),
        };
        let peer = MemoryPeer {
            url: url.into(),
            sent: out_rx,
            inject: Some(in_tx),
            closed,
            stall_close,
        };
        (channel, peer)
    }
}

impl FrameChannel for MemoryChannel {
    fn send(&mut self, frame: Frame) -> BoxFuture<'_, RelayResult<()>> {
        Box::pin(async move {
            if self.closed.load(Ordering::SeqCst) {
                return Err(RelayError::Channel("memory channel closed".into()));
            }
            self.outbound
                .send(frame)
                .map_err(|_| RelayError::Channel("memory peer dropped".into()))
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, Option<RelayResult<Frame>>> {
        Box::pin(async move { self.inbound.recv().await })
    }

    fn close(&mut self) -> BoxFuture<'_, RelayResult<()>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            self.inbound.close();
            if self.stall_close.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            Ok(())
        })
    }
}

impl MemoryPeer {
    /// URL the client opened.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver a frame to the client.
    pub fn push(&self, frame: Frame) {
        if let Some(tx) = &self.inject {
            let _ = tx.send(Ok(frame));
        }
    }

    /// Deliver a control frame with the given JSON text.
    pub fn push_text(&self, text: &str) {
        self.push(Frame::Control(text.to_string()));
    }

    /// Make the client's next read fail.
    pub fn push_error(&self, message: &str) {
        if let Some(tx) = &self.inject {
            let _ = tx.send(Err(RelayError::Channel(message.to_string())));
        }
    }

    /// Make the client's `close` hang forever, like a peer that never
    /// acknowledges the close handshake.
    pub fn stall_close(&self) {
        self.stall_close.store(true, Ordering::SeqCst);
    }

    /// Drop the inbound side: the client sees end-of-stream after draining.
    pub fn hang_up(&mut self) {
        self.inject = None;
    }

    /// Next frame sent by the client. `None` once the client side is gone.
    pub async fn next_sent(&mut self) -> Option<Frame> {
        self.sent.recv().await
    }

    /// Every frame the client has sent so far, without waiting.
    pub fn drain_sent(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Whether the client closed its side.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Connector handing out [`MemoryChannel`]s.
///
/// Each successful `open` publishes the matching [`MemoryPeer`] on the
/// receiver returned by [`MemoryConnector::new`].
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    failures: Mutex<VecDeque<String>>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers: tx,
            failures: Mutex::new(VecDeque::new()),
        };
        (connector, rx)
    }

    /// Make the next `open` fail with `reason`. Failures queue up.
    pub fn fail_next(&self, reason: impl Into<String>) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(reason.into());
        }
    }
}

impl Connector for MemoryConnector {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, RelayResult<Box<dyn FrameChannel>>> {
        Box::pin(async move {
            let failure = self.failures.lock().ok().and_then(|mut f| f.pop_front());
            if let Some(reason) = failure {
                return Err(RelayError::HandshakeFailure(reason));
            }

            let (channel, peer) = MemoryChannel::pair(url);
            self.peers
                .send(peer)
                .map_err(|_| RelayError::HandshakeFailure("no listener for memory peers".into()))?;
            Ok(Box::new(channel) as Box<dyn FrameChannel>)
        })
    }
}
