//! Abstract channel traits for relay sessions.
//!
//! A session transport talks to exactly one duplex channel. Concrete channels
//! (WebSocket, in-memory) implement these traits with boxed futures so they can
//! be held as trait objects.

use crate::codec::Frame;
use crate::error::RelayResult;
use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future returned by channel operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A duplex channel carrying binary data frames and text control frames.
pub trait FrameChannel: Send {
    /// Send one frame. Frames are delivered in call order.
    fn send(&mut self, frame: Frame) -> BoxFuture<'_, RelayResult<()>>;

    /// Receive the next frame.
    ///
    /// `None` means the peer closed the channel. `Some(Err(_))` is a read
    /// failure; the channel should be treated as dead afterwards.
    fn recv(&mut self) -> BoxFuture<'_, Option<RelayResult<Frame>>>;

    /// Close the channel. Calling this more than once is harmless.
    fn close(&mut self) -> BoxFuture<'_, RelayResult<()>>;
}

/// Opens channels to a URL.
pub trait Connector: Send + Sync {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, RelayResult<Box<dyn FrameChannel>>>;
}
