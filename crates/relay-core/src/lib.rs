//! relay-core: Shared protocol library for relay terminal sessions.
//!
//! Provides the JSON control message types, the binary/text frame codec,
//! and the abstract channel traits that session transports are built on.

pub mod codec;
pub mod error;
pub mod messages;
pub mod transport;

// Re-export commonly used items at crate root.
pub use codec::{decode_control, encode_control, Frame};
pub use error::{RelayError, RelayResult};
pub use messages::{ControlMessage, ErrorPayload, ResizePayload, SessionEndedPayload, StartSessionPayload};
pub use transport::{BoxFuture, Connector, FrameChannel};
