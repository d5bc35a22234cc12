//! Frame codec for the relay terminal channel.
//!
//! The channel's native framing tells the two message kinds apart:
//! - binary frame → raw PTY bytes, no envelope
//! - text frame → JSON control message `{ "type": ..., "payload": ... }`

use crate::error::RelayResult;
use crate::messages::{ControlMessage, Envelope};

/// One frame on the duplex channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Raw terminal bytes, passed through uninterpreted.
    Data(Vec<u8>),
    /// A JSON control message.
    Control(String),
}

impl Frame {
    pub fn is_control(&self) -> bool {
        matches!(self, Frame::Control(_))
    }
}

/// Encode a control message into a text frame.
pub fn encode_control(msg: &ControlMessage) -> RelayResult<Frame> {
    let envelope = msg.to_envelope()?;
    Ok(Frame::Control(serde_json::to_string(&envelope)?))
}

/// Decode the text of a control frame.
pub fn decode_control(text: &str) -> RelayResult<ControlMessage> {
    let envelope: Envelope = serde_json::from_str(text)?;
    ControlMessage::from_envelope(envelope)
}
