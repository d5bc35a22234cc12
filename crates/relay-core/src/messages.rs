//! Control message types for the relay terminal protocol.
//!
//! Every control frame is a JSON text frame shaped `{ "type": ..., "payload": ... }`.
//! The set of types is closed, but decoding keeps an explicit `Unknown` arm so a
//! newer host can add types without breaking older clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayResult;

/// Message used when a host `error` frame carries no usable message.
pub const DEFAULT_ERROR_MESSAGE: &str = "Unknown error";

/// String tags for the `type` field.
pub mod msg_type {
    pub const START_SESSION: &str = "start_session";
    pub const RESIZE: &str = "resize";
    pub const ERROR: &str = "error";
    pub const SESSION_STARTED: &str = "session_started";
    pub const SESSION_ENDED: &str = "session_ended";
}

/// Wire envelope shared by every control frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

/// Client → host: bind this connection to a session and start its process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSessionPayload {
    pub session_id: String,
    /// Command vector; omitted on the wire so the host picks its default shell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

/// Client → host: the rendering surface changed size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizePayload {
    pub session_id: String,
    pub rows: u16,
    pub cols: u16,
}

/// Host → client: something went wrong on the host side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default, deserialize_with = "lenient_field")]
    pub message: Option<String>,
    /// Host error code. Numeric codes are kept as their decimal text.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "code_field")]
    pub code: Option<String>,
}

impl ErrorPayload {
    /// The host-supplied message, or [`DEFAULT_ERROR_MESSAGE`].
    pub fn message(&self) -> &str {
        match self.message.as_deref() {
            Some(m) if !m.is_empty() => m,
            _ => DEFAULT_ERROR_MESSAGE,
        }
    }
}

/// Host → client: the session's process is running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_field")]
    pub session_id: Option<String>,
}

/// Host → client: the session's process exited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEndedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_field")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_field")]
    pub exit_code: Option<i32>,
}

/// A decoded control message.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    StartSession(StartSessionPayload),
    Resize(ResizePayload),
    Error(ErrorPayload),
    SessionStarted(SessionStartedPayload),
    SessionEnded(SessionEndedPayload),
    /// A `type` this client does not know. Kept so callers can log it.
    Unknown { msg_type: String, payload: Value },
}

impl ControlMessage {
    /// The wire `type` tag for this message.
    pub fn msg_type(&self) -> &str {
        match self {
            Self::StartSession(_) => msg_type::START_SESSION,
            Self::Resize(_) => msg_type::RESIZE,
            Self::Error(_) => msg_type::ERROR,
            Self::SessionStarted(_) => msg_type::SESSION_STARTED,
            Self::SessionEnded(_) => msg_type::SESSION_ENDED,
            Self::Unknown { msg_type: kind, .. } => kind,
        }
    }

    /// Build the wire envelope for this message.
    pub fn to_envelope(&self) -> RelayResult<Envelope> {
        let payload = match self {
            Self::StartSession(p) => serde_json::to_value(p)?,
            Self::Resize(p) => serde_json::to_value(p)?,
            Self::Error(p) => serde_json::to_value(p)?,
            Self::SessionStarted(p) => serde_json::to_value(p)?,
            Self::SessionEnded(p) => serde_json::to_value(p)?,
            Self::Unknown { payload, .. } => payload.clone(),
        };
        Ok(Envelope {
            msg_type: self.msg_type().to_string(),
            payload,
        })
    }

    /// Interpret an envelope.
    ///
    /// Client-originated types must carry a well-formed payload. Host-originated
    /// types are decoded leniently: a missing or oddly shaped payload falls back
    /// to defaults rather than failing the frame.
    pub fn from_envelope(envelope: Envelope) -> RelayResult<Self> {
        let Envelope {
            msg_type: kind,
            payload,
        } = envelope;
        let msg = match kind.as_str() {
            msg_type::START_SESSION => Self::StartSession(serde_json::from_value(payload)?),
            msg_type::RESIZE => Self::Resize(serde_json::from_value(payload)?),
            msg_type::ERROR => Self::Error(lenient(payload)),
            msg_type::SESSION_STARTED => Self::SessionStarted(lenient(payload)),
            msg_type::SESSION_ENDED => Self::SessionEnded(lenient(payload)),
            _ => Self::Unknown {
                msg_type: kind,
                payload,
            },
        };
        Ok(msg)
    }
}

fn lenient<T: serde::de::DeserializeOwned + Default>(payload: Value) -> T {
    serde_json::from_value(payload).unwrap_or_default()
}

/// A host field of the wrong shape reads as absent instead of spoiling its siblings.
fn lenient_field<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn code_field<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
