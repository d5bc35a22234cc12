use thiserror::Error;

/// Errors produced by the relay protocol layer.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The channel never reached the open state.
    #[error("handshake failed: {0}")]
    HandshakeFailure(String),

    /// A non-fatal protocol or transport error reported mid-session.
    #[error("channel error: {0}")]
    Channel(String),

    /// A registry operation referenced a session id that does not exist.
    #[error("invalid session reference: {0}")]
    InvalidReference(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Codec(e.to_string())
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
