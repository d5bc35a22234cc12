//! Channel implementations and terminal URL derivation.
//!
//! The terminal endpoint for a host lives at `/ws/terminal/<host_id>` on the
//! same authority as the origin. The WebSocket scheme follows the origin:
//! - `https://` or `wss://` → `wss://`
//! - `http://` or `ws://` → `ws://`

pub mod memory;
pub mod websocket;

pub use memory::{MemoryChannel, MemoryConnector, MemoryPeer};
pub use websocket::{ConnectConfig, WebSocketChannel, WebSocketConnector};

use relay_core::error::{RelayError, RelayResult};

/// Path prefix of the host terminal endpoint.
pub const TERMINAL_PATH: &str = "/ws/terminal/";

/// Map an origin scheme to the matching WebSocket scheme.
///
/// A secure origin always maps to `wss`; there is no downgrade path.
pub fn websocket_scheme(origin_scheme: &str) -> RelayResult<&'static str> {
    match origin_scheme.to_ascii_lowercase().as_str() {
        "https" | "wss" => Ok("wss"),
        "http" | "ws" => Ok("ws"),
        other => Err(RelayError::InvalidUrl(format!(
            "unsupported origin scheme: {other} (expected http, https, ws, or wss)"
        ))),
    }
}

/// Derive the terminal WebSocket URL for `host_id` from `origin`.
pub fn terminal_url(origin: &str, host_id: &str) -> RelayResult<String> {
    let (scheme, rest) = origin
        .split_once("://")
        .ok_or_else(|| RelayError::InvalidUrl(format!("origin has no scheme: {origin}")))?;
    let ws_scheme = websocket_scheme(scheme)?;

    // Strip path, query and fragment
    let authority = rest
        .split(|c| matches!(c, '/' | '?' | '#'))
        .next()
        .unwrap_or_default();
    if authority.is_empty() {
        return Err(RelayError::InvalidUrl(format!("origin has no host: {origin}")));
    }

    if host_id.is_empty() {
        return Err(RelayError::InvalidUrl("empty host id".into()));
    }

    Ok(format!(
        "{ws_scheme}://{authority}{TERMINAL_PATH}{}",
        encode_path_segment(host_id)
    ))
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_origin_uses_wss() {
        assert_eq!(
            terminal_url("https://relay.example.com", "h1").unwrap(),
            "wss://relay.example.com/ws/terminal/h1"
        );
        assert_eq!(
            terminal_url("wss://relay.example.com:8443/", "h1").unwrap(),
            "wss://relay.example.com:8443/ws/terminal/h1"
        );
    }

    #[test]
    fn plain_origin_uses_ws() {
        assert_eq!(
            terminal_url("http://localhost:8080", "runner-1").unwrap(),
            "ws://localhost:8080/ws/terminal/runner-1"
        );
    }

    #[test]
    fn origin_path_is_discarded() {
        assert_eq!(
            terminal_url("HTTPS://relay.example.com/terminal?tab=2", "h1").unwrap(),
            "wss://relay.example.com/ws/terminal/h1"
        );
    }

    #[test]
    fn host_id_is_percent_encoded() {
        assert_eq!(
            terminal_url("http://localhost:8080", "lab box/2").unwrap(),
            "ws://localhost:8080/ws/terminal/lab%20box%2F2"
        );
    }

    #[test]
    fn rejects_bad_origins() {
        assert!(terminal_url("ftp://example.com", "h1").is_err());
        assert!(terminal_url("example.com", "h1").is_err());
        assert!(terminal_url("https://", "h1").is_err());
        assert!(terminal_url("https://example.com", "").is_err());
    }
}
