//! Host records supplied by the discovery collaborator.
//!
//! The client never checks reachability itself; an unreachable host shows up
//! as a handshake failure when a session connects to it.

use serde::{Deserialize, Serialize};

/// Reachability as last reported by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Online,
    Offline,
}

/// A host sessions can be opened against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: String,
    pub status: HostStatus,
}

impl Host {
    pub fn is_online(&self) -> bool {
        self.status == HostStatus::Online
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_discovery_entry() {
        let host: Host = serde_json::from_str(r#"{"id":"runner-7","status":"offline"}"#).unwrap();
        assert_eq!(host.id, "runner-7");
        assert!(!host.is_online());
    }
}
