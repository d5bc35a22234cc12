//! relay-client: client library for relay terminal sessions.
//!
//! A relay host exposes interactive shells over a WebSocket channel. This crate
//! provides the per-session [`SessionTransport`], the [`SessionRegistry`] that
//! tracks open tabs and focus, and the [`SessionOrchestrator`] that keeps one
//! live transport per tab and routes input, resizes, and output.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use relay_client::{
//!     ConnectConfig, OrchestratorConfig, SessionEventKind, SessionOrchestrator, WebSocketConnector,
//! };
//!
//! # async fn example() -> relay_core::RelayResult<()> {
//! let connector = Arc::new(WebSocketConnector::new(ConnectConfig::default()));
//! let mut orchestrator = SessionOrchestrator::new(connector, OrchestratorConfig::default());
//!
//! orchestrator.open_session("build-box", None)?;
//! orchestrator.send_input(b"echo hello\n");
//!
//! while let Some(event) = orchestrator.next_event().await {
//!     if let SessionEventKind::Output(bytes) = event.kind {
//!         print!("{}", String::from_utf8_lossy(&bytes));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod hosts;
pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod scrollback;
pub mod session;
pub mod transport;

// Re-export primary public types.
pub use hosts::{Host, HostStatus};
pub use orchestrator::{
    OrchestratorConfig, SessionEvent, SessionEventKind, SessionOrchestrator, SessionStatus,
};
pub use registry::{SessionRecord, SessionRegistry};
pub use retry::{connect_with_retry, RetryPolicy};
pub use scrollback::Scrollback;
pub use session::{CloseReason, SessionOpts, SessionTransport, TransportHandler, TransportState};
pub use transport::{terminal_url, ConnectConfig, MemoryChannel, MemoryConnector, MemoryPeer, WebSocketChannel, WebSocketConnector};

// Re-export relay-core error types for convenience.
pub use relay_core::{RelayError, RelayResult};
