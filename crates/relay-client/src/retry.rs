//! Retry around transport creation.
//!
//! The transport's `Closed` state is terminal, so retrying means building a
//! fresh transport for the same session id and connecting it again. Backoff
//! doubles per attempt and is capped. The default policy makes one attempt.

use std::time::Duration;

use tokio::time;
use tracing::{info, warn};

use relay_core::error::{RelayError, RelayResult};
use relay_core::transport::Connector;

use crate::session::SessionTransport;

/// How often and how patiently to retry a failed handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connection attempts, including the first. 0 is treated as 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-indexed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Build and connect transports until one opens or the policy gives up.
///
/// `make` is called once per attempt and must return a fresh `Idle` transport.
pub async fn connect_with_retry<F>(
    policy: &RetryPolicy,
    connector: &dyn Connector,
    mut make: F,
) -> RelayResult<SessionTransport>
where
    F: FnMut() -> SessionTransport,
{
    let attempts = policy.attempts();
    let mut last_err = RelayError::HandshakeFailure("no connection attempt made".into());

    for attempt in 1..=attempts {
        let mut transport = make();
        match transport.connect(connector).await {
            Ok(()) => {
                if attempt > 1 {
                    info!(session_id = %transport.session_id(), host_id = %transport.host_id(), attempt, "connected after retry");
                }
                return Ok(transport);
            }
            Err(e) => {
                if attempt < attempts {
                    let delay = policy.backoff(attempt);
                    warn!(
                        session_id = %transport.session_id(),
                        host_id = %transport.host_id(),
                        attempt,
                        of = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "connect failed, retrying: {}",
                        e
                    );
                    time::sleep(delay).await;
                }
                last_err = e;
            }
        }
    }

    Err(last_err)
}
