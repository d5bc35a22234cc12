//! WebSocket channel for relay terminal sessions.
//!
//! One WebSocket per session. Binary messages carry raw PTY bytes, text
//! messages carry JSON control frames. Pings are answered inline.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use relay_core::codec::Frame;
use relay_core::error::{RelayError, RelayResult};
use relay_core::transport::{BoxFuture, Connector, FrameChannel};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Settings for opening WebSocket channels.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Bearer token sent on the upgrade request.
    pub token: Option<String>,
    /// Upgrade timeout in seconds (0 = wait indefinitely).
    pub timeout_secs: u64,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            token: None,
            timeout_secs: 10,
        }
    }
}

/// A single WebSocket connection speaking the relay framing.
pub struct WebSocketChannel {
    ws: WsStream,
    closed: bool,
}

impl WebSocketChannel {
    /// Open a WebSocket to `url`.
    pub async fn connect(url: &str, config: &ConnectConfig) -> RelayResult<Self> {
        let mut request = url
            .into_client_request()
            .map_err(|e| RelayError::InvalidUrl(format!("{url}: {e}")))?;

        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| RelayError::HandshakeFailure(format!("invalid bearer token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let upgrade = connect_async(request);
        let result = if config.timeout_secs > 0 {
            time::timeout(Duration::from_secs(config.timeout_secs), upgrade)
                .await
                .map_err(|_| RelayError::Timeout)?
        } else {
            upgrade.await
        };

        let (ws, response) = result
            .map_err(|e| RelayError::HandshakeFailure(format!("WebSocket connect error: {e}")))?;

        tracing::info!(url, status = %response.status(), "WebSocket connected");

        Ok(Self { ws, closed: false })
    }
}

impl FrameChannel for WebSocketChannel {
    fn send(&mut self, frame: Frame) -> BoxFuture<'_, RelayResult<()>> {
        Box::pin(async move {
            let msg = match frame {
                Frame::Data(bytes) => Message::Binary(bytes),
                Frame::Control(text) => Message::Text(text),
            };
            self.ws
                .send(msg)
                .await
                .map_err(|e| RelayError::Channel(format!("WebSocket write error: {e}")))
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, Option<RelayResult<Frame>>> {
        Box::pin(async move {
            loop {
                match self.ws.next().await? {
                    Ok(Message::Binary(data)) => return Some(Ok(Frame::Data(data))),
                    Ok(Message::Text(text)) => return Some(Ok(Frame::Control(text))),
                    Ok(Message::Ping(payload)) => {
                        if let Err(e) = self.ws.send(Message::Pong(payload)).await {
                            tracing::debug!("failed to answer ping: {}", e);
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "WebSocket close frame received");
                        return None;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::error!("WebSocket read error: {}", e);
                        return Some(Err(RelayError::Channel(format!("WebSocket read error: {e}"))));
                    }
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, RelayResult<()>> {
        Box::pin(async move {
            if self.closed {
                return Ok(());
            }
            self.closed = true;
            self.ws
                .close(None)
                .await
                .map_err(|e| RelayError::Channel(format!("WebSocket close error: {e}")))
        })
    }
}

/// Opens [`WebSocketChannel`]s with a shared [`ConnectConfig`].
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: ConnectConfig,
}

impl WebSocketConnector {
    pub fn new(config: ConnectConfig) -> Self {
        // Only the ring provider is compiled in; installing it is a no-op when
        // something else already did.
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self { config }
    }
}

impl Connector for WebSocketConnector {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, RelayResult<Box<dyn FrameChannel>>> {
        Box::pin(async move {
            let channel = WebSocketChannel::connect(url, &self.config).await?;
            Ok(Box::new(channel) as Box<dyn FrameChannel>)
        })
    }
}
