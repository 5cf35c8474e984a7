//! WebSocket transport for the room hub, built on `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries one JSON document per text frame. Both
//! `ws://` and `wss://` URLs are accepted. [`WebSocketConnector`] plugs it into
//! [`SharedChannel`](crate::channel::SharedChannel) so the connection is opened
//! lazily on first use.
//!
//! Only available with the `transport-websocket` feature (on by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), planning_poker_client::RoomError> {
//! use planning_poker_client::{ChannelConfig, SharedChannel, WebSocketConnector};
//!
//! let shared = SharedChannel::new(
//!     WebSocketConnector::new("ws://localhost:5000/hub"),
//!     ChannelConfig::new(),
//! );
//! let channel = shared.connect().await?;
//! assert!(channel.is_connected());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::channel::Connector;
use crate::error::RoomError;
use crate::transport::Transport;

/// Default time allowed for the WebSocket handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The underlying WebSocket stream type.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] over one WebSocket connection to the room hub.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) only awaits `StreamExt::next`, which does not
/// consume a frame when the future is dropped.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a connection to the hub at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Connection`] if the URL is invalid or the handshake
    /// fails.
    pub async fn connect(url: &str) -> Result<Self, RoomError> {
        debug!(url = %url, "connecting to room hub");

        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| RoomError::Connection(format!("{url}: {e}")))?;

        info!(url = %url, "room hub connection established");
        Ok(Self::from_stream(stream))
    }

    /// Like [`connect`](Self::connect), failing with [`RoomError::Timeout`] if
    /// the handshake does not finish within `timeout`.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, RoomError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| RoomError::Timeout)?
    }

    /// Wrap an already-established stream (custom TLS, headers, proxies).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), RoomError> {
        if self.closed {
            return Err(RoomError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| RoomError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, RoomError>> {
        loop {
            let frame = match self.stream.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Some(Err(RoomError::TransportReceive(e.to_string()))),
                None => return None,
            };

            match frame {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(close) => {
                    debug!(?close, "hub sent close frame");
                    return None;
                }
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => warn!("skipping binary frame from hub"),
                Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), RoomError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| RoomError::TransportSend(e.to_string()))
    }
}

// ── Connector ───────────────────────────────────────────────────────

/// Opens [`WebSocketTransport`]s to a fixed hub URL on demand.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the handshake timeout. Defaults to **10 seconds**.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Output = WebSocketTransport;

    async fn connect(&self) -> Result<WebSocketTransport, RoomError> {
        WebSocketTransport::connect_with_timeout(&self.url, self.connect_timeout).await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accept one WebSocket connection on a local port and run `handler` on it.
    async fn start_mock_hub<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[test]
    fn transport_is_send_and_debug() {
        fn assert_bounds<T: Send + std::fmt::Debug>() {}
        assert_bounds::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn invalid_url_is_a_connection_error() {
        let err = WebSocketTransport::connect("not a url").await.unwrap_err();
        assert!(matches!(err, RoomError::Connection(_)));
    }

    #[tokio::test]
    async fn unreachable_hub_is_a_connection_error() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::Connection(_)));
    }

    #[tokio::test]
    async fn text_frames_are_delivered_and_binary_skipped() {
        let url = start_mock_hub(|mut ws| async move {
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"error"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"{"type":"error"}"#
        );
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_sends() {
        let url =
            start_mock_hub(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        let err = transport.send("late".into()).await.unwrap_err();
        assert!(matches!(err, RoomError::TransportClosed));
    }

    #[tokio::test]
    async fn connector_echo_round_trip() {
        let url = start_mock_hub(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let connector = WebSocketConnector::new(url).with_connect_timeout(Duration::from_secs(2));
        let mut transport = connector.connect().await.unwrap();
        transport.send("echo".into()).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "echo");
    }

    #[tokio::test]
    async fn connector_times_out_on_blackholed_address() {
        let connector = WebSocketConnector::new("ws://192.0.2.1:1")
            .with_connect_timeout(Duration::from_millis(50));
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, RoomError::Timeout | RoomError::Connection(_)));
    }
}
