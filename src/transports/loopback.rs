//! In-process loopback transport.
//!
//! [`loopback_pair`] returns a client half implementing [`Transport`] and a
//! [`LoopbackServer`] half that reads what the client sent and injects frames
//! as if they came from the room authority. Used for local demos and tests
//! where no hub is running.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::RoomError;
use crate::transport::Transport;

/// Client half of an in-process loopback.
#[derive(Debug)]
pub struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
    closed: bool,
}

/// Authority half of an in-process loopback.
///
/// Dropping it (or its `tx`) ends the client's receive stream, which the
/// messaging channel reports as a clean disconnect.
#[derive(Debug)]
pub struct LoopbackServer {
    /// Frames sent by the client.
    pub rx: mpsc::UnboundedReceiver<String>,
    /// Frames delivered to the client.
    pub tx: mpsc::UnboundedSender<String>,
}

impl LoopbackServer {
    /// Serialize `message` and deliver it to the client.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::TransportClosed`] if the client half is gone.
    pub fn send<T: Serialize>(&self, message: &T) -> Result<(), RoomError> {
        let json = serde_json::to_string(message)?;
        self.tx.send(json).map_err(|_| RoomError::TransportClosed)
    }
}

/// Create a connected `(transport, server)` pair.
pub fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();

    let transport = LoopbackTransport {
        tx: client_tx,
        rx: client_rx,
        closed: false,
    };
    let server = LoopbackServer {
        rx: server_rx,
        tx: server_tx,
    };
    (transport, server)
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), RoomError> {
        if self.closed {
            return Err(RoomError::TransportClosed);
        }
        self.tx
            .send(message)
            .map_err(|e| RoomError::TransportSend(e.to_string()))
    }

    /// Cancel-safe: `UnboundedReceiver::recv` never loses a message on drop.
    async fn recv(&mut self) -> Option<Result<String, RoomError>> {
        if self.closed {
            return None;
        }
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), RoomError> {
        self.closed = true;
        self.rx.close();
        Ok(())
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

    #[tokio::test]
    async fn frames_cross_in_both_directions() {
        let (mut transport, mut server) = loopback_pair();
        transport.send("up".into()).await.unwrap();
        assert_eq!(server.rx.recv().await.unwrap(), "up");

        server.tx.send("down".into()).unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "down");
    }

    #[tokio::test]
    async fn dropping_server_ends_stream() {
        let (mut transport, server) = loopback_pair();
        drop(server);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (mut transport, _server) = loopback_pair();
        transport.close().await.unwrap();
        let err = transport.send("late".into()).await.unwrap_err();
        assert!(matches!(err, RoomError::TransportClosed));
    }
}
