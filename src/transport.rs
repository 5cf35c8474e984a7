//! Transport abstraction for the room messaging channel.
//!
//! The [`Transport`] trait defines a bidirectional text message channel between
//! the client and the room authority. Every frame is one JSON document, so
//! transport implementations must handle message framing internally
//! (WebSocket frames, server-sent events plus POST, in-process channels).
//!
//! # Connection Setup
//!
//! Connection setup is not part of this trait; see
//! [`Connector`](crate::channel::Connector) for the lazily-invoked factory used
//! by [`SharedChannel`](crate::channel::SharedChannel).
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use planning_poker_client::error::RoomError;
//! use planning_poker_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), RoomError> {
//!         // Send the JSON text frame to the authority
//!         unimplemented!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, RoomError>> {
//!         // Return None when the connection is closed cleanly
//!         unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), RoomError> {
//!         unimplemented!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::RoomError;

/// A bidirectional text message transport to the room authority.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON message.
/// Each call to [`recv`](Transport::recv) returns one complete JSON message.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is used
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling it
/// again must not lose data. Channel-based implementations (e.g., wrapping
/// `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the authority.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::TransportSend`] if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), RoomError>;

    /// Receive the next JSON text message from the authority.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly
    async fn recv(&mut self) -> Option<Result<String, RoomError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), RoomError>;
}
