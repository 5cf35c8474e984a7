//! Transport implementations for the room messaging channel.
//!
//! | Feature                | Transport                                     |
//! |------------------------|-----------------------------------------------|
//! | (always)               | [`LoopbackTransport`]                         |
//! | `transport-websocket`  | [`WebSocketTransport`], [`WebSocketConnector`] |
//!
//! # Example
//!
//! ```rust,ignore
//! use planning_poker_client::{ChannelConfig, SharedChannel, WebSocketConnector};
//!
//! let shared = SharedChannel::new(
//!     WebSocketConnector::new("ws://localhost:5000/hub"),
//!     ChannelConfig::new(),
//! );
//! let channel = shared.connect().await?;
//! ```

pub mod loopback;

#[cfg(feature = "transport-websocket")]
pub mod websocket;

pub use loopback::{loopback_pair, LoopbackServer, LoopbackTransport};

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
