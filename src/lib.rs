//! # Planning Poker Client
//!
//! Transport-agnostic room synchronization client for real-time planning poker.
//!
//! A room authority (hub) owns the truth about each room. This crate keeps a
//! locally consistent view of one room by reacting to the events the hub pushes,
//! and issues room commands with optimistic local updates where that is safe.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] for any text-frame backend
//! - **Shared channel**: one lazily connected [`SharedChannel`] serves every room client
//! - **Explicit subscriptions**: handlers are [`Subscription`] handles, disposed as a group
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   `WebSocketTransport` and `WebSocketConnector`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), planning_poker_client::RoomError> {
//! use std::sync::Arc;
//! use planning_poker_client::{
//!     ChannelConfig, MemoryIdentityStore, RoomSignal, RoomSyncClient, SharedChannel,
//!     UserIdentity, WebSocketConnector,
//! };
//!
//! let shared = SharedChannel::new(
//!     WebSocketConnector::new("ws://localhost:5000/hub"),
//!     ChannelConfig::new(),
//! );
//! let identity = Arc::new(MemoryIdentityStore::new(UserIdentity::new("Ana")));
//!
//! let (room, mut signals) = RoomSyncClient::mount(&shared, identity, Some("a1b2c3")).await?;
//! room.submit_vote("5").await?;
//!
//! while let Some(signal) = signals.recv().await {
//!     if let RoomSignal::Exit(_) = signal {
//!         break;
//!     }
//!     println!("{:?}", room.view().selected_vote);
//! }
//! room.unmount().await;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod error;
pub mod error_codes;
pub mod identity;
pub mod optimistic;
pub mod pack;
pub mod protocol;
pub mod room;
pub mod snapshot;
pub mod transport;
pub mod transports;
pub mod work_item;

// Re-export primary types for ergonomic imports.
pub use channel::{
    ChannelConfig, Connector, MessagingChannel, SharedChannel, Subscription, SubscriptionGroup,
};
pub use error::{Result, RoomError};
pub use error_codes::ErrorCode;
pub use identity::{FileIdentityStore, IdentityStore, MemoryIdentityStore, UserIdentity};
pub use optimistic::Optimistic;
pub use pack::VotingPack;
pub use protocol::{
    BroadcastKind, Command, DirectKind, DirectMessage, EventKind, Participant, RoomBroadcast,
    ServerMessage, VotingRole, WorkItem,
};
pub use room::{ExitReason, RoomSignal, RoomSyncClient, RoomView};
pub use snapshot::{new_room_code, RoomSnapshot, RoundPhase, VoteSummary};
pub use transport::Transport;
pub use transports::{loopback_pair, LoopbackServer, LoopbackTransport};
pub use work_item::{StaticWorkItemLookup, WorkItemLookup};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
