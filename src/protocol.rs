//! Wire types exchanged with the room authority.
//!
//! Every message is a JSON text frame. Enums are adjacently tagged
//! (`{"type": "...", "data": ...}`) with kebab-case tags, and struct fields
//! use camelCase to match the authority's hub payloads.
//!
//! Outgoing commands are wrapped in an [`Invocation`] carrying an id that the
//! authority echoes back in a [`ServerMessage::Completion`]. Pushed events are
//! split into two categories: [`RoomBroadcast`] (fan-out to every room member)
//! and [`DirectMessage`] (addressed to this connection only).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error_codes::ErrorCode;
use crate::pack::VotingPack;

// ── Type aliases ────────────────────────────────────────────────────

/// Stable, cross-reconnect identifier of a user.
pub type UserId = String;

/// Transport-assigned identifier of one connection.
pub type ConnectionId = String;

/// Identifier of a room (the code shared with participants).
pub type RoomId = String;

/// Correlates an invoked command with its completion.
pub type InvocationId = u64;

// ── Enums ───────────────────────────────────────────────────────────

/// Whether a participant casts votes or only watches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum VotingRole {
    #[default]
    Voter,
    Observer,
}

impl VotingRole {
    /// The other role.
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Voter => Self::Observer,
            Self::Observer => Self::Voter,
        }
    }

    pub fn is_voter(self) -> bool {
        self == Self::Voter
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// One connected room member as reported by the authority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub name: String,
    pub is_admin: bool,
    pub voting_role: VotingRole,
    pub has_voted: bool,
    /// Withheld (`None`) by the authority until the round is revealed.
    #[serde(default)]
    pub vote: Option<String>,
}

/// A work item under estimation. Opaque to the client beyond display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub url: String,
    /// Rich-text description, rendered as-is.
    #[serde(default)]
    pub description_html: String,
}

// ── Commands ────────────────────────────────────────────────────────

/// Commands the client can invoke on the room authority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum Command {
    /// Enter a room. Must follow handler registration.
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        user_id: UserId,
        display_name: String,
        room_id: RoomId,
        voting_role: VotingRole,
    },
    /// Leave the current room.
    LeaveRoom,
    /// Cast (`Some`) or withdraw (`None`) this client's vote.
    SubmitVote { value: Option<String> },
    /// Switch between voter and observer.
    ChangeRole { role: VotingRole },
    /// Switch the room's voting pack (admin only).
    ChangeVotingPack { pack: VotingPack },
    /// Reveal votes, or start a new round if already revealed (admin only).
    ToggleReveal,
    /// Ask the authority to look up and publish a work item (admin only).
    #[serde(rename_all = "camelCase")]
    LoadWorkItem { item_id: String },
    /// Remove the current work item (admin only).
    ClearWorkItem,
    /// Hand admin rights to another participant (admin only).
    #[serde(rename_all = "camelCase")]
    TransferAdmin { target_user_id: UserId },
    /// Close the room for everyone (admin only).
    DestroyRoom,
}

impl Command {
    /// Wire name of the command, used in logs and rejection signals.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join-room",
            Self::LeaveRoom => "leave-room",
            Self::SubmitVote { .. } => "submit-vote",
            Self::ChangeRole { .. } => "change-role",
            Self::ChangeVotingPack { .. } => "change-voting-pack",
            Self::ToggleReveal => "toggle-reveal",
            Self::LoadWorkItem { .. } => "load-work-item",
            Self::ClearWorkItem => "clear-work-item",
            Self::TransferAdmin { .. } => "transfer-admin",
            Self::DestroyRoom => "destroy-room",
        }
    }
}

/// Envelope for an outgoing command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    pub invocation_id: InvocationId,
    pub command: Command,
}

// ── Server messages ─────────────────────────────────────────────────

/// Events fanned out to every member of the room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum RoomBroadcast {
    /// Complete participant list, in authority order.
    ParticipantListUpdated(Vec<Participant>),
    /// `true` once votes are revealed, `false` when a new round starts.
    RevealStateChanged(bool),
    /// The room switched voting packs.
    ActivePackChanged(VotingPack),
    /// A work item was loaded, or cleared (`None`).
    WorkItemChanged(Option<WorkItem>),
    /// The room no longer exists.
    RoomDestroyed,
}

impl RoomBroadcast {
    pub fn kind(&self) -> BroadcastKind {
        match self {
            Self::ParticipantListUpdated(_) => BroadcastKind::ParticipantListUpdated,
            Self::RevealStateChanged(_) => BroadcastKind::RevealStateChanged,
            Self::ActivePackChanged(_) => BroadcastKind::ActivePackChanged,
            Self::WorkItemChanged(_) => BroadcastKind::WorkItemChanged,
            Self::RoomDestroyed => BroadcastKind::RoomDestroyed,
        }
    }
}

/// Events addressed to this connection only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum DirectMessage {
    /// Whether this client is now the room admin.
    AdminStatus(bool),
}

impl DirectMessage {
    pub fn kind(&self) -> DirectKind {
        match self {
            Self::AdminStatus(_) => DirectKind::AdminStatus,
        }
    }
}

/// Message types sent from the authority to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Acknowledges one invocation. `error` is present when it was rejected.
    #[serde(rename_all = "camelCase")]
    Completion {
        invocation_id: InvocationId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<ErrorCode>,
    },
    /// Room-wide event.
    Broadcast(RoomBroadcast),
    /// Event for this connection only.
    Direct(DirectMessage),
    /// Unsolicited error from the authority.
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<ErrorCode>,
    },
}

// ── Event kinds ─────────────────────────────────────────────────────

/// Subscribable kinds of [`RoomBroadcast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastKind {
    ParticipantListUpdated,
    RevealStateChanged,
    ActivePackChanged,
    WorkItemChanged,
    RoomDestroyed,
}

impl BroadcastKind {
    pub const ALL: [BroadcastKind; 5] = [
        Self::ParticipantListUpdated,
        Self::RevealStateChanged,
        Self::ActivePackChanged,
        Self::WorkItemChanged,
        Self::RoomDestroyed,
    ];
}

/// Subscribable kinds of [`DirectMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectKind {
    AdminStatus,
}

/// Either category of pushed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Broadcast(BroadcastKind),
    Direct(DirectKind),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Broadcast(BroadcastKind::ParticipantListUpdated) => "participant-list-updated",
            Self::Broadcast(BroadcastKind::RevealStateChanged) => "reveal-state-changed",
            Self::Broadcast(BroadcastKind::ActivePackChanged) => "active-pack-changed",
            Self::Broadcast(BroadcastKind::WorkItemChanged) => "work-item-changed",
            Self::Broadcast(BroadcastKind::RoomDestroyed) => "room-destroyed",
            Self::Direct(DirectKind::AdminStatus) => "admin-status",
        };
        f.write_str(name)
    }
}
