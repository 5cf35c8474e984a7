//! Error codes attached by the room authority to rejected commands.
//!
//! These codes serialize using `SCREAMING_SNAKE_CASE` to match the
//! authority's JSON format (e.g. `"NOT_ROOM_ADMIN"`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error codes returned by the room authority.
///
/// Use [`description()`](ErrorCode::description) for a human-readable explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Membership errors
    RoomNotFound,
    NotInRoom,
    AlreadyInRoom,
    InvalidDisplayName,

    // Voting errors
    ObserverCannotVote,
    InvalidVoteValue,
    RoundRevealed,
    NoVotesCast,
    UnknownVotingPack,

    // Moderation errors
    NotRoomAdmin,
    InvalidTransferTarget,

    // Work item errors
    WorkItemNotFound,
    WorkItemLookupFailed,

    // Server errors
    RateLimitExceeded,
    InternalError,
    ServiceUnavailable,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::RoomNotFound => {
                "The room could not be found. It may have been closed or the code is incorrect."
            }
            Self::NotInRoom => "This operation requires joining the room first.",
            Self::AlreadyInRoom => "This connection is already a member of a room.",
            Self::InvalidDisplayName => {
                "The display name is invalid. Names must be non-empty and within length limits."
            }
            Self::ObserverCannotVote => "Observers cannot vote. Switch to the voter role first.",
            Self::InvalidVoteValue => "The vote value is not part of the room's voting pack.",
            Self::RoundRevealed => {
                "Votes for this round are already revealed. Wait for a new round to vote."
            }
            Self::NoVotesCast => "No voter has voted yet, so there is nothing to reveal.",
            Self::UnknownVotingPack => "The requested voting pack does not exist.",
            Self::NotRoomAdmin => "Only the room admin can perform this operation.",
            Self::InvalidTransferTarget => {
                "Admin rights can only be transferred to another participant in the room."
            }
            Self::WorkItemNotFound => "The work item could not be found.",
            Self::WorkItemLookupFailed => {
                "The work item service failed to respond. Please try again later."
            }
            Self::RateLimitExceeded => "Too many requests. Please slow down and try again.",
            Self::InternalError => "An internal server error occurred.",
            Self::ServiceUnavailable => {
                "The room service is temporarily unavailable. Please try again later."
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
