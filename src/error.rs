//! Error types for the planning poker room client.

use thiserror::Error;

use crate::error_codes::ErrorCode;

/// Errors that can occur when using the room client.
#[derive(Debug, Error)]
pub enum RoomError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// The messaging channel could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the channel is closed.
    #[error("not connected to the room authority")]
    NotConnected,

    /// The room authority rejected an invoked command.
    #[error("command rejected: {message}")]
    CommandRejected {
        /// Human-readable reason from the authority.
        message: String,
        /// Structured error code, if provided by the authority.
        error_code: Option<ErrorCode>,
    },

    /// No usable user identity (id or display name) was available at mount.
    #[error("no user identity available")]
    MissingIdentity,

    /// No room id was supplied at mount.
    #[error("no room id supplied")]
    MissingRoomId,

    /// The room was destroyed; the client no longer accepts commands.
    #[error("room has been closed")]
    RoomClosed,

    /// A moderator-only command was attempted without admin rights.
    #[error("only the room admin can do that")]
    NotAdmin,

    /// The vote value is not part of the active voting pack.
    #[error("vote {0:?} is not in the active voting pack")]
    InvalidVote(String),

    /// The target of an admin transfer is not valid (e.g. self).
    #[error("invalid admin transfer target: {0}")]
    InvalidTarget(String),

    /// The requested work item could not be found by the lookup service.
    #[error("work item {0} not found")]
    WorkItemNotFound(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RoomError {
    /// Returns `true` if this error means the presentation layer should send
    /// the user back to the identity-collection entry point.
    pub fn requires_redirect(&self) -> bool {
        matches!(self, Self::MissingIdentity | Self::MissingRoomId)
    }

    /// Returns `true` if the authority explicitly rejected the command.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::CommandRejected { .. })
    }
}

/// A specialized [`Result`] type for room client operations.
pub type Result<T> = std::result::Result<T, RoomError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn missing_prerequisites_require_redirect() {
        assert!(RoomError::MissingIdentity.requires_redirect());
        assert!(RoomError::MissingRoomId.requires_redirect());
        assert!(!RoomError::NotAdmin.requires_redirect());
        assert!(!RoomError::RoomClosed.requires_redirect());
    }

    #[test]
    fn rejection_display_includes_message() {
        let err = RoomError::CommandRejected {
            message: "voting is closed".into(),
            error_code: Some(ErrorCode::RoundRevealed),
        };
        assert!(err.is_rejection());
        assert_eq!(err.to_string(), "command rejected: voting is closed");
    }
}
