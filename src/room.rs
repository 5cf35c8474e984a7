//! Room synchronization client.
//!
//! [`RoomSyncClient`] keeps a locally consistent [`RoomSnapshot`] for one room
//! by reacting to events pushed over a shared [`MessagingChannel`], and issues
//! the room commands with optimistic local updates where the protocol allows
//! them.
//!
//! # Lifecycle
//!
//! 1. [`RoomSyncClient::mount`] checks that an identity and a room id exist,
//!    connects the shared channel, registers every event handler and only then
//!    sends `join-room`, so no event caused by the join can be missed.
//! 2. Events update the snapshot; each applied event is reported as a
//!    [`RoomSignal`] on the receiver returned by `mount`.
//! 3. [`RoomSyncClient::unmount`] disposes the handlers first and then sends
//!    `leave-room`. Dropping the client does the same without waiting.
//!
//! A `room-destroyed` broadcast (or the channel closing) is terminal: the
//! client emits [`RoomSignal::Exit`] and ignores everything that follows.
//!
//! # Example
//!
//! ```rust,ignore
//! let (room, mut signals) = RoomSyncClient::mount(&shared, identity, Some("a1b2c3")).await?;
//! room.submit_vote("5").await?;
//!
//! while let Some(signal) = signals.recv().await {
//!     match signal {
//!         RoomSignal::Exit(reason) => break,
//!         _ => render(&room.view()),
//!     }
//! }
//! room.unmount().await;
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::channel::{Connector, MessagingChannel, SharedChannel, SubscriptionGroup};
use crate::error::{Result, RoomError};
use crate::identity::{IdentityStore, UserIdentity};
use crate::optimistic::Optimistic;
use crate::pack::VotingPack;
use crate::protocol::{
    BroadcastKind, Command, DirectKind, DirectMessage, EventKind, Participant, RoomBroadcast,
    RoomId, VotingRole, WorkItem,
};
use crate::snapshot::{RoomSnapshot, RoundPhase};

// ── Signals ─────────────────────────────────────────────────────────

/// Why the client stopped following its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The authority destroyed the room.
    RoomDestroyed,
    /// The messaging channel closed.
    ConnectionLost,
}

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomSignal {
    /// An event was applied; re-read [`RoomSyncClient::view`].
    Updated(EventKind),
    /// The authority confirmed a new admin status for this client.
    AdminChanged(bool),
    /// The authority rejected a command issued by this client.
    CommandRejected {
        command: &'static str,
        message: String,
    },
    /// The messaging channel closed underneath the room.
    ConnectionLost { reason: Option<String> },
    /// Terminal. Navigate away from the room.
    Exit(ExitReason),
}

// ── View ────────────────────────────────────────────────────────────

/// Read-only picture of the room for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomView {
    /// `None` once the room has been destroyed.
    pub snapshot: Option<RoomSnapshot>,
    /// This client's card, optimistic until the authority confirms it.
    pub selected_vote: Option<String>,
    pub is_loading_work_item: bool,
    pub identity: UserIdentity,
    pub phase: RoundPhase,
    /// Advisory only: someone has voted, or votes are already showing.
    pub can_request_reveal: bool,
    pub is_terminated: bool,
}

impl RoomView {
    pub fn is_admin(&self) -> bool {
        self.identity.is_admin
    }

    pub fn voting_role(&self) -> VotingRole {
        self.identity.voting_role
    }

    pub fn participants(&self) -> &[Participant] {
        self.snapshot
            .as_ref()
            .map(|s| s.participants.as_slice())
            .unwrap_or_default()
    }

    /// `None` until the authority has announced the room's pack.
    pub fn active_pack(&self) -> Option<VotingPack> {
        self.snapshot.as_ref().and_then(|s| s.active_pack)
    }

    pub fn loaded_work_item(&self) -> Option<&WorkItem> {
        self.snapshot
            .as_ref()
            .and_then(|s| s.loaded_work_item.as_ref())
    }
}

// ── Reconciliation state ────────────────────────────────────────────

#[derive(Debug)]
struct RoomState {
    snapshot: Option<RoomSnapshot>,
    vote: Optimistic<Option<String>>,
    loading_work_item: bool,
    /// Room destroyed or connection lost.
    terminated: bool,
    /// Teardown started; handlers must not touch anything.
    detached: bool,
}

impl RoomState {
    fn new(room_id: &str) -> Self {
        Self {
            snapshot: Some(RoomSnapshot::empty(room_id)),
            vote: Optimistic::default(),
            loading_work_item: false,
            terminated: false,
            detached: false,
        }
    }

    fn accepts_events(&self) -> bool {
        !self.terminated && !self.detached
    }

    fn ensure_open(&self) -> Result<()> {
        if self.accepts_events() {
            Ok(())
        } else {
            Err(RoomError::RoomClosed)
        }
    }
}

/// State shared between the client handle and its registered handlers.
struct Inner {
    room_id: RoomId,
    identity: Arc<dyn IdentityStore>,
    state: Mutex<RoomState>,
    signals: mpsc::UnboundedSender<RoomSignal>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, signal: RoomSignal) {
        // The presentation layer may have stopped listening.
        let _ = self.signals.send(signal);
    }

    fn apply_broadcast(&self, event: &RoomBroadcast) {
        let mut state = self.state();
        if !state.accepts_events() {
            debug!(room_id = %self.room_id, kind = ?event.kind(), "ignoring event for closed room");
            return;
        }

        match event {
            RoomBroadcast::ParticipantListUpdated(participants) => {
                let user_id = self.identity.load().user_id;
                let revealed = state.snapshot.as_ref().is_some_and(|s| s.is_revealed);
                if let Some(own) = participants.iter().find(|p| p.user_id == user_id) {
                    // While collecting, a cast vote is reported without its value.
                    let withheld = !revealed && own.has_voted && own.vote.is_none();
                    if !withheld {
                        state.vote.confirm(own.vote.clone());
                    }
                }
                if let Some(snapshot) = state.snapshot.as_mut() {
                    snapshot.participants = participants.clone();
                }
                debug!(room_id = %self.room_id, count = participants.len(), "participants replaced");
            }
            RoomBroadcast::RevealStateChanged(revealed) => {
                if let Some(snapshot) = state.snapshot.as_mut() {
                    snapshot.is_revealed = *revealed;
                }
                if !revealed {
                    state.vote.reset(None);
                }
                debug!(room_id = %self.room_id, revealed, "reveal state changed");
            }
            RoomBroadcast::ActivePackChanged(pack) => {
                if let Some(snapshot) = state.snapshot.as_mut() {
                    snapshot.active_pack = Some(*pack);
                }
                state.vote.reset(None);
                debug!(room_id = %self.room_id, %pack, "active pack changed");
            }
            RoomBroadcast::WorkItemChanged(item) => {
                if let Some(snapshot) = state.snapshot.as_mut() {
                    snapshot.loaded_work_item = item.clone();
                }
                state.loading_work_item = false;
                debug!(
                    room_id = %self.room_id,
                    item_id = item.as_ref().map(|i| i.id.as_str()),
                    "work item changed"
                );
            }
            RoomBroadcast::RoomDestroyed => {
                state.terminated = true;
                state.snapshot = None;
                state.loading_work_item = false;
                state.vote.reset(None);
                info!(room_id = %self.room_id, "room destroyed");
                self.emit(RoomSignal::Exit(ExitReason::RoomDestroyed));
                return;
            }
        }

        self.emit(RoomSignal::Updated(EventKind::Broadcast(event.kind())));
    }

    fn apply_direct(&self, message: &DirectMessage) {
        let state = self.state();
        if !state.accepts_events() {
            return;
        }

        match message {
            DirectMessage::AdminStatus(is_admin) => {
                if let Err(e) = self.identity.set_admin(*is_admin) {
                    error!(room_id = %self.room_id, "failed to store admin status: {e}");
                }
                info!(room_id = %self.room_id, is_admin, "admin status confirmed");
                self.emit(RoomSignal::AdminChanged(*is_admin));
            }
        }
        self.emit(RoomSignal::Updated(EventKind::Direct(message.kind())));
    }

    fn connection_closed(&self, reason: Option<&str>) {
        let mut state = self.state();
        if !state.accepts_events() {
            return;
        }
        state.terminated = true;
        state.loading_work_item = false;
        warn!(room_id = %self.room_id, ?reason, "messaging channel closed");
        self.emit(RoomSignal::ConnectionLost {
            reason: reason.map(str::to_string),
        });
        self.emit(RoomSignal::Exit(ExitReason::ConnectionLost));
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Synchronization client for one room.
pub struct RoomSyncClient {
    inner: Arc<Inner>,
    channel: Arc<MessagingChannel>,
    subscriptions: SubscriptionGroup,
    left: bool,
}

impl RoomSyncClient {
    /// Join `room_id` over the shared channel, connecting it if needed.
    ///
    /// # Errors
    ///
    /// - [`RoomError::MissingIdentity`] / [`RoomError::MissingRoomId`] before
    ///   any network activity; see [`RoomError::requires_redirect`]
    /// - [`RoomError::Connection`] if the channel cannot be established
    /// - any error from the `join-room` invocation
    pub async fn mount<C: Connector>(
        shared: &SharedChannel<C>,
        identity: Arc<dyn IdentityStore>,
        room_id: Option<&str>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RoomSignal>)> {
        let (user, room_id) = prerequisites(identity.as_ref(), room_id)?;
        let channel = shared.connect().await?;
        Self::join(channel, identity, user, room_id).await
    }

    /// Join `room_id` over an already connected channel.
    ///
    /// # Errors
    ///
    /// Same as [`mount`](Self::mount), minus connection establishment.
    pub async fn mount_on(
        channel: Arc<MessagingChannel>,
        identity: Arc<dyn IdentityStore>,
        room_id: Option<&str>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RoomSignal>)> {
        let (user, room_id) = prerequisites(identity.as_ref(), room_id)?;
        Self::join(channel, identity, user, room_id).await
    }

    async fn join(
        channel: Arc<MessagingChannel>,
        identity: Arc<dyn IdentityStore>,
        user: UserIdentity,
        room_id: RoomId,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RoomSignal>)> {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            state: Mutex::new(RoomState::new(&room_id)),
            room_id: room_id.clone(),
            identity,
            signals: signal_tx,
        });

        let mut subscriptions = SubscriptionGroup::new();
        for kind in BroadcastKind::ALL {
            let inner = Arc::clone(&inner);
            subscriptions.push(channel.on_broadcast(kind, move |event| inner.apply_broadcast(event)));
        }
        {
            let inner = Arc::clone(&inner);
            subscriptions.push(
                channel.on_direct(DirectKind::AdminStatus, move |message| {
                    inner.apply_direct(message)
                }),
            );
        }
        {
            let inner = Arc::clone(&inner);
            subscriptions.push(channel.on_closed(move |reason| inner.connection_closed(reason)));
        }

        let join = Command::JoinRoom {
            user_id: user.user_id.clone(),
            display_name: user.display_name.clone(),
            room_id: room_id.clone(),
            voting_role: user.voting_role,
        };
        if let Err(e) = channel.invoke(join).await {
            warn!(room_id = %room_id, "join-room failed: {e}");
            inner.state().detached = true;
            subscriptions.dispose();
            return Err(e);
        }
        info!(room_id = %room_id, user_id = %user.user_id, "joined room");

        Ok((
            Self {
                inner,
                channel,
                subscriptions,
                left: false,
            },
            signal_rx,
        ))
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn room_id(&self) -> &str {
        &self.inner.room_id
    }

    pub fn channel(&self) -> &Arc<MessagingChannel> {
        &self.channel
    }

    pub fn view(&self) -> RoomView {
        let identity = self.inner.identity.load();
        let state = self.inner.state();
        let snapshot = state.snapshot.clone();
        RoomView {
            phase: snapshot.as_ref().map(RoomSnapshot::phase).unwrap_or_default(),
            can_request_reveal: snapshot
                .as_ref()
                .is_some_and(|s| s.is_revealed || s.any_voter_has_voted()),
            selected_vote: state.vote.get().clone(),
            is_loading_work_item: state.loading_work_item,
            is_terminated: state.terminated,
            identity,
            snapshot,
        }
    }

    pub fn selected_vote(&self) -> Option<String> {
        self.inner.state().vote.get().clone()
    }

    pub fn is_admin(&self) -> bool {
        self.inner.identity.load().is_admin
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.state().terminated
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Pick a card, or clear it when `value` is already selected.
    ///
    /// A no-op for observers. The selection shows immediately and is rolled
    /// back if the authority rejects it.
    ///
    /// # Errors
    ///
    /// [`RoomError::InvalidVote`] if `value` is not in the active pack, or any
    /// invocation error. Before the pack is known the authority is left to
    /// judge the value.
    pub async fn submit_vote(&self, value: &str) -> Result<()> {
        if !self.inner.identity.load().voting_role.is_voter() {
            debug!(room_id = %self.inner.room_id, "observers cannot vote; ignoring");
            return Ok(());
        }

        let (proposed, previous) = {
            let mut state = self.inner.state();
            state.ensure_open()?;
            let pack = state.snapshot.as_ref().and_then(|s| s.active_pack);
            if pack.is_some_and(|pack| !pack.contains(value)) {
                return Err(RoomError::InvalidVote(value.to_string()));
            }
            let proposed = if state.vote.get().as_deref() == Some(value) {
                None
            } else {
                Some(value.to_string())
            };
            let previous = state.vote.propose(proposed.clone());
            (proposed, previous)
        };

        let result = self
            .invoke(Command::SubmitVote {
                value: proposed.clone(),
            })
            .await;
        if let Err(e) = &result {
            if e.is_rejection() && self.inner.state().vote.revert(&proposed, previous) {
                debug!(room_id = %self.inner.room_id, "vote rolled back");
            }
        }
        result
    }

    /// Switch between voter and observer. Becoming an observer drops the
    /// local vote. Returns the new role.
    ///
    /// # Errors
    ///
    /// Any invocation error. The local role keeps the new value either way.
    pub async fn toggle_role(&self) -> Result<VotingRole> {
        let next = self.inner.identity.load().voting_role.toggled();
        {
            let mut state = self.inner.state();
            state.ensure_open()?;
            self.inner.identity.set_role(next)?;
            if !next.is_voter() {
                state.vote.reset(None);
            }
        }

        self.invoke(Command::ChangeRole { role: next }).await?;
        Ok(next)
    }

    /// Ask the authority to switch packs. Admin only; nothing changes locally
    /// until `active-pack-changed` arrives.
    pub async fn change_voting_pack(&self, pack: VotingPack) -> Result<()> {
        self.ensure_admin()?;
        self.invoke(Command::ChangeVotingPack { pack }).await
    }

    /// Ask the authority to reveal votes, or start a new round. Admin only.
    pub async fn toggle_reveal(&self) -> Result<()> {
        self.ensure_admin()?;
        self.invoke(Command::ToggleReveal).await
    }

    /// Ask the authority to load a work item. Admin only.
    ///
    /// The loading flag stays set until `work-item-changed` arrives, even if
    /// the command is rejected or times out.
    pub async fn load_work_item(&self, item_id: &str) -> Result<()> {
        self.ensure_admin()?;
        let item_id = item_id.trim();
        if item_id.is_empty() {
            return Err(RoomError::WorkItemNotFound(String::new()));
        }
        self.inner.state().loading_work_item = true;
        self.invoke(Command::LoadWorkItem {
            item_id: item_id.to_string(),
        })
        .await
    }

    /// Ask the authority to unload the current work item. Admin only.
    pub async fn clear_work_item(&self) -> Result<()> {
        self.ensure_admin()?;
        self.invoke(Command::ClearWorkItem).await
    }

    /// Hand admin rights to another participant. Admin only.
    ///
    /// The local admin flag changes only when `admin-status` arrives.
    pub async fn transfer_admin(&self, target_user_id: &str) -> Result<()> {
        self.ensure_admin()?;
        let own = self.inner.identity.load().user_id;
        if target_user_id.trim().is_empty() || target_user_id == own {
            return Err(RoomError::InvalidTarget(target_user_id.to_string()));
        }
        self.invoke(Command::TransferAdmin {
            target_user_id: target_user_id.to_string(),
        })
        .await
    }

    /// Close the room for everyone. Admin only.
    pub async fn destroy_room(&self) -> Result<()> {
        self.ensure_admin()?;
        self.invoke(Command::DestroyRoom).await
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Stop following the room: dispose handlers, then leave if connected.
    pub async fn unmount(mut self) {
        self.detach();
        self.left = true;
        if self.channel.is_connected() {
            match self.channel.invoke(Command::LeaveRoom).await {
                Ok(()) => info!(room_id = %self.inner.room_id, "left room"),
                Err(e) => debug!(room_id = %self.inner.room_id, "leave-room failed: {e}"),
            }
        }
    }

    fn detach(&mut self) {
        self.inner.state().detached = true;
        self.subscriptions.dispose();
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn ensure_admin(&self) -> Result<()> {
        self.inner.state().ensure_open()?;
        if self.inner.identity.load().is_admin {
            Ok(())
        } else {
            Err(RoomError::NotAdmin)
        }
    }

    async fn invoke(&self, command: Command) -> Result<()> {
        let name = command.name();
        self.channel.invoke(command).await.inspect_err(|e| {
            if let RoomError::CommandRejected { message, .. } = e {
                warn!(room_id = %self.inner.room_id, command = name, "rejected: {message}");
                self.inner.emit(RoomSignal::CommandRejected {
                    command: name,
                    message: message.clone(),
                });
            }
        })
    }
}

impl Drop for RoomSyncClient {
    fn drop(&mut self) {
        if self.left {
            return;
        }
        self.detach();
        if self.channel.is_connected() {
            if let Err(e) = self.channel.notify(Command::LeaveRoom) {
                debug!(room_id = %self.inner.room_id, "leave-room on drop failed: {e}");
            }
        }
    }
}

impl std::fmt::Debug for RoomSyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSyncClient")
            .field("room_id", &self.inner.room_id)
            .field("handlers", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

/// Validate mount inputs without touching the network.
fn prerequisites(
    identity: &dyn IdentityStore,
    room_id: Option<&str>,
) -> Result<(UserIdentity, RoomId)> {
    let user = identity.load();
    if !user.is_complete() {
        return Err(RoomError::MissingIdentity);
    }
    let room_id = room_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(RoomError::MissingRoomId)?;
    Ok((user, room_id.to_string()))
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
    use crate::identity::MemoryIdentityStore;

    fn inner_for(identity: UserIdentity) -> (Inner, mpsc::UnboundedReceiver<RoomSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            room_id: "r1".into(),
            identity: Arc::new(MemoryIdentityStore::new(identity)),
            state: Mutex::new(RoomState::new("r1")),
            signals: tx,
        };
        (inner, rx)
    }

    fn participant(user_id: &str, vote: Option<&str>, has_voted: bool) -> Participant {
        Participant {
            connection_id: format!("c-{user_id}"),
            user_id: user_id.into(),
            name: user_id.into(),
            is_admin: false,
            voting_role: VotingRole::Voter,
            has_voted,
            vote: vote.map(Into::into),
        }
    }

    #[test]
    fn prerequisites_reject_missing_identity_first() {
        let store = MemoryIdentityStore::new(UserIdentity::new(""));
        let err = prerequisites(&store, None).unwrap_err();
        assert!(matches!(err, RoomError::MissingIdentity));
    }

    #[test]
    fn prerequisites_reject_blank_room_id() {
        let store = MemoryIdentityStore::new(UserIdentity::new("Ana"));
        assert!(matches!(
            prerequisites(&store, Some("  ")),
            Err(RoomError::MissingRoomId)
        ));
        let (_, room) = prerequisites(&store, Some(" abc123 ")).unwrap();
        assert_eq!(room, "abc123");
    }

    #[test]
    fn hidden_vote_does_not_override_selection() {
        let identity = UserIdentity::new("Ana");
        let me = identity.user_id.clone();
        let (inner, _rx) = inner_for(identity);
        inner.state().vote.propose(Some("5".into()));

        inner.apply_broadcast(&RoomBroadcast::ParticipantListUpdated(vec![participant(
            &me, None, true,
        )]));
        assert_eq!(inner.state().vote.get().as_deref(), Some("5"));

        inner.apply_broadcast(&RoomBroadcast::ParticipantListUpdated(vec![participant(
            &me,
            Some("8"),
            true,
        )]));
        let state = inner.state();
        assert_eq!(state.vote.get().as_deref(), Some("8"));
        assert!(!state.vote.is_pending());
    }

    #[test]
    fn unvoted_own_entry_clears_selection() {
        let identity = UserIdentity::new("Ana");
        let me = identity.user_id.clone();
        let (inner, _rx) = inner_for(identity);

        inner.state().vote.propose(Some("5".into()));
        inner.apply_broadcast(&RoomBroadcast::ParticipantListUpdated(vec![participant(
            &me, None, false,
        )]));
        assert_eq!(inner.state().vote.get(), &None);

        inner.state().vote.propose(Some("8".into()));
        inner.apply_broadcast(&RoomBroadcast::RevealStateChanged(true));
        inner.apply_broadcast(&RoomBroadcast::ParticipantListUpdated(vec![participant(
            &me, None, true,
        )]));
        let state = inner.state();
        assert_eq!(state.vote.get(), &None);
        assert!(!state.vote.is_pending());
    }

    #[test]
    fn work_item_event_clears_loading_flag() {
        let (inner, mut rx) = inner_for(UserIdentity::new("Ana"));
        inner.state().loading_work_item = true;
        inner.apply_broadcast(&RoomBroadcast::RevealStateChanged(true));
        assert!(inner.state().loading_work_item);

        inner.apply_broadcast(&RoomBroadcast::WorkItemChanged(None));
        assert!(!inner.state().loading_work_item);

        assert_eq!(
            rx.try_recv().unwrap(),
            RoomSignal::Updated(EventKind::Broadcast(BroadcastKind::RevealStateChanged))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            RoomSignal::Updated(EventKind::Broadcast(BroadcastKind::WorkItemChanged))
        );
    }

    #[test]
    fn room_destroyed_is_terminal() {
        let (inner, mut rx) = inner_for(UserIdentity::new("Ana"));
        inner.apply_broadcast(&RoomBroadcast::RoomDestroyed);
        inner.apply_broadcast(&RoomBroadcast::RevealStateChanged(true));
        inner.apply_direct(&DirectMessage::AdminStatus(true));

        let state = inner.state();
        assert!(state.terminated);
        assert!(state.snapshot.is_none());
        assert!(matches!(state.ensure_open(), Err(RoomError::RoomClosed)));
        drop(state);

        assert_eq!(
            rx.try_recv().unwrap(),
            RoomSignal::Exit(ExitReason::RoomDestroyed)
        );
        assert!(rx.try_recv().is_err());
        assert!(!inner.identity.load().is_admin);
    }

    #[test]
    fn detached_state_ignores_events() {
        let (inner, mut rx) = inner_for(UserIdentity::new("Ana"));
        inner.state().detached = true;
        inner.apply_broadcast(&RoomBroadcast::ActivePackChanged(VotingPack::Tshirt));
        inner.connection_closed(Some("gone"));

        assert_eq!(inner.state().snapshot.as_ref().unwrap().active_pack, None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn connection_loss_emits_exit_once() {
        let (inner, mut rx) = inner_for(UserIdentity::new("Ana"));
        inner.connection_closed(Some("transport receive error: reset"));
        inner.connection_closed(None);

        assert_eq!(
            rx.try_recv().unwrap(),
            RoomSignal::ConnectionLost {
                reason: Some("transport receive error: reset".into())
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            RoomSignal::Exit(ExitReason::ConnectionLost)
        );
        assert!(rx.try_recv().is_err());
    }
}
