#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for the room synchronization client.
//!
//! Each test drives one or more `RoomSyncClient`s against the scripted
//! `TestHub` from `tests/common` and checks the reconciled view.

mod common;

use std::sync::Arc;

use planning_poker_client::{
    BroadcastKind, ChannelConfig, Command, DirectKind, DirectMessage, EventKind, ExitReason,
    MemoryIdentityStore, RoomBroadcast, RoomError, RoomSignal, RoomSyncClient, RoundPhase,
    SharedChannel, UserIdentity, VotingPack, VotingRole, WorkItem,
};
use tokio_test::{assert_err, assert_ok};

use common::{mount, participant, voted, wait_signal, TestHub, ROOM};

fn updated(kind: BroadcastKind) -> impl Fn(&RoomSignal) -> bool {
    move |signal| *signal == RoomSignal::Updated(EventKind::Broadcast(kind))
}

fn story() -> WorkItem {
    WorkItem {
        id: "1234".into(),
        kind: "User Story".into(),
        title: "Export estimates as CSV".into(),
        url: "https://tracker.example/items/1234".into(),
        description_html: "<p>So that we can import them elsewhere.</p>".into(),
    }
}

// ════════════════════════════════════════════════════════════════════
// Mount and join
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn handlers_are_live_before_join_completes() {
    let hub = TestHub::new();
    let ana = mount(&hub, "Ana").await;

    // The hub broadcasts the roster and the admin grant before acknowledging
    // the join; both must already be applied.
    let view = ana.room.view();
    assert_eq!(view.participants().len(), 1);
    assert_eq!(view.participants()[0].name, "Ana");
    assert!(view.is_admin());
    assert_eq!(hub.command_names(ana.conn), vec!["join-room"]);

    match &hub.commands(ana.conn)[0] {
        Command::JoinRoom {
            user_id,
            display_name,
            room_id,
            voting_role,
        } => {
            assert_eq!(user_id, &ana.user_id());
            assert_eq!(display_name, "Ana");
            assert_eq!(room_id, ROOM);
            assert_eq!(*voting_role, VotingRole::Voter);
        }
        other => panic!("expected join-room, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_identity_redirects_without_connecting() {
    let hub = TestHub::new();
    let shared = SharedChannel::new(hub.connector(), ChannelConfig::new());
    let identity = Arc::new(MemoryIdentityStore::new(UserIdentity::new("  ")));

    let err = RoomSyncClient::mount(&shared, identity, Some(ROOM))
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::MissingIdentity));
    assert!(err.requires_redirect());
    assert!(shared.current().await.is_none());
}

#[tokio::test]
async fn missing_room_id_redirects() {
    let hub = TestHub::new();
    let shared = SharedChannel::new(hub.connector(), ChannelConfig::new());
    let identity = Arc::new(MemoryIdentityStore::new(UserIdentity::new("Ana")));

    let err = RoomSyncClient::mount(&shared, identity, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RoomError::MissingRoomId));
    assert!(err.requires_redirect());
    assert!(shared.current().await.is_none());
}

#[tokio::test]
async fn clients_share_one_lazy_connection() {
    let hub = TestHub::new();
    let shared = SharedChannel::new(hub.connector(), ChannelConfig::new());

    let ana = Arc::new(MemoryIdentityStore::new(UserIdentity::new("Ana")));
    let bia = Arc::new(MemoryIdentityStore::new(UserIdentity::new("Bia")));
    let (first, _s1) = assert_ok!(RoomSyncClient::mount(&shared, ana, Some(ROOM)).await);
    let (second, _s2) = assert_ok!(RoomSyncClient::mount(&shared, bia, Some(ROOM)).await);

    assert!(Arc::ptr_eq(first.channel(), second.channel()));
    assert_eq!(hub.command_names(0), vec!["join-room", "join-room"]);
    assert!(hub.commands(1).is_empty());
}

#[tokio::test]
async fn rejected_join_leaves_no_handlers_behind() {
    let hub = TestHub::new();
    hub.reject("join-room", "room not found");
    let (channel, _conn) = hub.channel();
    let identity = Arc::new(MemoryIdentityStore::new(UserIdentity::new("Ana")));

    let err = RoomSyncClient::mount_on(Arc::clone(&channel), identity, Some(ROOM))
        .await
        .unwrap_err();
    assert!(err.is_rejection());
    assert_eq!(channel.handler_count(), 0);
}

// ════════════════════════════════════════════════════════════════════
// Reconciliation
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn participant_list_is_replaced_not_merged() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;

    hub.broadcast(RoomBroadcast::ParticipantListUpdated(vec![
        participant("u-2", "Bia"),
        participant("u-3", "Caio"),
    ]));
    ana.wait_signal(updated(BroadcastKind::ParticipantListUpdated))
        .await;

    let latest = vec![participant("u-3", "Caio")];
    hub.broadcast(RoomBroadcast::ParticipantListUpdated(latest.clone()));
    ana.wait_signal(updated(BroadcastKind::ParticipantListUpdated))
        .await;

    assert_eq!(ana.room.view().participants(), latest.as_slice());
}

#[tokio::test]
async fn participant_order_is_kept() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;

    let list = vec![
        participant("u-9", "Zeca"),
        participant("u-1", "Ana"),
        participant("u-5", "Lia"),
    ];
    hub.broadcast(RoomBroadcast::ParticipantListUpdated(list));
    ana.wait_signal(updated(BroadcastKind::ParticipantListUpdated))
        .await;

    let names: Vec<_> = ana
        .room
        .view()
        .participants()
        .iter()
        .map(|p| p.name.clone())
        .collect();
    assert_eq!(names, ["Zeca", "Ana", "Lia"]);
}

#[tokio::test]
async fn reveal_hint_follows_voting_progress() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;
    assert!(!ana.room.view().can_request_reveal);

    hub.broadcast(RoomBroadcast::ParticipantListUpdated(vec![voted(
        participant("u-2", "Bia"),
        None,
    )]));
    ana.wait_signal(updated(BroadcastKind::ParticipantListUpdated))
        .await;
    assert!(ana.room.view().can_request_reveal);
}

#[tokio::test]
async fn active_pack_follows_authority() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;

    assert_ok!(ana.room.change_voting_pack(VotingPack::Tshirt).await);
    // Nothing changes until the authority says so.
    assert_eq!(ana.room.view().active_pack(), None);

    hub.broadcast(RoomBroadcast::ActivePackChanged(VotingPack::Tshirt));
    ana.wait_signal(updated(BroadcastKind::ActivePackChanged))
        .await;
    assert_eq!(ana.room.view().active_pack(), Some(VotingPack::Tshirt));
    assert_ok!(ana.room.submit_vote("XL").await);
}

#[tokio::test]
async fn vote_before_pack_is_announced_goes_to_authority() {
    let hub = TestHub::new();
    let ana = mount(&hub, "Ana").await;
    assert_eq!(ana.room.view().active_pack(), None);

    assert_ok!(ana.room.submit_vote("XL").await);
    assert_eq!(ana.room.selected_vote().as_deref(), Some("XL"));
    assert_eq!(
        hub.commands(ana.conn).last(),
        Some(&Command::SubmitVote {
            value: Some("XL".into())
        })
    );
}

// ════════════════════════════════════════════════════════════════════
// Voting
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn voting_same_value_twice_clears_it() {
    let hub = TestHub::new();
    let ana = mount(&hub, "Ana").await;

    assert_ok!(ana.room.submit_vote("5").await);
    assert_eq!(ana.room.selected_vote().as_deref(), Some("5"));
    assert_ok!(ana.room.submit_vote("5").await);
    assert_eq!(ana.room.selected_vote(), None);

    let votes: Vec<_> = hub
        .commands(ana.conn)
        .into_iter()
        .filter_map(|c| match c {
            Command::SubmitVote { value } => Some(value),
            _ => None,
        })
        .collect();
    assert_eq!(votes, vec![Some("5".to_string()), None]);
}

#[tokio::test]
async fn new_round_clears_vote() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;

    assert_ok!(ana.room.submit_vote("13").await);
    hub.broadcast(RoomBroadcast::RevealStateChanged(true));
    ana.wait_signal(updated(BroadcastKind::RevealStateChanged))
        .await;
    assert_eq!(ana.room.selected_vote().as_deref(), Some("13"));

    hub.broadcast(RoomBroadcast::RevealStateChanged(false));
    ana.wait_signal(updated(BroadcastKind::RevealStateChanged))
        .await;
    assert_eq!(ana.room.selected_vote(), None);
    assert_eq!(ana.room.view().phase, RoundPhase::Collecting);
}

#[tokio::test]
async fn pack_change_clears_vote() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;

    assert_ok!(ana.room.submit_vote("?").await);
    hub.broadcast(RoomBroadcast::ActivePackChanged(VotingPack::Sequential));
    ana.wait_signal(updated(BroadcastKind::ActivePackChanged))
        .await;
    assert_eq!(ana.room.selected_vote(), None);
}

#[tokio::test]
async fn vote_outside_active_pack_is_refused_locally() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;
    hub.broadcast(RoomBroadcast::ActivePackChanged(VotingPack::Fibonacci));
    ana.wait_signal(updated(BroadcastKind::ActivePackChanged))
        .await;

    assert_ok!(ana.room.submit_vote("3").await);
    let err = assert_err!(ana.room.submit_vote("XL").await);
    assert!(matches!(err, RoomError::InvalidVote(v) if v == "XL"));
    assert_eq!(ana.room.selected_vote().as_deref(), Some("3"));
    assert_eq!(
        hub.command_names(ana.conn),
        vec!["join-room", "submit-vote"]
    );
}

#[tokio::test]
async fn observer_vote_is_a_no_op() {
    let hub = TestHub::new();
    let ana = mount(&hub, "Ana").await;

    assert_eq!(
        assert_ok!(ana.room.toggle_role().await),
        VotingRole::Observer
    );
    let before = ana.room.view();
    assert_ok!(ana.room.submit_vote("8").await);

    assert_eq!(ana.room.view(), before);
    assert_eq!(
        hub.command_names(ana.conn),
        vec!["join-room", "change-role"]
    );
}

#[tokio::test]
async fn becoming_observer_drops_selection() {
    let hub = TestHub::new();
    let ana = mount(&hub, "Ana").await;

    assert_ok!(ana.room.submit_vote("2").await);
    assert_ok!(ana.room.toggle_role().await);
    assert_eq!(ana.room.selected_vote(), None);
    assert_eq!(ana.room.view().voting_role(), VotingRole::Observer);
    assert!(matches!(
        hub.commands(ana.conn).last(),
        Some(Command::ChangeRole {
            role: VotingRole::Observer
        })
    ));
}

#[tokio::test]
async fn rejected_vote_rolls_back_selection() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;

    assert_ok!(ana.room.submit_vote("3").await);
    hub.reject("submit-vote", "votes are already revealed");

    let err = assert_err!(ana.room.submit_vote("5").await);
    assert!(err.is_rejection());
    assert_eq!(ana.room.selected_vote().as_deref(), Some("3"));

    let signal = ana
        .wait_signal(|s| matches!(s, RoomSignal::CommandRejected { .. }))
        .await;
    assert_eq!(
        signal,
        RoomSignal::CommandRejected {
            command: "submit-vote",
            message: "votes are already revealed".into(),
        }
    );
}

#[tokio::test]
async fn rejected_role_change_keeps_local_role() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;
    hub.reject("change-role", "not in room");

    let err = assert_err!(ana.room.toggle_role().await);
    assert!(err.is_rejection());
    assert_eq!(ana.room.view().voting_role(), VotingRole::Observer);
    ana.wait_signal(|s| {
        matches!(s, RoomSignal::CommandRejected { command, .. } if *command == "change-role")
    })
    .await;
}

#[tokio::test]
async fn revealed_list_without_own_vote_clears_selection() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;
    let me = participant(&ana.user_id(), "Ana");

    assert_ok!(ana.room.submit_vote("8").await);
    hub.broadcast(RoomBroadcast::RevealStateChanged(true));
    hub.broadcast(RoomBroadcast::ParticipantListUpdated(vec![
        me,
        voted(participant("u-2", "Bia"), Some("5")),
    ]));
    ana.wait_signal(updated(BroadcastKind::ParticipantListUpdated))
        .await;

    let view = ana.room.view();
    assert_eq!(view.phase, RoundPhase::Revealed);
    assert_eq!(view.selected_vote, None);
}

#[tokio::test]
async fn revealed_vote_matches_optimistic_selection() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;
    let me = participant(&ana.user_id(), "Ana");
    assert_eq!(
        VotingPack::Fibonacci.values(),
        ["0", "1", "2", "3", "5", "8", "13", "21", "?", "☕"]
    );

    assert_ok!(ana.room.submit_vote("8").await);

    // Before reveal the value is withheld; only hasVoted is visible.
    hub.broadcast(RoomBroadcast::ParticipantListUpdated(vec![voted(
        me.clone(),
        None,
    )]));
    ana.wait_signal(updated(BroadcastKind::ParticipantListUpdated))
        .await;
    assert_eq!(ana.room.selected_vote().as_deref(), Some("8"));

    hub.broadcast(RoomBroadcast::RevealStateChanged(true));
    hub.broadcast(RoomBroadcast::ParticipantListUpdated(vec![voted(
        me,
        Some("8"),
    )]));
    ana.wait_signal(updated(BroadcastKind::ParticipantListUpdated))
        .await;

    let view = ana.room.view();
    assert_eq!(view.phase, RoundPhase::Revealed);
    assert_eq!(view.selected_vote.as_deref(), Some("8"));
    let summary = view.snapshot.unwrap().vote_summary().unwrap();
    assert_eq!(summary.most_common, "8");
    assert_eq!(summary.total, 1);
}

// ════════════════════════════════════════════════════════════════════
// Admin commands
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn admin_commands_are_refused_for_non_admins() {
    let hub = TestHub::new();
    let _ana = mount(&hub, "Ana").await;
    let bia = mount(&hub, "Bia").await;
    assert!(!bia.room.is_admin());

    assert!(matches!(
        bia.room.toggle_reveal().await,
        Err(RoomError::NotAdmin)
    ));
    assert!(matches!(
        bia.room.load_work_item("1234").await,
        Err(RoomError::NotAdmin)
    ));
    assert!(matches!(
        bia.room.destroy_room().await,
        Err(RoomError::NotAdmin)
    ));
    assert_eq!(hub.command_names(bia.conn), vec!["join-room"]);
    assert!(!bia.room.view().is_loading_work_item);
}

#[tokio::test]
async fn reveal_is_event_driven() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;

    assert_ok!(ana.room.toggle_reveal().await);
    assert_eq!(ana.room.view().phase, RoundPhase::Collecting);

    hub.broadcast(RoomBroadcast::RevealStateChanged(true));
    ana.wait_signal(updated(BroadcastKind::RevealStateChanged))
        .await;
    assert_eq!(ana.room.view().phase, RoundPhase::Revealed);
}

#[tokio::test]
async fn loading_flag_waits_for_work_item_event() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;
    hub.withhold("load-work-item");

    let err = assert_err!(ana.room.load_work_item("1234").await);
    assert!(matches!(err, RoomError::Timeout));
    assert!(ana.room.view().is_loading_work_item);

    // Unrelated events leave the flag alone.
    hub.broadcast(RoomBroadcast::RevealStateChanged(true));
    ana.wait_signal(updated(BroadcastKind::RevealStateChanged))
        .await;
    assert!(ana.room.view().is_loading_work_item);

    hub.broadcast(RoomBroadcast::WorkItemChanged(Some(story())));
    ana.wait_signal(updated(BroadcastKind::WorkItemChanged))
        .await;
    let view = ana.room.view();
    assert!(!view.is_loading_work_item);
    assert_eq!(view.loaded_work_item(), Some(&story()));
}

#[tokio::test]
async fn rejected_work_item_load_waits_for_event() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;
    hub.reject("load-work-item", "work item not found");

    let err = assert_err!(ana.room.load_work_item("77").await);
    assert!(err.is_rejection());
    ana.wait_signal(|s| {
        matches!(s, RoomSignal::CommandRejected { command, .. } if *command == "load-work-item")
    })
    .await;
    assert!(ana.room.view().is_loading_work_item);

    hub.broadcast(RoomBroadcast::WorkItemChanged(None));
    ana.wait_signal(updated(BroadcastKind::WorkItemChanged))
        .await;
    assert!(!ana.room.view().is_loading_work_item);
}

#[tokio::test]
async fn cleared_work_item_event_unloads() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;

    assert_ok!(ana.room.load_work_item("1234").await);
    hub.broadcast(RoomBroadcast::WorkItemChanged(Some(story())));
    ana.wait_signal(updated(BroadcastKind::WorkItemChanged))
        .await;

    assert_ok!(ana.room.clear_work_item().await);
    hub.broadcast(RoomBroadcast::WorkItemChanged(None));
    ana.wait_signal(updated(BroadcastKind::WorkItemChanged))
        .await;
    assert!(ana.room.view().loaded_work_item().is_none());
}

#[tokio::test]
async fn transfer_admin_settles_on_exactly_one_admin() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;
    let mut bia = mount(&hub, "Bia").await;
    assert!(ana.room.is_admin());
    assert!(!bia.room.is_admin());

    assert_ok!(ana.room.transfer_admin(&bia.user_id()).await);
    // Unchanged until the authority confirms.
    assert!(ana.room.is_admin());

    hub.direct(ana.conn, DirectMessage::AdminStatus(false));
    hub.direct(bia.conn, DirectMessage::AdminStatus(true));
    ana.wait_signal(|s| *s == RoomSignal::AdminChanged(false))
        .await;
    bia.wait_signal(|s| *s == RoomSignal::Updated(EventKind::Direct(DirectKind::AdminStatus)))
        .await;

    let admins = [ana.room.is_admin(), bia.room.is_admin()];
    assert_eq!(admins, [false, true]);
}

#[tokio::test]
async fn transfer_admin_to_self_is_refused() {
    let hub = TestHub::new();
    let ana = mount(&hub, "Ana").await;

    let err = assert_err!(ana.room.transfer_admin(&ana.user_id()).await);
    assert!(matches!(err, RoomError::InvalidTarget(_)));
    assert_eq!(hub.command_names(ana.conn), vec!["join-room"]);
}

// ════════════════════════════════════════════════════════════════════
// Termination and teardown
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn room_destroyed_is_terminal() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;

    assert_ok!(ana.room.destroy_room().await);
    hub.broadcast(RoomBroadcast::RoomDestroyed);
    let signal = ana.wait_signal(|s| matches!(s, RoomSignal::Exit(_))).await;
    assert_eq!(signal, RoomSignal::Exit(ExitReason::RoomDestroyed));

    hub.broadcast(RoomBroadcast::ParticipantListUpdated(vec![participant(
        "u-2", "Bia",
    )]));
    hub.broadcast(RoomBroadcast::RevealStateChanged(true));

    let view = ana.room.view();
    assert!(view.is_terminated);
    assert!(view.snapshot.is_none());
    assert!(matches!(
        ana.room.submit_vote("1").await,
        Err(RoomError::RoomClosed)
    ));
}

#[tokio::test]
async fn unmount_disposes_handlers_then_leaves() {
    let hub = TestHub::new();
    let ana = mount(&hub, "Ana").await;
    let channel = Arc::clone(ana.room.channel());
    assert_eq!(channel.handler_count(), 7);

    ana.room.unmount().await;
    assert_eq!(channel.handler_count(), 0);
    assert_eq!(hub.command_names(ana.conn), vec!["join-room", "leave-room"]);
}

#[tokio::test]
async fn events_after_unmount_are_dropped() {
    let hub = TestHub::new();
    let ana = mount(&hub, "Ana").await;
    let mut signals = ana.signals;

    ana.room.unmount().await;
    hub.broadcast(RoomBroadcast::RevealStateChanged(true));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(signals.try_recv().is_err());
}

#[tokio::test]
async fn dropping_client_still_leaves() {
    let hub = TestHub::new();
    let ana = mount(&hub, "Ana").await;
    let conn = ana.conn;
    let channel = Arc::clone(ana.room.channel());

    drop(ana.room);
    assert_eq!(channel.handler_count(), 0);
    let command = hub.wait_for_command(conn, "leave-room").await;
    assert_eq!(command, Command::LeaveRoom);
}

#[tokio::test]
async fn connection_loss_exits_room() {
    let hub = TestHub::new();
    let mut ana = mount(&hub, "Ana").await;

    hub.disconnect(ana.conn);
    let lost = ana
        .wait_signal(|s| matches!(s, RoomSignal::ConnectionLost { .. }))
        .await;
    assert_eq!(lost, RoomSignal::ConnectionLost { reason: None });
    let exit = ana.wait_signal(|s| matches!(s, RoomSignal::Exit(_))).await;
    assert_eq!(exit, RoomSignal::Exit(ExitReason::ConnectionLost));

    assert!(ana.room.view().is_terminated);
    assert!(!ana.room.channel().is_connected());
}

#[tokio::test]
async fn signal_helper_sees_exit_from_free_function() {
    let hub = TestHub::new();
    let ana = mount(&hub, "Ana").await;
    let mut signals = ana.signals;

    hub.broadcast(RoomBroadcast::RoomDestroyed);
    let exit = wait_signal(&mut signals, |s| matches!(s, RoomSignal::Exit(_))).await;
    assert_eq!(exit, RoomSignal::Exit(ExitReason::RoomDestroyed));
    assert!(ana.room.is_terminated());
}
