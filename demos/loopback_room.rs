//! # Loopback Room Example
//!
//! Runs a whole estimation round without a network. A tiny in-process hub
//! plays the room authority over loopback transports, resolving work items
//! through a [`StaticWorkItemLookup`].
//!
//! Two participants join, the admin loads a story, both vote, the admin
//! reveals and hands the room over, and the new admin closes it.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_room
//! RUST_LOG=planning_poker_client=debug cargo run --example loopback_room
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use planning_poker_client::protocol::{Invocation, ServerMessage};
use planning_poker_client::{
    loopback_pair, new_room_code, ChannelConfig, Command, DirectMessage, LoopbackTransport,
    IdentityStore, MemoryIdentityStore, Participant, RoomBroadcast, RoomError, RoomSignal, RoomSyncClient,
    SharedChannel, StaticWorkItemLookup, UserIdentity, VotingPack, WorkItem, WorkItemLookup,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// A single-room authority
// ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Room {
    members: Vec<(mpsc::UnboundedSender<String>, Participant)>,
    pack: VotingPack,
    revealed: bool,
}

impl Room {
    fn send(tx: &mpsc::UnboundedSender<String>, message: &ServerMessage) {
        if let Ok(json) = serde_json::to_string(message) {
            let _ = tx.send(json);
        }
    }

    fn broadcast(&self, event: RoomBroadcast) {
        let message = ServerMessage::Broadcast(event);
        for (tx, _) in &self.members {
            Self::send(tx, &message);
        }
    }

    /// Participant list as each member may see it: votes hidden until reveal.
    fn publish_roster(&self) {
        let roster = self
            .members
            .iter()
            .map(|(_, p)| {
                let mut p = p.clone();
                if !self.revealed {
                    p.vote = None;
                }
                p
            })
            .collect();
        self.broadcast(RoomBroadcast::ParticipantListUpdated(roster));
    }

    fn member(&mut self, connection_id: &str) -> Option<&mut Participant> {
        self.members
            .iter_mut()
            .map(|(_, p)| p)
            .find(|p| p.connection_id == connection_id)
    }

    fn is_admin(&self, connection_id: &str) -> bool {
        self.members
            .iter()
            .any(|(_, p)| p.connection_id == connection_id && p.is_admin)
    }

    /// Apply one command; `Err` is sent back as the rejection message.
    fn apply(
        &mut self,
        connection_id: &str,
        tx: &mpsc::UnboundedSender<String>,
        command: &Command,
    ) -> Result<(), String> {
        let admin_only = matches!(
            command,
            Command::ChangeVotingPack { .. }
                | Command::ToggleReveal
                | Command::LoadWorkItem { .. }
                | Command::ClearWorkItem
                | Command::TransferAdmin { .. }
                | Command::DestroyRoom
        );
        if admin_only && !self.is_admin(connection_id) {
            return Err("only the room admin can do that".into());
        }

        match command {
            Command::JoinRoom {
                user_id,
                display_name,
                voting_role,
                ..
            } => {
                let is_admin = self.members.is_empty();
                self.members.push((
                    tx.clone(),
                    Participant {
                        connection_id: connection_id.into(),
                        user_id: user_id.clone(),
                        name: display_name.clone(),
                        is_admin,
                        voting_role: *voting_role,
                        has_voted: false,
                        vote: None,
                    },
                ));
                self.publish_roster();
                // Only the newcomer needs the pack; a room-wide event would clear votes.
                Self::send(
                    tx,
                    &ServerMessage::Broadcast(RoomBroadcast::ActivePackChanged(self.pack)),
                );
                Self::send(tx, &ServerMessage::Direct(DirectMessage::AdminStatus(is_admin)));
            }
            Command::LeaveRoom => {
                self.members.retain(|(_, p)| p.connection_id != connection_id);
                self.publish_roster();
            }
            Command::SubmitVote { value } => {
                if self.revealed {
                    return Err("votes are already revealed".into());
                }
                let pack = self.pack;
                let member = self.member(connection_id).ok_or("not in room")?;
                if !member.voting_role.is_voter() {
                    return Err("observers cannot vote".into());
                }
                if value.as_deref().is_some_and(|v| !pack.contains(v)) {
                    return Err("not in the voting pack".into());
                }
                member.has_voted = value.is_some();
                member.vote = value.clone();
                self.publish_roster();
            }
            Command::ChangeRole { role } => {
                let member = self.member(connection_id).ok_or("not in room")?;
                member.voting_role = *role;
                member.has_voted = false;
                member.vote = None;
                self.publish_roster();
            }
            Command::ChangeVotingPack { pack } => {
                self.pack = *pack;
                self.start_new_round();
                self.broadcast(RoomBroadcast::ActivePackChanged(*pack));
            }
            Command::ToggleReveal => {
                if self.revealed {
                    self.start_new_round();
                    self.broadcast(RoomBroadcast::RevealStateChanged(false));
                } else {
                    if !self.members.iter().any(|(_, p)| p.has_voted) {
                        return Err("nobody has voted yet".into());
                    }
                    self.revealed = true;
                    self.broadcast(RoomBroadcast::RevealStateChanged(true));
                    self.publish_roster();
                }
            }
            Command::ClearWorkItem => self.broadcast(RoomBroadcast::WorkItemChanged(None)),
            Command::TransferAdmin { target_user_id } => {
                if !self.members.iter().any(|(_, p)| &p.user_id == target_user_id) {
                    return Err("target is not in the room".into());
                }
                for (tx, p) in &mut self.members {
                    let is_admin = &p.user_id == target_user_id;
                    if p.is_admin != is_admin {
                        p.is_admin = is_admin;
                        Self::send(tx, &ServerMessage::Direct(DirectMessage::AdminStatus(is_admin)));
                    }
                }
                self.publish_roster();
            }
            Command::DestroyRoom => {
                self.broadcast(RoomBroadcast::RoomDestroyed);
                self.members.clear();
            }
            // Resolved asynchronously by the hub.
            Command::LoadWorkItem { .. } => {}
        }
        Ok(())
    }

    fn start_new_round(&mut self) {
        self.revealed = false;
        for (_, p) in &mut self.members {
            p.has_voted = false;
            p.vote = None;
        }
        self.publish_roster();
    }
}

#[derive(Clone)]
struct DemoHub {
    room: Arc<Mutex<Room>>,
    lookup: Arc<StaticWorkItemLookup>,
    connections: Arc<Mutex<usize>>,
}

impl DemoHub {
    fn new(lookup: StaticWorkItemLookup) -> Self {
        Self {
            room: Arc::default(),
            lookup: Arc::new(lookup),
            connections: Arc::default(),
        }
    }

    fn connect(&self) -> LoopbackTransport {
        let (transport, server) = loopback_pair();
        let connection_id = {
            let mut count = self.connections.lock().unwrap_or_else(|e| e.into_inner());
            *count += 1;
            format!("conn-{count}")
        };

        let hub = self.clone();
        tokio::spawn(async move {
            let mut inbox = server.rx;
            let tx = server.tx;
            while let Some(raw) = inbox.recv().await {
                let Ok(invocation) = serde_json::from_str::<Invocation>(&raw) else {
                    continue;
                };
                let outcome = hub.handle(&connection_id, &tx, &invocation.command).await;
                Room::send(
                    &tx,
                    &ServerMessage::Completion {
                        invocation_id: invocation.invocation_id,
                        error: outcome.err(),
                        error_code: None,
                    },
                );
            }
        });
        transport
    }

    async fn handle(
        &self,
        connection_id: &str,
        tx: &mpsc::UnboundedSender<String>,
        command: &Command,
    ) -> Result<(), String> {
        self.room
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .apply(connection_id, tx, command)?;

        if let Command::LoadWorkItem { item_id } = command {
            let item = self.lookup.fetch(item_id).await.map_err(|e| e.to_string())?;
            self.room
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .broadcast(RoomBroadcast::WorkItemChanged(Some(item)));
        }
        Ok(())
    }

    fn shared_channel(&self) -> SharedChannel<impl planning_poker_client::Connector> {
        let hub = self.clone();
        SharedChannel::new(
            move || {
                let transport = hub.connect();
                async move { Ok::<_, RoomError>(transport) }
            },
            ChannelConfig::new(),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────
// The round
// ─────────────────────────────────────────────────────────────────────

fn print_view(who: &str, room: &RoomSyncClient) {
    let view = room.view();
    let roster: Vec<String> = view
        .participants()
        .iter()
        .map(|p| {
            let badge = if p.is_admin { "*" } else { "" };
            let vote = match (&p.vote, p.has_voted) {
                (Some(v), _) => v.clone(),
                (None, true) => "✓".into(),
                (None, false) => "·".into(),
            };
            format!("{badge}{}={vote}", p.name)
        })
        .collect();
    println!(
        "{who:>4} | {:?} | {} | mine {:?} | item {:?} | {}",
        view.phase,
        view.active_pack().map_or("unknown", |p| p.id()),
        view.selected_vote,
        view.loaded_work_item().map(|w| w.title.as_str()),
        roster.join(" "),
    );
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let lookup = StaticWorkItemLookup::new()
        .with_latency(Duration::from_millis(200))
        .with_item(WorkItem {
            id: "1234".into(),
            kind: "User Story".into(),
            title: "Export estimates as CSV".into(),
            url: "https://tracker.example/items/1234".into(),
            description_html: "<p>So that results can be shared.</p>".into(),
        });
    let hub = DemoHub::new(lookup);
    let room_id = new_room_code();
    println!("room {room_id}");

    // Each participant is its own "browser" with its own shared channel.
    let ana_channel = hub.shared_channel();
    let bia_channel = hub.shared_channel();
    let ana_identity = Arc::new(MemoryIdentityStore::new(UserIdentity::new("Ana")));
    let bia_identity = Arc::new(MemoryIdentityStore::new(UserIdentity::new("Bia")));
    let bia_user_id = bia_identity.load().user_id;

    let (ana, _ana_signals) =
        RoomSyncClient::mount(&ana_channel, ana_identity, Some(&room_id)).await?;
    let (bia, mut bia_signals) =
        RoomSyncClient::mount(&bia_channel, bia_identity, Some(&room_id)).await?;
    settle().await;
    print_view("ana", &ana);

    ana.load_work_item("1234").await?;
    print_view("ana", &ana);
    tokio::time::sleep(Duration::from_millis(300)).await;
    print_view("ana", &ana);

    if let Err(e) = ana.load_work_item("missing").await {
        println!("lookup failed as expected: {e}");
    }

    ana.submit_vote("5").await?;
    bia.submit_vote("8").await?;
    bia.submit_vote("8").await?;
    bia.submit_vote("5").await?;
    settle().await;
    print_view("bia", &bia);

    ana.toggle_reveal().await?;
    settle().await;
    print_view("ana", &ana);
    if let Some(summary) = ana.view().snapshot.and_then(|s| s.vote_summary()) {
        println!("estimate: {} from {} votes", summary.most_common, summary.total);
    }

    ana.transfer_admin(&bia_user_id).await?;
    settle().await;
    println!("admins: ana={} bia={}", ana.is_admin(), bia.is_admin());

    bia.destroy_room().await?;
    while let Some(signal) = bia_signals.recv().await {
        if let RoomSignal::Exit(reason) = signal {
            println!("bia exits: {reason:?}");
            break;
        }
    }

    ana.unmount().await;
    bia.unmount().await;
    Ok(())
}
