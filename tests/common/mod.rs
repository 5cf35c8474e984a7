#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for room client integration tests.
//!
//! [`TestHub`] is an in-process stand-in for the room authority. Every client
//! connection gets a loopback transport; the hub records each invocation,
//! acknowledges it (or rejects / withholds the ack when told to), keeps a
//! minimal roster so joins produce a participant list, and lets tests push
//! arbitrary broadcasts and direct messages.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use planning_poker_client::protocol::{Invocation, ServerMessage};
use planning_poker_client::{
    loopback_pair, ChannelConfig, Command, Connector, DirectMessage, IdentityStore,
    LoopbackServer, LoopbackTransport, MemoryIdentityStore, MessagingChannel, Participant,
    RoomBroadcast, RoomError, RoomSignal, RoomSyncClient, UserIdentity, VotingRole,
};
use tokio::sync::mpsc;

pub const ROOM: &str = "a1b2c3";

/// Index of a client connection on the hub, in connection order.
pub type ConnId = usize;

// ── TestHub ─────────────────────────────────────────────────────────

#[derive(Default)]
struct HubState {
    /// Frame senders per connection; `None` once disconnected.
    clients: Vec<Option<mpsc::UnboundedSender<String>>>,
    /// Every invocation received, in arrival order.
    log: Vec<(ConnId, Command)>,
    rejections: HashMap<&'static str, String>,
    withheld: HashSet<&'static str>,
    roster: Vec<(ConnId, Participant)>,
}

impl HubState {
    fn push(&self, conn: ConnId, message: &ServerMessage) {
        let json = serde_json::to_string(message).unwrap();
        if let Some(Some(tx)) = self.clients.get(conn) {
            let _ = tx.send(json);
        }
    }

    fn push_all(&self, message: &ServerMessage) {
        for conn in 0..self.clients.len() {
            self.push(conn, message);
        }
    }

    fn roster_broadcast(&self) {
        let participants = self.roster.iter().map(|(_, p)| p.clone()).collect();
        self.push_all(&ServerMessage::Broadcast(
            RoomBroadcast::ParticipantListUpdated(participants),
        ));
    }

    fn handle(&mut self, conn: ConnId, invocation: Invocation) {
        let name = invocation.command.name();
        self.log.push((conn, invocation.command.clone()));
        if self.withheld.contains(name) {
            return;
        }

        let rejection = self.rejections.get(name).cloned();
        if rejection.is_none() {
            match &invocation.command {
                Command::JoinRoom {
                    user_id,
                    display_name,
                    voting_role,
                    ..
                } => {
                    let first = self.roster.is_empty();
                    self.roster.push((
                        conn,
                        Participant {
                            connection_id: format!("conn-{conn}"),
                            user_id: user_id.clone(),
                            name: display_name.clone(),
                            is_admin: first,
                            voting_role: *voting_role,
                            has_voted: false,
                            vote: None,
                        },
                    ));
                    self.roster_broadcast();
                    if first {
                        self.push(conn, &ServerMessage::Direct(DirectMessage::AdminStatus(true)));
                    }
                }
                Command::LeaveRoom => {
                    self.roster.retain(|(c, _)| *c != conn);
                    self.roster_broadcast();
                }
                _ => {}
            }
        }

        self.push(
            conn,
            &ServerMessage::Completion {
                invocation_id: invocation.invocation_id,
                error: rejection,
                error_code: None,
            },
        );
    }
}

/// Scripted room authority shared by every client in a test.
#[derive(Clone, Default)]
pub struct TestHub {
    state: Arc<StdMutex<HubState>>,
}

impl TestHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new client connection; must be called inside a tokio runtime.
    pub fn connect(&self) -> (LoopbackTransport, ConnId) {
        let (transport, server) = loopback_pair();
        let LoopbackServer { rx: mut inbox, tx } = server;
        let conn = {
            let mut state = self.state.lock().unwrap();
            state.clients.push(Some(tx));
            state.clients.len() - 1
        };

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            while let Some(raw) = inbox.recv().await {
                let invocation: Invocation = serde_json::from_str(&raw).unwrap();
                state.lock().unwrap().handle(conn, invocation);
            }
        });
        (transport, conn)
    }

    /// A [`Connector`] that opens a fresh hub connection on every call.
    pub fn connector(&self) -> impl Connector<Output = LoopbackTransport> {
        let hub = self.clone();
        move || {
            let (transport, _) = hub.connect();
            async move { Ok::<_, RoomError>(transport) }
        }
    }

    /// Start a messaging channel on a new connection.
    pub fn channel(&self) -> (Arc<MessagingChannel>, ConnId) {
        let (transport, conn) = self.connect();
        let config = ChannelConfig::new().with_invoke_timeout(Duration::from_millis(300));
        (MessagingChannel::start(transport, config), conn)
    }

    /// Reject every later `command` with `message`.
    pub fn reject(&self, command: &'static str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .rejections
            .insert(command, message.into());
    }

    /// Accept `command` again.
    pub fn accept(&self, command: &'static str) {
        self.state.lock().unwrap().rejections.remove(command);
    }

    /// Never acknowledge `command`.
    pub fn withhold(&self, command: &'static str) {
        self.state.lock().unwrap().withheld.insert(command);
    }

    pub fn broadcast(&self, event: RoomBroadcast) {
        self.state
            .lock()
            .unwrap()
            .push_all(&ServerMessage::Broadcast(event));
    }

    pub fn direct(&self, conn: ConnId, message: DirectMessage) {
        self.state
            .lock()
            .unwrap()
            .push(conn, &ServerMessage::Direct(message));
    }

    /// Close the connection from the authority side.
    pub fn disconnect(&self, conn: ConnId) {
        if let Some(slot) = self.state.lock().unwrap().clients.get_mut(conn) {
            *slot = None;
        }
    }

    /// Commands received from `conn`, in order.
    pub fn commands(&self, conn: ConnId) -> Vec<Command> {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|(c, _)| *c == conn)
            .map(|(_, command)| command.clone())
            .collect()
    }

    /// Names of commands received from `conn`, in order.
    pub fn command_names(&self, conn: ConnId) -> Vec<&'static str> {
        self.commands(conn).iter().map(Command::name).collect()
    }

    /// Wait until `conn` has sent a command named `name`.
    pub async fn wait_for_command(&self, conn: ConnId, name: &str) -> Command {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(command) = self
                    .commands(conn)
                    .into_iter()
                    .rev()
                    .find(|c| c.name() == name)
                {
                    return command;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("connection {conn} never sent {name}"))
    }
}

// ── Client helpers ──────────────────────────────────────────────────

/// A mounted room client plus everything a test needs to drive it.
pub struct Mounted {
    pub room: RoomSyncClient,
    pub signals: mpsc::UnboundedReceiver<RoomSignal>,
    pub identity: Arc<MemoryIdentityStore>,
    pub conn: ConnId,
}

impl Mounted {
    pub fn user_id(&self) -> String {
        self.identity.load().user_id
    }

    /// Wait for the first signal matching `pred`, skipping others.
    pub async fn wait_signal(&mut self, pred: impl Fn(&RoomSignal) -> bool) -> RoomSignal {
        wait_signal(&mut self.signals, pred).await
    }
}

/// Mount a voter named `name` on a fresh hub connection.
pub async fn mount(hub: &TestHub, name: &str) -> Mounted {
    mount_as(hub, UserIdentity::new(name)).await
}

pub async fn mount_as(hub: &TestHub, identity: UserIdentity) -> Mounted {
    let identity = Arc::new(MemoryIdentityStore::new(identity));
    let (channel, conn) = hub.channel();
    let (room, mut signals) = RoomSyncClient::mount_on(channel, identity.clone(), Some(ROOM))
        .await
        .expect("mount");
    // Join-time events were dispatched before the join completed.
    while signals.try_recv().is_ok() {}
    Mounted {
        room,
        signals,
        identity,
        conn,
    }
}

pub async fn wait_signal(
    signals: &mut mpsc::UnboundedReceiver<RoomSignal>,
    pred: impl Fn(&RoomSignal) -> bool,
) -> RoomSignal {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let signal = signals.recv().await.expect("signal stream ended");
            if pred(&signal) {
                return signal;
            }
        }
    })
    .await
    .expect("timed out waiting for signal")
}

// ── Fixtures ────────────────────────────────────────────────────────

pub fn participant(user_id: &str, name: &str) -> Participant {
    Participant {
        connection_id: format!("conn-{user_id}"),
        user_id: user_id.into(),
        name: name.into(),
        is_admin: false,
        voting_role: VotingRole::Voter,
        has_voted: false,
        vote: None,
    }
}

pub fn voted(mut participant: Participant, vote: Option<&str>) -> Participant {
    participant.has_voted = true;
    participant.vote = vote.map(Into::into);
    participant
}
