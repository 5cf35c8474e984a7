//! The reconciled room view held by the synchronization client.

use uuid::Uuid;

use crate::pack::VotingPack;
use crate::protocol::{Participant, RoomId, WorkItem};

/// Phase of the current estimation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundPhase {
    /// Votes are hidden; voters may pick a card.
    #[default]
    Collecting,
    /// Votes are visible to everyone.
    Revealed,
}

/// Authoritative room state as last reported by the authority.
///
/// `participants` is replaced wholesale on every participant-list event and
/// keeps the authority's order; the other fields are patched by their own
/// narrower events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub participants: Vec<Participant>,
    /// `None` until the first `active-pack-changed` event names it.
    pub active_pack: Option<VotingPack>,
    pub is_revealed: bool,
    pub loaded_work_item: Option<WorkItem>,
}

impl RoomSnapshot {
    /// An empty snapshot for a freshly mounted room.
    pub fn empty(room_id: impl Into<RoomId>) -> Self {
        Self {
            room_id: room_id.into(),
            participants: Vec::new(),
            active_pack: None,
            is_revealed: false,
            loaded_work_item: None,
        }
    }

    pub fn phase(&self) -> RoundPhase {
        if self.is_revealed {
            RoundPhase::Revealed
        } else {
            RoundPhase::Collecting
        }
    }

    /// The entry for `user_id`, if that user is connected.
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    /// The participant currently holding admin rights, if any.
    pub fn admin(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_admin)
    }

    pub fn voters(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.voting_role.is_voter())
    }

    pub fn observers(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| !p.voting_role.is_voter())
    }

    /// Returns `true` if at least one voter has voted this round.
    pub fn any_voter_has_voted(&self) -> bool {
        self.voters().any(|p| p.has_voted)
    }

    /// Returns `true` if every voter has voted (and there is at least one).
    pub fn all_voters_have_voted(&self) -> bool {
        let mut voters = self.voters().peekable();
        voters.peek().is_some() && voters.all(|p| p.has_voted)
    }

    /// Tally of the revealed round. `None` while votes are hidden or when no
    /// voter cast a vote.
    pub fn vote_summary(&self) -> Option<VoteSummary> {
        if !self.is_revealed {
            return None;
        }

        let mut distribution: Vec<(String, usize)> = Vec::new();
        for vote in self.voters().filter_map(|p| p.vote.as_deref()) {
            match distribution.iter_mut().find(|(value, _)| value == vote) {
                Some((_, count)) => *count += 1,
                None => distribution.push((vote.to_string(), 1)),
            }
        }
        if distribution.is_empty() {
            return None;
        }

        let position = |value: &str| {
            self.active_pack
                .and_then(|pack| pack.position(value))
                .unwrap_or(usize::MAX)
        };
        distribution.sort_by(|(a, a_count), (b, b_count)| {
            b_count.cmp(a_count).then_with(|| {
                position(a).cmp(&position(b)).then_with(|| a.cmp(b))
            })
        });

        let total = distribution.iter().map(|(_, count)| count).sum();
        let most_common = distribution.first().map(|(value, _)| value.clone())?;
        Some(VoteSummary {
            total,
            most_common,
            distribution,
        })
    }
}

/// Results of a revealed round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteSummary {
    /// Number of votes cast by voters.
    pub total: usize,
    /// Most frequent value; ties go to the value listed first in the pack.
    pub most_common: String,
    /// `(value, count)` pairs, most frequent first.
    pub distribution: Vec<(String, usize)>,
}

/// A random room code: six lowercase hex characters.
///
/// Only generates an id; joining it is up to the caller.
pub fn new_room_code() -> RoomId {
    Uuid::new_v4().simple().to_string().chars().take(6).collect()
}
