//! Voting packs: the value sets a room can vote with.

use serde::{Deserialize, Serialize};
use std::fmt;

const FIBONACCI: &[&str] = &["0", "1", "2", "3", "5", "8", "13", "21", "?", "☕"];
const SEQUENTIAL: &[&str] = &["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];
const TSHIRT: &[&str] = &["XS", "S", "M", "L", "XL", "XXL", "?"];

/// The voting pack active in a room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum VotingPack {
    /// Modified Fibonacci sequence plus "unsure" and "break" cards.
    #[default]
    Fibonacci,
    /// Plain 0–9 sequence.
    #[serde(alias = "sequencial")]
    Sequential,
    /// T-shirt sizes.
    Tshirt,
}

impl VotingPack {
    /// Every pack, in the order a picker should list them.
    pub const ALL: [VotingPack; 3] = [Self::Fibonacci, Self::Sequential, Self::Tshirt];

    /// The card values of this pack, in display order.
    pub fn values(self) -> &'static [&'static str] {
        match self {
            Self::Fibonacci => FIBONACCI,
            Self::Sequential => SEQUENTIAL,
            Self::Tshirt => TSHIRT,
        }
    }

    /// Returns `true` if `value` is one of this pack's cards.
    pub fn contains(self, value: &str) -> bool {
        self.values().contains(&value)
    }

    /// Position of `value` within the pack, used to order summaries.
    pub fn position(self, value: &str) -> Option<usize> {
        self.values().iter().position(|v| *v == value)
    }

    /// Wire identifier of the pack.
    pub fn id(self) -> &'static str {
        match self {
            Self::Fibonacci => "fibonacci",
            Self::Sequential => "sequential",
            Self::Tshirt => "tshirt",
        }
    }

    /// Human-readable pack name.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Fibonacci => "Fibonacci",
            Self::Sequential => "Sequential",
            Self::Tshirt => "T-Shirt Sizes",
        }
    }
}

impl fmt::Display for VotingPack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
