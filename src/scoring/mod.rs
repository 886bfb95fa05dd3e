//! Scoring rules engine and the value types it decides over

pub mod format;
pub mod rules;

pub use format::{FormatInput, MatchFormat};
pub use rules::{decide, Decision, ScopeSeed};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two players of a match, in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participants {
    pub first: Uuid,
    pub second: Uuid,
}

impl Participants {
    pub fn new(first: Uuid, second: Uuid) -> Self {
        Self { first, second }
    }

    pub fn contains(&self, player: Uuid) -> bool {
        self.first == player || self.second == player
    }

    /// The opponent of `player`, if `player` is in this match
    pub fn opponent(&self, player: Uuid) -> Option<Uuid> {
        if player == self.first {
            Some(self.second)
        } else if player == self.second {
            Some(self.first)
        } else {
            None
        }
    }

    pub fn as_array(&self) -> [Uuid; 2] {
        [self.first, self.second]
    }
}

/// Per-player win counts within one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub players: [Uuid; 2],
    pub counts: [u32; 2],
}

impl Tally {
    pub fn new(participants: Participants) -> Self {
        Self {
            players: participants.as_array(),
            counts: [0, 0],
        }
    }

    fn slot(&self, player: Uuid) -> Option<usize> {
        self.players.iter().position(|p| *p == player)
    }

    pub fn of(&self, player: Uuid) -> u32 {
        self.slot(player).map(|i| self.counts[i]).unwrap_or(0)
    }

    /// Count one more win for `player`; ignored for non-participants
    pub fn increment(&mut self, player: Uuid) {
        if let Some(i) = self.slot(player) {
            self.counts[i] += 1;
        }
    }

    pub fn with_win(mut self, player: Uuid) -> Self {
        self.increment(player);
        self
    }

    /// Signed lead of `player` over the other slot
    pub fn lead(&self, player: Uuid) -> i64 {
        match self.slot(player) {
            Some(i) => i64::from(self.counts[i]) - i64::from(self.counts[1 - i]),
            None => 0,
        }
    }

    pub fn total(&self) -> u32 {
        self.counts[0] + self.counts[1]
    }

    pub fn reset(self) -> Self {
        Self {
            players: self.players,
            counts: [0, 0],
        }
    }
}

/// What happened on a single point, as reported by the scorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PointOutcome {
    pub winner: Uuid,
    #[serde(default)]
    pub faults: u32,
    #[serde(default)]
    pub lets: u32,
    #[serde(default)]
    pub ace: bool,
    #[serde(default)]
    pub unforced_error: bool,
}

impl PointOutcome {
    pub fn won_by(winner: Uuid) -> Self {
        Self {
            winner,
            ..Self::default()
        }
    }

    /// Two faults on one point
    pub fn is_double_fault(&self) -> bool {
        self.faults > 1
    }
}

/// Snapshot of the open scope, folded from the ledger before a point is applied
///
/// In flat mode `set_number`/`game_number` stay at 1 and `games`/`sets` stay zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringState {
    pub point_number: u32,
    pub server: Uuid,
    pub receiver: Uuid,
    pub set_number: u32,
    pub game_number: u32,
    pub points: Tally,
    pub games: Tally,
    pub sets: Tally,
}

impl ScoringState {
    /// State of a freshly created match
    pub fn opening(participants: Participants, server: Uuid) -> Self {
        let receiver = participants.opponent(server).unwrap_or(participants.second);
        let empty = Tally::new(participants);
        Self {
            point_number: 1,
            server,
            receiver,
            set_number: 1,
            game_number: 1,
            points: empty,
            games: empty,
            sets: empty,
        }
    }
}
