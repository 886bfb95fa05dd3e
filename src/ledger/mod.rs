//! Persisted match records and the folds that derive scores from them
//!
//! A [`MatchLedger`] is everything stored for one match, loaded as a single
//! consistent snapshot. Points are the source of truth; game, set and result
//! records are completion markers written alongside them.

mod fold;

pub use fold::{PlayerMatchStats, ScoreBoard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::{MatchFormat, Participants, PointOutcome};

/// Match configuration and lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: Uuid,
    pub competition_id: Uuid,
    pub participants: Participants,
    pub format: MatchFormat,
    pub initial_server: Uuid,
    pub started_at: DateTime<Utc>,
    /// Set together with `winner`, exactly once
    pub ended_at: Option<DateTime<Utc>>,
    pub winner: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRecord {
    pub id: Uuid,
    pub match_id: Uuid,
    pub number: u32,
    pub winner: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: Uuid,
    pub match_id: Uuid,
    pub set_id: Uuid,
    pub set_number: u32,
    pub number: u32,
    pub server: Uuid,
    pub receiver: Uuid,
    pub winner: Option<Uuid>,
}

/// Uniqueness key of a point: its game (hierarchical) or the match (flat) plus its number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointKey {
    pub game_id: Option<Uuid>,
    pub number: u32,
}

impl PointKey {
    pub fn flat(number: u32) -> Self {
        Self {
            game_id: None,
            number,
        }
    }

    pub fn in_game(game_id: Uuid, number: u32) -> Self {
        Self {
            game_id: Some(game_id),
            number,
        }
    }
}

/// One point; `outcome` is empty while the point is open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRecord {
    pub match_id: Uuid,
    pub game_id: Option<Uuid>,
    pub number: u32,
    pub server: Uuid,
    pub receiver: Uuid,
    pub outcome: Option<PointOutcome>,
}

impl PointRecord {
    pub fn key(&self) -> PointKey {
        PointKey {
            game_id: self.game_id,
            number: self.number,
        }
    }

    pub fn winner(&self) -> Option<Uuid> {
        self.outcome.map(|o| o.winner)
    }

    pub fn is_open(&self) -> bool {
        self.outcome.is_none()
    }
}

/// Terminal record binding a match to its winner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub match_id: Uuid,
    pub winner: Uuid,
    pub recorded_at: DateTime<Utc>,
}

/// Snapshot of every record belonging to one match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchLedger {
    pub record: MatchRecord,
    pub sets: Vec<SetRecord>,
    pub games: Vec<GameRecord>,
    pub points: Vec<PointRecord>,
    pub result: Option<MatchResult>,
}

impl MatchLedger {
    pub fn new(record: MatchRecord) -> Self {
        Self {
            record,
            sets: Vec::new(),
            games: Vec::new(),
            points: Vec::new(),
            result: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.record.id
    }

    pub fn is_complete(&self) -> bool {
        self.record.ended_at.is_some()
    }

    pub fn game(&self, id: Uuid) -> Option<&GameRecord> {
        self.games.iter().find(|g| g.id == id)
    }

    pub fn set(&self, id: Uuid) -> Option<&SetRecord> {
        self.sets.iter().find(|s| s.id == id)
    }

    pub fn point(&self, key: PointKey) -> Option<&PointRecord> {
        self.points.iter().find(|p| p.key() == key)
    }
}

/// Lightweight view of a match for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub match_id: Uuid,
    pub competition_id: Uuid,
    pub participants: Participants,
    pub format: MatchFormat,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub winner: Option<Uuid>,
}

impl From<&MatchLedger> for MatchSummary {
    fn from(ledger: &MatchLedger) -> Self {
        let record = &ledger.record;
        Self {
            match_id: record.id,
            competition_id: record.competition_id,
            participants: record.participants,
            format: record.format,
            started_at: record.started_at,
            ended_at: record.ended_at,
            winner: record.winner,
        }
    }
}
