//! Persistence seams consumed by the scoring core
//!
//! The core never talks to a database directly. It loads whole-match
//! snapshots through [`MatchStore`] and hands back a [`WriteBatch`] that the
//! store must apply atomically, enforcing point uniqueness as it goes.

pub mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::{
    GameRecord, MatchLedger, MatchRecord, MatchResult, PointKey, PointRecord, SetRecord,
};
use crate::scoring::PointOutcome;

/// Persistence collaborator for match ledgers
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Load every record of one match as a single consistent snapshot
    async fn load_match(&self, match_id: Uuid) -> Result<Option<MatchLedger>, StoreError>;

    /// Load the ledgers of all matches played in a competition
    async fn load_competition(&self, competition_id: Uuid) -> Result<Vec<MatchLedger>, StoreError>;

    /// Apply every write in `batch` or none of them
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// Player record as supplied by the roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

/// Roster collaborator: player identity and competition membership
#[async_trait]
pub trait Roster: Send + Sync {
    async fn player(&self, id: Uuid) -> Result<Option<Player>, StoreError>;

    /// Registered members, or `None` for an unknown competition
    async fn competition_members(&self, competition_id: Uuid)
        -> Result<Option<Vec<Uuid>>, StoreError>;
}

/// A single mutation of a match ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LedgerWrite {
    InsertMatch(MatchRecord),
    InsertSet(SetRecord),
    InsertGame(GameRecord),
    InsertPoint(PointRecord),
    ScorePoint { key: PointKey, outcome: PointOutcome },
    ClearPoint(PointKey),
    RemovePoint(PointKey),
    CloseGame { game_id: Uuid, winner: Uuid },
    ReopenGame(Uuid),
    RemoveGame(Uuid),
    CloseSet { set_id: Uuid, winner: Uuid },
    ReopenSet(Uuid),
    RemoveSet(Uuid),
    FinishMatch(MatchResult),
    ReopenMatch,
}

/// Ordered writes against one match, committed as a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    pub match_id: Uuid,
    pub writes: Vec<LedgerWrite>,
}

impl WriteBatch {
    pub fn new(match_id: Uuid) -> Self {
        Self {
            match_id,
            writes: Vec::new(),
        }
    }

    pub fn push(&mut self, write: LedgerWrite) -> &mut Self {
        self.writes.push(write);
        self
    }
}

impl LedgerWrite {
    /// Apply this write to a working copy of `ledger`, enforcing uniqueness
    /// and single assignment. On error the copy must be discarded.
    pub fn apply_to(&self, ledger: &mut MatchLedger) -> Result<(), StoreError> {
        let match_id = ledger.id();
        match self {
            LedgerWrite::InsertMatch(record) => {
                return Err(StoreError::UniqueViolation(format!(
                    "match {} already exists",
                    record.id
                )));
            }
            LedgerWrite::InsertSet(set) => {
                if ledger.sets.iter().any(|s| s.id == set.id || s.number == set.number) {
                    return Err(StoreError::UniqueViolation(format!(
                        "set {} already exists in match {}",
                        set.number, match_id
                    )));
                }
                ledger.sets.push(set.clone());
            }
            LedgerWrite::InsertGame(game) => {
                if ledger.set(game.set_id).is_none() {
                    return Err(StoreError::MissingRecord(format!("set {}", game.set_id)));
                }
                if ledger
                    .games
                    .iter()
                    .any(|g| g.id == game.id || (g.set_id == game.set_id && g.number == game.number))
                {
                    return Err(StoreError::UniqueViolation(format!(
                        "game {} already exists in set {}",
                        game.number, game.set_number
                    )));
                }
                ledger.games.push(game.clone());
            }
            LedgerWrite::InsertPoint(point) => {
                if let Some(game_id) = point.game_id {
                    if ledger.game(game_id).is_none() {
                        return Err(StoreError::MissingRecord(format!("game {}", game_id)));
                    }
                }
                if ledger.point(point.key()).is_some() {
                    return Err(StoreError::UniqueViolation(format!(
                        "point {} already exists in match {}",
                        point.number, match_id
                    )));
                }
                if point.is_open() && ledger.open_point().is_some() {
                    return Err(StoreError::UniqueViolation(format!(
                        "match {} already has an open point",
                        match_id
                    )));
                }
                ledger.points.push(point.clone());
            }
            LedgerWrite::ScorePoint { key, outcome } => {
                let point = point_mut(ledger, *key)?;
                if !point.is_open() {
                    return Err(StoreError::UniqueViolation(format!(
                        "point {} of match {} already scored",
                        key.number, match_id
                    )));
                }
                point.outcome = Some(*outcome);
            }
            LedgerWrite::ClearPoint(key) => {
                let point = point_mut(ledger, *key)?;
                if point.is_open() {
                    return Err(StoreError::MissingRecord(format!(
                        "outcome of point {} in match {}",
                        key.number, match_id
                    )));
                }
                point.outcome = None;
            }
            LedgerWrite::RemovePoint(key) => {
                let before = ledger.points.len();
                ledger.points.retain(|p| p.key() != *key);
                if ledger.points.len() == before {
                    return Err(StoreError::MissingRecord(format!(
                        "point {} in match {}",
                        key.number, match_id
                    )));
                }
            }
            LedgerWrite::CloseGame { game_id, winner } => {
                let game = ledger
                    .games
                    .iter_mut()
                    .find(|g| g.id == *game_id)
                    .ok_or_else(|| StoreError::MissingRecord(format!("game {}", game_id)))?;
                if game.winner.is_some() {
                    return Err(StoreError::UniqueViolation(format!(
                        "game {} already has a winner",
                        game_id
                    )));
                }
                game.winner = Some(*winner);
            }
            LedgerWrite::ReopenGame(game_id) => {
                let game = ledger
                    .games
                    .iter_mut()
                    .find(|g| g.id == *game_id)
                    .ok_or_else(|| StoreError::MissingRecord(format!("game {}", game_id)))?;
                game.winner = None;
            }
            LedgerWrite::RemoveGame(game_id) => {
                if ledger.points.iter().any(|p| p.game_id == Some(*game_id)) {
                    return Err(StoreError::UniqueViolation(format!(
                        "game {} still has points",
                        game_id
                    )));
                }
                let before = ledger.games.len();
                ledger.games.retain(|g| g.id != *game_id);
                if ledger.games.len() == before {
                    return Err(StoreError::MissingRecord(format!("game {}", game_id)));
                }
            }
            LedgerWrite::CloseSet { set_id, winner } => {
                let set = ledger
                    .sets
                    .iter_mut()
                    .find(|s| s.id == *set_id)
                    .ok_or_else(|| StoreError::MissingRecord(format!("set {}", set_id)))?;
                if set.winner.is_some() {
                    return Err(StoreError::UniqueViolation(format!(
                        "set {} already has a winner",
                        set_id
                    )));
                }
                set.winner = Some(*winner);
            }
            LedgerWrite::ReopenSet(set_id) => {
                let set = ledger
                    .sets
                    .iter_mut()
                    .find(|s| s.id == *set_id)
                    .ok_or_else(|| StoreError::MissingRecord(format!("set {}", set_id)))?;
                set.winner = None;
            }
            LedgerWrite::RemoveSet(set_id) => {
                if ledger.games.iter().any(|g| g.set_id == *set_id) {
                    return Err(StoreError::UniqueViolation(format!(
                        "set {} still has games",
                        set_id
                    )));
                }
                let before = ledger.sets.len();
                ledger.sets.retain(|s| s.id != *set_id);
                if ledger.sets.len() == before {
                    return Err(StoreError::MissingRecord(format!("set {}", set_id)));
                }
            }
            LedgerWrite::FinishMatch(result) => {
                if ledger.result.is_some() || ledger.record.ended_at.is_some() {
                    return Err(StoreError::UniqueViolation(format!(
                        "match {} already has a result",
                        match_id
                    )));
                }
                ledger.record.ended_at = Some(result.recorded_at);
                ledger.record.winner = Some(result.winner);
                ledger.result = Some(result.clone());
            }
            LedgerWrite::ReopenMatch => {
                ledger.record.ended_at = None;
                ledger.record.winner = None;
                ledger.result = None;
            }
        }
        Ok(())
    }
}

fn point_mut(ledger: &mut MatchLedger, key: PointKey) -> Result<&mut PointRecord, StoreError> {
    let match_id = ledger.id();
    ledger
        .points
        .iter_mut()
        .find(|p| p.key() == key)
        .ok_or_else(|| StoreError::MissingRecord(format!("point {} in match {}", key.number, match_id)))
}

/// Persistence errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Uniqueness violation: {0}")]
    UniqueViolation(String),

    #[error("Missing record: {0}")]
    MissingRecord(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
