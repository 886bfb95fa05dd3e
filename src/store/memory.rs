//! In-memory match store and roster

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{LedgerWrite, MatchStore, Player, Roster, StoreError, WriteBatch};
use crate::ledger::MatchLedger;

/// Process-local store backing both persistence seams
///
/// Commits run under one write lock against a cloned ledger that only
/// replaces the stored one when every write succeeded.
#[derive(Default)]
pub struct InMemoryStore {
    matches: RwLock<HashMap<Uuid, MatchLedger>>,
    players: DashMap<Uuid, Player>,
    competitions: DashMap<Uuid, Vec<Uuid>>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player to the roster
    pub fn register_player(&self, first_name: &str, last_name: &str) -> Player {
        let player = Player {
            id: Uuid::new_v4(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        };
        self.players.insert(player.id, player.clone());
        player
    }

    /// Create a competition with the given members
    pub fn register_competition(&self, members: &[Uuid]) -> Uuid {
        let id = Uuid::new_v4();
        self.competitions.insert(id, members.to_vec());
        id
    }

    pub fn join_competition(&self, competition_id: Uuid, player_id: Uuid) -> bool {
        match self.competitions.get_mut(&competition_id) {
            Some(mut members) => {
                if !members.contains(&player_id) {
                    members.push(player_id);
                }
                true
            }
            None => false,
        }
    }

    /// Make every subsequent commit fail with `Unavailable` until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn match_count(&self) -> usize {
        self.matches.read().len()
    }
}

#[async_trait]
impl MatchStore for InMemoryStore {
    async fn load_match(&self, match_id: Uuid) -> Result<Option<MatchLedger>, StoreError> {
        Ok(self.matches.read().get(&match_id).cloned())
    }

    async fn load_competition(&self, competition_id: Uuid) -> Result<Vec<MatchLedger>, StoreError> {
        Ok(self
            .matches
            .read()
            .values()
            .filter(|l| l.record.competition_id == competition_id)
            .cloned()
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".into(),
            ));
        }

        let mut matches = self.matches.write();

        let (mut working, writes) = match matches.get(&batch.match_id) {
            Some(existing) => (existing.clone(), &batch.writes[..]),
            None => match batch.writes.split_first() {
                Some((LedgerWrite::InsertMatch(record), rest)) if record.id == batch.match_id => {
                    (MatchLedger::new(record.clone()), rest)
                }
                _ => {
                    return Err(StoreError::MissingRecord(format!(
                        "match {}",
                        batch.match_id
                    )))
                }
            },
        };

        for write in writes {
            write.apply_to(&mut working)?;
        }

        matches.insert(batch.match_id, working);
        Ok(())
    }
}

#[async_trait]
impl Roster for InMemoryStore {
    async fn player(&self, id: Uuid) -> Result<Option<Player>, StoreError> {
        Ok(self.players.get(&id).map(|p| p.value().clone()))
    }

    async fn competition_members(
        &self,
        competition_id: Uuid,
    ) -> Result<Option<Vec<Uuid>>, StoreError> {
        Ok(self
            .competitions
            .get(&competition_id)
            .map(|m| m.value().clone()))
    }
}
