//! Read-only aggregates over match ledgers

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ScoringError, ScoringResult};
use crate::ledger::{MatchLedger, MatchSummary, PlayerMatchStats, ScoreBoard};
use crate::store::{MatchStore, Roster};

/// One row of a competition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub player: Uuid,
    pub played: u32,
    pub wins: u32,
    pub losses: u32,
}

impl Standing {
    fn new(player: Uuid) -> Self {
        Self {
            player,
            played: 0,
            wins: 0,
            losses: 0,
        }
    }
}

/// Stats queries; never writes
pub struct StatsAggregator<S> {
    store: Arc<S>,
}

impl<S> Clone for StatsAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S> StatsAggregator<S>
where
    S: MatchStore + Roster,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn load(&self, match_id: Uuid) -> ScoringResult<MatchLedger> {
        self.store
            .load_match(match_id)
            .await?
            .ok_or_else(|| ScoringError::not_found("match", match_id))
    }

    /// Tallies of the open scope (or the final one of a finished match)
    pub async fn current_score(&self, match_id: Uuid) -> ScoringResult<ScoreBoard> {
        Ok(self.load(match_id).await?.score_board())
    }

    /// Per-player counters, in participant order
    pub async fn match_statistics(&self, match_id: Uuid) -> ScoringResult<[PlayerMatchStats; 2]> {
        Ok(self.load(match_id).await?.player_stats())
    }

    pub async fn match_summary(&self, match_id: Uuid) -> ScoringResult<MatchSummary> {
        Ok(MatchSummary::from(&self.load(match_id).await?))
    }

    /// All matches of a competition, oldest first
    pub async fn competition_matches(&self, competition_id: Uuid) -> ScoringResult<Vec<MatchSummary>> {
        let mut matches: Vec<MatchSummary> = self
            .store
            .load_competition(competition_id)
            .await?
            .iter()
            .map(MatchSummary::from)
            .collect();
        matches.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.match_id.cmp(&b.match_id))
        });
        Ok(matches)
    }

    /// Competition table: wins descending, then player id ascending
    ///
    /// Only matches with a result count. Registered members without a
    /// completed match are listed with zeros.
    pub async fn standings(&self, competition_id: Uuid) -> ScoringResult<Vec<Standing>> {
        let ledgers = self.store.load_competition(competition_id).await?;
        let members = self
            .store
            .competition_members(competition_id)
            .await?
            .unwrap_or_default();

        let mut rows: BTreeMap<Uuid, Standing> = members
            .into_iter()
            .map(|player| (player, Standing::new(player)))
            .collect();

        for ledger in &ledgers {
            let Some(result) = &ledger.result else {
                continue;
            };
            for player in ledger.record.participants.as_array() {
                let standing = rows
                    .entry(player)
                    .or_insert_with(|| Standing::new(player));
                standing.played += 1;
                if result.winner == player {
                    standing.wins += 1;
                }
                standing.losses = standing.played - standing.wins;
            }
        }

        let mut table: Vec<Standing> = rows.into_values().collect();
        table.sort_by(|a, b| b.wins.cmp(&a.wins).then_with(|| a.player.cmp(&b.player)));
        Ok(table)
    }
}
