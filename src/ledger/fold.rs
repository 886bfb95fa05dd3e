//! Read-side folds over a match ledger
//!
//! Both the scoring decision and every reported score go through these, so
//! what the controller decides on and what callers see cannot drift apart.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{GameRecord, MatchLedger, PointRecord, SetRecord};
use crate::scoring::{ScoringState, Tally};

/// Win counts of the open scope (or the final scope of a finished match)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBoard {
    pub points: Tally,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub games: Option<Tally>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sets: Option<Tally>,
}

impl ScoreBoard {
    /// Board for the scope described by `state`
    pub fn from_state(state: &ScoringState, hierarchical: bool) -> Self {
        Self {
            points: state.points,
            games: hierarchical.then_some(state.games),
            sets: hierarchical.then_some(state.sets),
        }
    }
}

/// Per-player point statistics for one match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerMatchStats {
    pub player: Uuid,
    pub faults: u32,
    pub double_faults: u32,
    pub lets: u32,
    pub aces: u32,
    pub unforced_errors: u32,
}

impl PlayerMatchStats {
    pub fn empty(player: Uuid) -> Self {
        Self {
            player,
            faults: 0,
            double_faults: 0,
            lets: 0,
            aces: 0,
            unforced_errors: 0,
        }
    }
}

impl MatchLedger {
    /// The point waiting for an outcome; `None` once the match has ended
    pub fn open_point(&self) -> Option<&PointRecord> {
        self.points.iter().find(|p| p.is_open())
    }

    /// Play order of a point across games and sets
    fn point_order(&self, point: &PointRecord) -> (u32, u32, u32) {
        match point.game_id.and_then(|id| self.game(id)) {
            Some(game) => (game.set_number, game.number, point.number),
            None => (0, 0, point.number),
        }
    }

    pub fn last_scored_point(&self) -> Option<&PointRecord> {
        self.points
            .iter()
            .filter(|p| !p.is_open())
            .max_by_key(|p| self.point_order(p))
    }

    /// The game in play, or the final game of a finished match
    pub fn current_game(&self) -> Option<&GameRecord> {
        self.games
            .iter()
            .find(|g| g.winner.is_none())
            .or_else(|| self.games.iter().max_by_key(|g| (g.set_number, g.number)))
    }

    /// The set in play, or the final set of a finished match
    pub fn current_set(&self) -> Option<&SetRecord> {
        self.sets
            .iter()
            .find(|s| s.winner.is_none())
            .or_else(|| self.sets.iter().max_by_key(|s| s.number))
    }

    fn empty_tally(&self) -> Tally {
        Tally::new(self.record.participants)
    }

    /// Points won inside one game (`Some`) or the whole flat match (`None`)
    fn points_won(&self, game_id: Option<Uuid>) -> Tally {
        self.points
            .iter()
            .filter(|p| p.game_id == game_id)
            .filter_map(PointRecord::winner)
            .fold(self.empty_tally(), Tally::with_win)
    }

    fn games_won(&self, set_id: Uuid) -> Tally {
        self.games
            .iter()
            .filter(|g| g.set_id == set_id)
            .filter_map(|g| g.winner)
            .fold(self.empty_tally(), Tally::with_win)
    }

    fn sets_won(&self) -> Tally {
        self.sets
            .iter()
            .filter_map(|s| s.winner)
            .fold(self.empty_tally(), Tally::with_win)
    }

    /// Fold the open scope into the engine's input, `None` when nothing is open
    pub fn scoring_state(&self) -> Option<ScoringState> {
        let open = self.open_point()?;

        if self.record.format.is_hierarchical() {
            let game = self.game(open.game_id?)?;
            Some(ScoringState {
                point_number: open.number,
                server: open.server,
                receiver: open.receiver,
                set_number: game.set_number,
                game_number: game.number,
                points: self.points_won(Some(game.id)),
                games: self.games_won(game.set_id),
                sets: self.sets_won(),
            })
        } else {
            Some(ScoringState {
                point_number: open.number,
                server: open.server,
                receiver: open.receiver,
                set_number: 1,
                game_number: 1,
                points: self.points_won(None),
                games: self.empty_tally(),
                sets: self.empty_tally(),
            })
        }
    }

    pub fn score_board(&self) -> ScoreBoard {
        if !self.record.format.is_hierarchical() {
            return ScoreBoard {
                points: self.points_won(None),
                games: None,
                sets: None,
            };
        }

        let points = self
            .current_game()
            .map(|g| self.points_won(Some(g.id)))
            .unwrap_or_else(|| self.empty_tally());
        let games = self
            .current_set()
            .map(|s| self.games_won(s.id))
            .unwrap_or_else(|| self.empty_tally());

        ScoreBoard {
            points,
            games: Some(games),
            sets: Some(self.sets_won()),
        }
    }

    /// Serve-side counters go to the point's server, unforced errors to the point's loser
    pub fn player_stats(&self) -> [PlayerMatchStats; 2] {
        let participants = self.record.participants;
        let mut stats = [
            PlayerMatchStats::empty(participants.first),
            PlayerMatchStats::empty(participants.second),
        ];

        for point in &self.points {
            let Some(outcome) = point.outcome else {
                continue;
            };

            if let Some(server) = stats.iter_mut().find(|s| s.player == point.server) {
                server.faults += outcome.faults;
                server.lets += outcome.lets;
                if outcome.is_double_fault() {
                    server.double_faults += 1;
                }
                if outcome.ace {
                    server.aces += 1;
                }
            }

            if outcome.unforced_error {
                let loser = participants.opponent(outcome.winner);
                if let Some(loser) = stats.iter_mut().find(|s| Some(s.player) == loser) {
                    loser.unforced_errors += 1;
                }
            }
        }

        stats
    }
}
