//! The canonical scoring decision
//!
//! `decide` is pure: it looks at the format, the folded state of the open
//! scope and the point just played, and says what happens next. Persisting
//! the consequences is the progression controller's job.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MatchFormat, PointOutcome, ScoringState, Tally};

/// Seed for the scope opened after a game (and possibly a set) closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum ScopeSeed {
    /// Next game in the same set; only the current game closed
    Game {
        set_number: u32,
        game_number: u32,
        server: Uuid,
        receiver: Uuid,
    },
    /// First game of the next set; the current game and set closed
    Set {
        set_number: u32,
        server: Uuid,
        receiver: Uuid,
    },
}

impl ScopeSeed {
    pub fn server(&self) -> Uuid {
        match *self {
            ScopeSeed::Game { server, .. } | ScopeSeed::Set { server, .. } => server,
        }
    }

    pub fn receiver(&self) -> Uuid {
        match *self {
            ScopeSeed::Game { receiver, .. } | ScopeSeed::Set { receiver, .. } => receiver,
        }
    }

    pub fn closes_set(&self) -> bool {
        matches!(self, ScopeSeed::Set { .. })
    }
}

/// Outcome of applying one point to the open scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Scope still open; the next point is played under this service
    ContinueScope {
        next_point_number: u32,
        server: Uuid,
        receiver: Uuid,
    },
    /// A game (and possibly its set) closed; play resumes in the seeded scope
    ScopeWon { winner: Uuid, next_scope_seed: ScopeSeed },
    /// Top-level win condition met
    MatchWon { winner: Uuid },
}

/// `player` has reached `minimum` and leads by at least `margin`
fn unit_won(tally: &Tally, player: Uuid, minimum: u32, margin: u32) -> bool {
    tally.of(player) >= minimum && tally.lead(player) >= i64::from(margin)
}

/// Decide what the point described by `outcome` does to the open scope
///
/// `state` must be the fold of everything recorded before this point.
pub fn decide(format: &MatchFormat, state: &ScoringState, outcome: &PointOutcome) -> Decision {
    let winner = outcome.winner;
    let points = state.points.with_win(winner);

    match *format {
        MatchFormat::Flat { min_points, win_by } => {
            if unit_won(&points, winner, min_points, win_by) {
                return Decision::MatchWon { winner };
            }

            // Service changes hands after every even-numbered point
            let (server, receiver) = if state.point_number % 2 == 0 {
                (state.receiver, state.server)
            } else {
                (state.server, state.receiver)
            };

            Decision::ContinueScope {
                next_point_number: state.point_number + 1,
                server,
                receiver,
            }
        }
        MatchFormat::Hierarchical {
            points_per_game,
            games_per_set,
            sets_to_win,
        } => {
            if !unit_won(&points, winner, points_per_game, 1) {
                return Decision::ContinueScope {
                    next_point_number: state.point_number + 1,
                    server: state.server,
                    receiver: state.receiver,
                };
            }

            // Game over: the receiver serves the next game, whichever set it is in
            let (server, receiver) = (state.receiver, state.server);

            let games = state.games.with_win(winner);
            if !unit_won(&games, winner, games_per_set, 1) {
                return Decision::ScopeWon {
                    winner,
                    next_scope_seed: ScopeSeed::Game {
                        set_number: state.set_number,
                        game_number: state.game_number + 1,
                        server,
                        receiver,
                    },
                };
            }

            let sets = state.sets.with_win(winner);
            if sets.of(winner) >= sets_to_win {
                return Decision::MatchWon { winner };
            }

            Decision::ScopeWon {
                winner,
                next_scope_seed: ScopeSeed::Set {
                    set_number: state.set_number + 1,
                    server,
                    receiver,
                },
            }
        }
    }
}

impl ScoringState {
    /// The state of the next open scope once `decision` has been applied,
    /// or `None` when the match is over
    pub fn after(&self, winner: Uuid, decision: &Decision) -> Option<ScoringState> {
        match *decision {
            Decision::ContinueScope {
                next_point_number,
                server,
                receiver,
            } => Some(ScoringState {
                point_number: next_point_number,
                server,
                receiver,
                points: self.points.with_win(winner),
                ..*self
            }),
            Decision::ScopeWon {
                next_scope_seed, ..
            } => {
                let mut next = ScoringState {
                    point_number: 1,
                    server: next_scope_seed.server(),
                    receiver: next_scope_seed.receiver(),
                    points: self.points.reset(),
                    ..*self
                };
                match next_scope_seed {
                    ScopeSeed::Game { game_number, .. } => {
                        next.game_number = game_number;
                        next.games = self.games.with_win(winner);
                    }
                    ScopeSeed::Set { set_number, .. } => {
                        next.set_number = set_number;
                        next.game_number = 1;
                        next.games = self.games.reset();
                        next.sets = self.sets.with_win(winner);
                    }
                }
                Some(next)
            }
            Decision::MatchWon { .. } => None,
        }
    }
}
