//! Match progression controller
//!
//! Owns every write to a match ledger. Each public operation loads the match
//! snapshot under the match's lock, decides, and commits one [`WriteBatch`].

mod locks;

pub use locks::MatchLocks;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ScoringError, ScoringResult};
use crate::ledger::{
    GameRecord, MatchLedger, MatchRecord, MatchResult, PointKey, PointRecord, ScoreBoard,
    SetRecord,
};
use crate::scoring::{rules, Decision, MatchFormat, Participants, PointOutcome, ScopeSeed};
use crate::store::{LedgerWrite, MatchStore, Roster, WriteBatch};
use crate::util::time::Timer;

/// Everything needed to open a new match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSetup {
    pub competition_id: Uuid,
    pub participants: Participants,
    pub format: MatchFormat,
    pub initial_server: Uuid,
    pub started_at: DateTime<Utc>,
}

/// The open point of a match and the score it is played at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub match_id: Uuid,
    pub point_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_id: Option<Uuid>,
    pub server: Uuid,
    pub receiver: Uuid,
    pub score: ScoreBoard,
}

impl ScoreUpdate {
    /// Describe the open point of `ledger`, `None` once the match has ended
    pub fn from_ledger(ledger: &MatchLedger) -> Option<Self> {
        let state = ledger.scoring_state()?;
        let open = ledger.open_point()?;
        let set_id = open
            .game_id
            .and_then(|id| ledger.game(id))
            .map(|game| game.set_id);

        Some(Self {
            match_id: ledger.id(),
            point_number: state.point_number,
            game_id: open.game_id,
            set_id,
            server: state.server,
            receiver: state.receiver,
            score: ScoreBoard::from_state(&state, ledger.record.format.is_hierarchical()),
        })
    }

    /// Reference to pass back when recording this point
    pub fn point(&self) -> PointKey {
        PointKey {
            game_id: self.game_id,
            number: self.point_number,
        }
    }
}

/// A newly created match and its first open point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCreated {
    pub record: MatchRecord,
    pub opening: ScoreUpdate,
}

/// Result of recording one point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// Match continues at this point
    InProgress(ScoreUpdate),
    /// The point ended the match
    Finished(MatchResult),
}

/// Scoring transaction orchestrator
///
/// `S` supplies both the ledger store and the roster.
pub struct MatchProgression<S> {
    store: Arc<S>,
    locks: MatchLocks,
}

impl<S> MatchProgression<S>
where
    S: MatchStore + Roster,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: MatchLocks::new(),
        }
    }

    /// Create a match with its first open scope and point
    pub async fn create_match(&self, setup: MatchSetup) -> ScoringResult<MatchCreated> {
        setup.format.validate()?;

        let participants = setup.participants;
        if participants.first == participants.second {
            return Err(ScoringError::InvalidConfig(
                "a match needs two different participants".into(),
            ));
        }
        let receiver = participants.opponent(setup.initial_server).ok_or_else(|| {
            ScoringError::InvalidConfig(format!(
                "initial server {} is not a participant",
                setup.initial_server
            ))
        })?;

        if self
            .store
            .competition_members(setup.competition_id)
            .await?
            .is_none()
        {
            return Err(ScoringError::not_found("competition", setup.competition_id));
        }
        for player in participants.as_array() {
            if self.store.player(player).await?.is_none() {
                return Err(ScoringError::not_found("player", player));
            }
        }

        let match_id = Uuid::new_v4();
        let record = MatchRecord {
            id: match_id,
            competition_id: setup.competition_id,
            participants,
            format: setup.format,
            initial_server: setup.initial_server,
            started_at: setup.started_at,
            ended_at: None,
            winner: None,
        };

        let mut batch = WriteBatch::new(match_id);
        batch.push(LedgerWrite::InsertMatch(record.clone()));

        let mut game_id = None;
        if setup.format.is_hierarchical() {
            let (set_writes, id) =
                seed_game(match_id, None, 1, 1, setup.initial_server, receiver);
            for write in set_writes {
                batch.push(write);
            }
            game_id = Some(id);
        }
        batch.push(LedgerWrite::InsertPoint(PointRecord {
            match_id,
            game_id,
            number: 1,
            server: setup.initial_server,
            receiver,
            outcome: None,
        }));

        let mut created = MatchLedger::new(record.clone());
        apply_local(&mut created, &batch.writes[1..])?;
        self.store.commit(batch).await?;

        let opening = ScoreUpdate::from_ledger(&created).ok_or_else(|| {
            ScoringError::PersistenceFailure(format!("match {} has no open point", match_id))
        })?;

        info!(
            match_id = %match_id,
            competition_id = %setup.competition_id,
            hierarchical = setup.format.is_hierarchical(),
            "Match created"
        );

        Ok(MatchCreated { record, opening })
    }

    /// Record the outcome of the open point and advance the match
    ///
    /// `point` must name the open point, as handed out by [`ScoreUpdate::point`].
    /// Resubmitting the point decided last is a `Conflict`; any other stale,
    /// future or foreign reference is `OutOfSequence`.
    pub async fn record_point_outcome(
        &self,
        match_id: Uuid,
        point: PointKey,
        outcome: PointOutcome,
    ) -> ScoringResult<RecordOutcome> {
        self.locks
            .serialized(match_id, || self.record_locked(match_id, point, outcome))
            .await
    }

    async fn record_locked(
        &self,
        match_id: Uuid,
        point: PointKey,
        outcome: PointOutcome,
    ) -> ScoringResult<RecordOutcome> {
        let timer = Timer::new();
        let ledger = self.load(match_id).await?;
        let point_number = point.number;

        if ledger.last_scored_point().is_some_and(|last| last.key() == point) {
            warn!(match_id = %match_id, point_number, "Point already recorded");
            return Err(ScoringError::Conflict(format!(
                "point {} of match {} was already recorded",
                point_number, match_id
            )));
        }
        if ledger.is_complete() {
            return Err(ScoringError::MatchAlreadyComplete(match_id));
        }

        let (state, open) = match (ledger.scoring_state(), ledger.open_point()) {
            (Some(state), Some(open)) => (state, open.clone()),
            _ => {
                return Err(ScoringError::PersistenceFailure(format!(
                    "match {} has no open point",
                    match_id
                )))
            }
        };

        if open.key() != point {
            debug!(
                match_id = %match_id,
                point_number,
                game_id = ?point.game_id,
                open_game_id = ?open.game_id,
                "Point reference does not match the open point"
            );
            return Err(ScoringError::OutOfSequence {
                match_id,
                expected: state.point_number,
                got: point_number,
            });
        }
        if !ledger.record.participants.contains(outcome.winner) {
            return Err(ScoringError::not_found("participant", outcome.winner));
        }

        let decision = rules::decide(&ledger.record.format, &state, &outcome);
        let batch = plan_point(&ledger, &open, outcome, &decision)?;

        let mut next = ledger.clone();
        apply_local(&mut next, &batch.writes)?;
        self.store.commit(batch).await?;

        match decision {
            Decision::ContinueScope { .. } => {
                debug!(
                    match_id = %match_id,
                    point_number,
                    winner = %outcome.winner,
                    elapsed_us = timer.elapsed_micros(),
                    "Point recorded"
                );
            }
            Decision::ScopeWon {
                winner,
                next_scope_seed,
            } => {
                info!(
                    match_id = %match_id,
                    point_number,
                    winner = %winner,
                    set_closed = next_scope_seed.closes_set(),
                    elapsed_us = timer.elapsed_micros(),
                    "Scope won"
                );
            }
            Decision::MatchWon { winner } => {
                info!(
                    match_id = %match_id,
                    point_number,
                    winner = %winner,
                    elapsed_us = timer.elapsed_micros(),
                    "Match won"
                );
            }
        }

        if let Some(result) = next.result.clone() {
            return Ok(RecordOutcome::Finished(result));
        }
        ScoreUpdate::from_ledger(&next)
            .map(RecordOutcome::InProgress)
            .ok_or_else(|| {
                ScoringError::PersistenceFailure(format!(
                    "match {} left without an open point",
                    match_id
                ))
            })
    }

    /// The open point of a match, `None` once it has ended
    pub async fn current_point(&self, match_id: Uuid) -> ScoringResult<Option<ScoreUpdate>> {
        let ledger = self.load(match_id).await?;
        Ok(ScoreUpdate::from_ledger(&ledger))
    }

    /// Revert the most recently scored point, reopening any scope it closed
    ///
    /// Returns the reopened point, or `None` when nothing has been scored yet.
    pub async fn undo_last_point(&self, match_id: Uuid) -> ScoringResult<Option<ScoreUpdate>> {
        self.locks
            .serialized(match_id, || self.undo_locked(match_id))
            .await
    }

    async fn undo_locked(&self, match_id: Uuid) -> ScoringResult<Option<ScoreUpdate>> {
        let ledger = self.load(match_id).await?;
        let Some(last) = ledger.last_scored_point().cloned() else {
            return Ok(None);
        };

        let mut batch = WriteBatch::new(match_id);
        if let Some(open) = ledger.open_point() {
            batch.push(LedgerWrite::RemovePoint(open.key()));
        }

        if let Some(game_id) = last.game_id {
            let game = ledger.game(game_id).ok_or_else(|| {
                ScoringError::PersistenceFailure(format!(
                    "point {} references missing game {}",
                    last.number, game_id
                ))
            })?;
            let position = (game.set_number, game.number);

            for later in ledger
                .games
                .iter()
                .filter(|g| (g.set_number, g.number) > position)
            {
                batch.push(LedgerWrite::RemoveGame(later.id));
            }
            for later in ledger.sets.iter().filter(|s| s.number > game.set_number) {
                batch.push(LedgerWrite::RemoveSet(later.id));
            }
            if game.winner.is_some() {
                batch.push(LedgerWrite::ReopenGame(game.id));
            }
            if ledger.set(game.set_id).is_some_and(|s| s.winner.is_some()) {
                batch.push(LedgerWrite::ReopenSet(game.set_id));
            }
        }

        batch.push(LedgerWrite::ClearPoint(last.key()));
        if ledger.is_complete() {
            batch.push(LedgerWrite::ReopenMatch);
        }

        let mut next = ledger;
        apply_local(&mut next, &batch.writes)?;
        self.store.commit(batch).await?;

        info!(match_id = %match_id, point_number = last.number, "Last point undone");

        Ok(ScoreUpdate::from_ledger(&next))
    }

    async fn load(&self, match_id: Uuid) -> ScoringResult<MatchLedger> {
        self.store
            .load_match(match_id)
            .await?
            .ok_or_else(|| ScoringError::not_found("match", match_id))
    }
}

/// Writes for one set (optional) plus one game, returning the new game id
fn seed_game(
    match_id: Uuid,
    set_id: Option<Uuid>,
    set_number: u32,
    game_number: u32,
    server: Uuid,
    receiver: Uuid,
) -> (Vec<LedgerWrite>, Uuid) {
    let mut writes = Vec::with_capacity(2);
    let set_id = set_id.unwrap_or_else(|| {
        let id = Uuid::new_v4();
        writes.push(LedgerWrite::InsertSet(SetRecord {
            id,
            match_id,
            number: set_number,
            winner: None,
        }));
        id
    });

    let game_id = Uuid::new_v4();
    writes.push(LedgerWrite::InsertGame(GameRecord {
        id: game_id,
        match_id,
        set_id,
        set_number,
        number: game_number,
        server,
        receiver,
        winner: None,
    }));
    (writes, game_id)
}

/// Translate a decision into ledger writes
fn plan_point(
    ledger: &MatchLedger,
    open: &PointRecord,
    outcome: PointOutcome,
    decision: &Decision,
) -> ScoringResult<WriteBatch> {
    let match_id = ledger.id();
    let mut batch = WriteBatch::new(match_id);
    batch.push(LedgerWrite::ScorePoint {
        key: open.key(),
        outcome,
    });

    let open_game = open.game_id.and_then(|id| ledger.game(id));

    match *decision {
        Decision::ContinueScope {
            next_point_number,
            server,
            receiver,
        } => {
            batch.push(LedgerWrite::InsertPoint(PointRecord {
                match_id,
                game_id: open.game_id,
                number: next_point_number,
                server,
                receiver,
                outcome: None,
            }));
        }
        Decision::ScopeWon {
            winner,
            next_scope_seed,
        } => {
            let game = open_game.ok_or_else(|| {
                ScoringError::PersistenceFailure(format!(
                    "match {} closed a game without an open game",
                    match_id
                ))
            })?;
            batch.push(LedgerWrite::CloseGame {
                game_id: game.id,
                winner,
            });

            let (set_id, set_number, game_number) = match next_scope_seed {
                ScopeSeed::Game {
                    set_number,
                    game_number,
                    ..
                } => (Some(game.set_id), set_number, game_number),
                ScopeSeed::Set { set_number, .. } => {
                    batch.push(LedgerWrite::CloseSet {
                        set_id: game.set_id,
                        winner,
                    });
                    (None, set_number, 1)
                }
            };

            let (server, receiver) = (next_scope_seed.server(), next_scope_seed.receiver());
            let (writes, game_id) =
                seed_game(match_id, set_id, set_number, game_number, server, receiver);
            for write in writes {
                batch.push(write);
            }
            batch.push(LedgerWrite::InsertPoint(PointRecord {
                match_id,
                game_id: Some(game_id),
                number: 1,
                server,
                receiver,
                outcome: None,
            }));
        }
        Decision::MatchWon { winner } => {
            if let Some(game) = open_game {
                batch.push(LedgerWrite::CloseGame {
                    game_id: game.id,
                    winner,
                });
                batch.push(LedgerWrite::CloseSet {
                    set_id: game.set_id,
                    winner,
                });
            }
            batch.push(LedgerWrite::FinishMatch(MatchResult {
                match_id,
                winner,
                recorded_at: Utc::now(),
            }));
        }
    }

    Ok(batch)
}

/// Mirror a batch onto an in-hand snapshot so the response is folded from
/// exactly what was committed
fn apply_local(ledger: &mut MatchLedger, writes: &[LedgerWrite]) -> ScoringResult<()> {
    for write in writes {
        write.apply_to(ledger)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::ledger::PlayerMatchStats;
    use crate::stats::StatsAggregator;
    use crate::store::InMemoryStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        progression: Arc<MatchProgression<InMemoryStore>>,
        stats: StatsAggregator<InMemoryStore>,
        a: Uuid,
        b: Uuid,
        competition_id: Uuid,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let a = store.register_player("Ann", "Ace").id;
        let b = store.register_player("Ben", "Lob").id;
        let competition_id = store.register_competition(&[a, b]);
        Fixture {
            progression: Arc::new(MatchProgression::new(store.clone())),
            stats: StatsAggregator::new(store.clone()),
            store,
            a,
            b,
            competition_id,
        }
    }

    fn flat(min_points: u32, win_by: u32) -> MatchFormat {
        MatchFormat::Flat { min_points, win_by }
    }

    fn sets(points_per_game: u32, games_per_set: u32, sets_to_win: u32) -> MatchFormat {
        MatchFormat::Hierarchical {
            points_per_game,
            games_per_set,
            sets_to_win,
        }
    }

    impl Fixture {
        fn setup(&self, format: MatchFormat) -> MatchSetup {
            MatchSetup {
                competition_id: self.competition_id,
                participants: Participants::new(self.a, self.b),
                format,
                initial_server: self.a,
                started_at: Utc::now(),
            }
        }

        async fn start(&self, format: MatchFormat) -> Uuid {
            self.progression
                .create_match(self.setup(format))
                .await
                .unwrap()
                .record
                .id
        }

        async fn record_at(&self, match_id: Uuid, point: PointKey, winner: Uuid) -> ScoringResult<RecordOutcome> {
            self.progression
                .record_point_outcome(match_id, point, PointOutcome::won_by(winner))
                .await
        }

        /// Record a flat-mode point by number
        async fn record(&self, match_id: Uuid, number: u32, winner: Uuid) -> ScoringResult<RecordOutcome> {
            self.record_at(match_id, PointKey::flat(number), winner).await
        }

        /// Play `winners` in order at whatever point is open
        async fn play(&self, match_id: Uuid, winners: &[Uuid]) -> RecordOutcome {
            let mut last = None;
            for winner in winners {
                let open = self.progression.current_point(match_id).await.unwrap().unwrap();
                last = Some(self.record_at(match_id, open.point(), *winner).await.unwrap());
            }
            last.expect("at least one point")
        }

        async fn ledger(&self, match_id: Uuid) -> MatchLedger {
            self.store.load_match(match_id).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn create_match_opens_point_one() {
        let f = fixture();
        let created = f.progression.create_match(f.setup(flat(11, 2))).await.unwrap();

        assert_eq!(created.opening.point_number, 1);
        assert_eq!(created.opening.server, f.a);
        assert_eq!(created.opening.receiver, f.b);
        assert_eq!(created.opening.game_id, None);
        assert_eq!(created.opening.score.points.total(), 0);
        assert_eq!(
            f.progression.current_point(created.record.id).await.unwrap(),
            Some(created.opening)
        );
    }

    #[tokio::test]
    async fn hierarchical_match_opens_first_set_and_game() {
        let f = fixture();
        let created = f.progression.create_match(f.setup(sets(4, 6, 2))).await.unwrap();
        let ledger = f.ledger(created.record.id).await;

        assert_eq!(ledger.sets.len(), 1);
        assert_eq!(ledger.games.len(), 1);
        assert_eq!(created.opening.game_id, Some(ledger.games[0].id));
        assert_eq!(created.opening.set_id, Some(ledger.sets[0].id));
        assert_eq!(created.opening.score.games.map(|g| g.total()), Some(0));
    }

    #[tokio::test]
    async fn four_straight_points_finish_a_flat_match() {
        let f = fixture();
        let id = f.start(flat(4, 2)).await;

        for n in 1..=3 {
            let outcome = f.record(id, n, f.a).await.unwrap();
            assert!(matches!(outcome, RecordOutcome::InProgress(u) if u.point_number == n + 1));
        }

        let RecordOutcome::Finished(result) = f.record(id, 4, f.a).await.unwrap() else {
            panic!("fourth point should end the match");
        };
        assert_eq!(result.winner, f.a);

        let summary = f.stats.match_summary(id).await.unwrap();
        assert_eq!(summary.winner, Some(f.a));
        assert!(summary.ended_at.is_some());
        assert_eq!(f.progression.current_point(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn alternating_points_keep_the_match_open() {
        let f = fixture();
        let id = f.start(flat(4, 2)).await;

        let winners: Vec<Uuid> = (0..9).map(|i| if i % 2 == 0 { f.a } else { f.b }).collect();
        let RecordOutcome::InProgress(update) = f.play(id, &winners).await else {
            panic!("no one leads by two");
        };

        assert_eq!(update.point_number, 10);
        assert_eq!(update.score.points.of(f.a), 5);
        assert_eq!(update.score.points.of(f.b), 4);
        // service has changed after points 2, 4, 6 and 8
        assert_eq!(update.server, f.a);
        assert_eq!(update.receiver, f.b);
    }

    #[tokio::test]
    async fn flat_win_waits_for_the_margin() {
        let f = fixture();
        let id = f.start(flat(4, 2)).await;

        let deuce: Vec<Uuid> = (0..8).map(|i| if i % 2 == 0 { f.a } else { f.b }).collect();
        f.play(id, &deuce).await;

        assert!(matches!(f.record(id, 9, f.a).await, Ok(RecordOutcome::InProgress(_))));
        assert!(matches!(f.record(id, 10, f.a).await, Ok(RecordOutcome::Finished(r)) if r.winner == f.a));
    }

    #[tokio::test]
    async fn hierarchical_match_advances_through_games_and_sets() {
        let f = fixture();
        let id = f.start(sets(2, 2, 2)).await;
        let (a, b) = (f.a, f.b);

        let RecordOutcome::InProgress(game_two) = f.play(id, &[a, a]).await else {
            panic!("one game is not a match");
        };
        assert_eq!(game_two.point_number, 1);
        assert_eq!(game_two.server, b);
        assert_eq!(game_two.score.games.unwrap().of(a), 1);
        assert_eq!(game_two.score.points.total(), 0);

        // b takes a point but a wins the game 2-1, closing the set
        let RecordOutcome::InProgress(set_two) = f.play(id, &[b, a, a]).await else {
            panic!("one set is not a match");
        };
        assert_ne!(set_two.set_id, game_two.set_id);
        assert_eq!(set_two.server, a);
        assert_eq!(set_two.score.sets.unwrap().of(a), 1);
        assert_eq!(set_two.score.games.unwrap().total(), 0);

        let RecordOutcome::Finished(result) = f.play(id, &[a, a, a, a]).await else {
            panic!("second set should end the match");
        };
        assert_eq!(result.winner, a);

        let ledger = f.ledger(id).await;
        assert_eq!(ledger.sets.len(), 2);
        assert_eq!(ledger.games.len(), 4);
        assert!(ledger.games.iter().all(|g| g.winner == Some(a)));
        assert!(ledger.open_point().is_none());
        assert_eq!(ledger.score_board().sets.unwrap().of(a), 2);
    }

    #[tokio::test]
    async fn out_of_sequence_point_changes_nothing() {
        let f = fixture();
        let id = f.start(flat(4, 2)).await;
        let before = f.ledger(id).await;

        let err = f.record(id, 3, f.a).await.unwrap_err();
        assert_eq!(
            err,
            ScoringError::OutOfSequence {
                match_id: id,
                expected: 1,
                got: 3
            }
        );

        assert_eq!(f.ledger(id).await, before);
        assert_eq!(
            f.stats.match_statistics(id).await.unwrap(),
            [PlayerMatchStats::empty(f.a), PlayerMatchStats::empty(f.b)]
        );
    }

    #[tokio::test]
    async fn replayed_point_number_is_a_conflict() {
        let f = fixture();
        let id = f.start(flat(4, 2)).await;

        f.record(id, 1, f.a).await.unwrap();
        let err = f.record(id, 1, f.b).await.unwrap_err();

        assert!(matches!(err, ScoringError::Conflict(_)));
        assert_eq!(f.stats.current_score(id).await.unwrap().points.of(f.a), 1);
    }

    #[tokio::test]
    async fn failed_commit_leaves_score_and_stats_untouched() {
        let f = fixture();
        let id = f.start(flat(4, 2)).await;
        f.progression
            .record_point_outcome(
                id,
                PointKey::flat(1),
                PointOutcome {
                    winner: f.a,
                    ace: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let score = f.stats.current_score(id).await.unwrap();
        let stats = f.stats.match_statistics(id).await.unwrap();

        f.store.set_unavailable(true);
        let err = f.record(id, 2, f.b).await.unwrap_err();
        assert!(matches!(err, ScoringError::PersistenceFailure(_)));

        assert_eq!(f.stats.current_score(id).await.unwrap(), score);
        assert_eq!(f.stats.match_statistics(id).await.unwrap(), stats);
        assert_eq!(
            f.progression.current_point(id).await.unwrap().map(|p| p.point_number),
            Some(2)
        );

        // the same call succeeds once the store is back
        f.store.set_unavailable(false);
        assert!(f.record(id, 2, f.b).await.is_ok());
    }

    #[tokio::test]
    async fn finished_match_rejects_more_points() {
        let f = fixture();
        let id = f.start(flat(4, 2)).await;
        f.play(id, &[f.a; 4]).await;

        assert_eq!(
            f.record(id, 5, f.b).await.unwrap_err(),
            ScoringError::MatchAlreadyComplete(id)
        );
    }

    #[tokio::test]
    async fn unknown_entities_are_not_found() {
        let f = fixture();
        let stranger = Uuid::new_v4();

        assert!(matches!(
            f.record(stranger, 1, f.a).await,
            Err(ScoringError::NotFound { entity: "match", .. })
        ));
        assert!(matches!(
            f.progression.current_point(stranger).await,
            Err(ScoringError::NotFound { entity: "match", .. })
        ));

        let id = f.start(flat(4, 2)).await;
        assert!(matches!(
            f.record(id, 1, stranger).await,
            Err(ScoringError::NotFound { entity: "participant", .. })
        ));

        let mut setup = f.setup(flat(4, 2));
        setup.competition_id = stranger;
        assert!(matches!(
            f.progression.create_match(setup).await,
            Err(ScoringError::NotFound { entity: "competition", .. })
        ));

        let mut setup = f.setup(flat(4, 2));
        setup.participants = Participants::new(f.a, stranger);
        assert!(matches!(
            f.progression.create_match(setup).await,
            Err(ScoringError::NotFound { entity: "player", .. })
        ));
    }

    #[tokio::test]
    async fn invalid_setups_are_rejected_before_anything_is_stored() {
        let f = fixture();

        let zero = f.setup(flat(0, 2));
        let mut same_player = f.setup(flat(4, 2));
        same_player.participants = Participants::new(f.a, f.a);
        let mut outside_server = f.setup(sets(4, 6, 2));
        outside_server.initial_server = Uuid::new_v4();

        for setup in [zero, same_player, outside_server] {
            assert!(matches!(
                f.progression.create_match(setup).await,
                Err(ScoringError::InvalidConfig(_))
            ));
        }
        assert_eq!(f.store.match_count(), 0);
    }

    #[tokio::test]
    async fn undo_steps_back_one_point_at_a_time() {
        let f = fixture();
        let id = f.start(flat(4, 2)).await;
        f.play(id, &[f.a, f.b]).await;

        let update = f.progression.undo_last_point(id).await.unwrap().unwrap();
        assert_eq!(update.point_number, 2);
        assert_eq!(update.score.points.of(f.a), 1);
        assert_eq!(update.score.points.of(f.b), 0);

        let update = f.progression.undo_last_point(id).await.unwrap().unwrap();
        assert_eq!(update.point_number, 1);
        assert_eq!(update.server, f.a);

        assert_eq!(f.progression.undo_last_point(id).await.unwrap(), None);
        assert_eq!(f.ledger(id).await.points.len(), 1);
    }

    #[tokio::test]
    async fn undo_reopens_a_finished_match() {
        let f = fixture();
        let id = f.start(flat(4, 2)).await;
        f.play(id, &[f.a; 4]).await;

        let update = f.progression.undo_last_point(id).await.unwrap().unwrap();
        assert_eq!(update.point_number, 4);
        assert_eq!(update.score.points.of(f.a), 3);

        let summary = f.stats.match_summary(id).await.unwrap();
        assert_eq!(summary.winner, None);
        assert_eq!(summary.ended_at, None);

        assert!(matches!(f.record(id, 4, f.b).await, Ok(RecordOutcome::InProgress(_))));
    }

    #[tokio::test]
    async fn undo_crosses_set_boundaries() {
        let f = fixture();
        let id = f.start(sets(2, 2, 2)).await;
        f.play(id, &[f.a; 4]).await;
        assert_eq!(f.ledger(id).await.sets.len(), 2);

        let update = f.progression.undo_last_point(id).await.unwrap().unwrap();
        assert_eq!(update.point_number, 2);
        assert_eq!(update.server, f.b);
        assert_eq!(update.score.games.unwrap().of(f.a), 1);
        assert_eq!(update.score.sets.unwrap().total(), 0);

        let ledger = f.ledger(id).await;
        assert_eq!(ledger.sets.len(), 1);
        assert_eq!(ledger.sets[0].winner, None);
        assert_eq!(ledger.games.len(), 2);
        assert_eq!(ledger.games[1].winner, None);
        assert_eq!(ledger.scoring_state().unwrap().game_number, 2);
    }

    #[tokio::test]
    async fn undo_of_unknown_match_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.progression.undo_last_point(Uuid::new_v4()).await,
            Err(ScoringError::NotFound { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_submissions_of_one_point_commit_once() {
        let f = fixture();

        for _ in 0..20 {
            let id = f.start(flat(11, 2)).await;
            let tasks: Vec<_> = [f.a, f.b]
                .into_iter()
                .map(|winner| {
                    let progression = f.progression.clone();
                    tokio::spawn(async move {
                        progression
                            .record_point_outcome(id, PointKey::flat(1), PointOutcome::won_by(winner))
                            .await
                    })
                })
                .collect();

            let results: Vec<_> = futures::future::join_all(tasks)
                .await
                .into_iter()
                .map(|joined| joined.unwrap())
                .collect();

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(ScoringError::Conflict(_)))));

            let ledger = f.ledger(id).await;
            assert_eq!(ledger.points.iter().filter(|p| !p.is_open()).count(), 1);
            assert_eq!(ledger.points.len(), 2);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_submissions_of_a_game_closing_point_commit_once() {
        let f = fixture();

        // one-point games, and two-point games raced on the deciding point
        for (format, lead_in) in [(sets(1, 3, 1), 0), (sets(2, 3, 1), 1)] {
            for _ in 0..20 {
                let id = f.start(format).await;
                if lead_in > 0 {
                    f.play(id, &vec![f.a; lead_in]).await;
                }
                let point = f.progression.current_point(id).await.unwrap().unwrap().point();
                let scored_before = f.ledger(id).await.points.iter().filter(|p| !p.is_open()).count();

                let tasks: Vec<_> = (0..2)
                    .map(|_| {
                        let progression = f.progression.clone();
                        let winner = f.a;
                        tokio::spawn(async move {
                            progression
                                .record_point_outcome(id, point, PointOutcome::won_by(winner))
                                .await
                        })
                    })
                    .collect();

                let results: Vec<_> = futures::future::join_all(tasks)
                    .await
                    .into_iter()
                    .map(|joined| joined.unwrap())
                    .collect();

                assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
                assert!(results
                    .iter()
                    .any(|r| matches!(r, Err(ScoringError::Conflict(_)))));

                let ledger = f.ledger(id).await;
                assert_eq!(
                    ledger.points.iter().filter(|p| !p.is_open()).count(),
                    scored_before + 1
                );
                assert_eq!(ledger.games.iter().filter(|g| g.winner == Some(f.a)).count(), 1);
                assert_eq!(ledger.score_board().games.unwrap().of(f.a), 1);
            }
        }
    }

    #[tokio::test]
    async fn late_duplicate_is_not_scored_into_the_next_game() {
        let f = fixture();
        let created = f.progression.create_match(f.setup(sets(1, 3, 1))).await.unwrap();
        let id = created.record.id;
        let first = created.opening.point();

        let RecordOutcome::InProgress(next) = f.record_at(id, first, f.a).await.unwrap() else {
            panic!("one game is not a match");
        };
        assert_eq!(next.point_number, first.number);
        assert_ne!(next.game_id, first.game_id);

        let before = f.ledger(id).await;
        assert!(matches!(
            f.record_at(id, first, f.a).await,
            Err(ScoringError::Conflict(_))
        ));
        assert_eq!(f.ledger(id).await, before);
    }

    #[tokio::test]
    async fn stale_and_foreign_point_references_are_out_of_sequence() {
        let f = fixture();
        let id = f.start(flat(11, 2)).await;
        f.play(id, &[f.a, f.b, f.a, f.b, f.a, f.b, f.a, f.b]).await;
        let before = f.ledger(id).await;

        assert_eq!(
            f.record(id, 1, f.a).await.unwrap_err(),
            ScoringError::OutOfSequence {
                match_id: id,
                expected: 9,
                got: 1
            }
        );
        // only the point decided last counts as a duplicate
        assert!(matches!(f.record(id, 8, f.a).await, Err(ScoringError::Conflict(_))));
        assert_eq!(f.ledger(id).await, before);

        let id = f.start(sets(4, 6, 2)).await;
        for point in [PointKey::in_game(Uuid::new_v4(), 1), PointKey::flat(1)] {
            assert!(matches!(
                f.record_at(id, point, f.a).await,
                Err(ScoringError::OutOfSequence { expected: 1, got: 1, .. })
            ));
        }
        assert!(f.ledger(id).await.last_scored_point().is_none());
    }

    #[tokio::test]
    async fn committed_state_matches_the_engine_decision() {
        let f = fixture();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for format in [flat(4, 2), flat(11, 2), sets(4, 6, 2), sets(3, 3, 3)] {
            let id = f.start(format).await;

            for _ in 0..10_000 {
                let ledger = f.ledger(id).await;
                let (Some(state), Some(open)) = (ledger.scoring_state(), ledger.open_point()) else {
                    break;
                };
                let winner = if rng.gen_bool(0.5) { f.a } else { f.b };
                let outcome = PointOutcome::won_by(winner);
                let decision = rules::decide(&format, &state, &outcome);
                let expected = state.after(winner, &decision);

                let recorded = f
                    .progression
                    .record_point_outcome(id, open.key(), outcome)
                    .await
                    .unwrap();

                let ledger = f.ledger(id).await;
                assert_eq!(ledger.scoring_state(), expected);
                assert_eq!(
                    matches!(recorded, RecordOutcome::Finished(_)),
                    expected.is_none()
                );
            }

            assert!(f.ledger(id).await.is_complete());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_never_see_a_half_applied_point() {
        let f = fixture();
        let id = f.start(sets(3, 3, 2)).await;
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let store = f.store.clone();
            let done = done.clone();
            tokio::spawn(async move {
                let mut scored = 0;
                while !done.load(Ordering::SeqCst) {
                    let ledger = store.load_match(id).await.unwrap().unwrap();
                    let open = ledger.points.iter().filter(|p| p.is_open()).count();
                    if ledger.is_complete() {
                        assert_eq!(open, 0);
                        assert!(ledger.result.is_some());
                    } else {
                        assert_eq!(open, 1);
                        assert!(ledger.scoring_state().is_some());
                        assert_eq!(
                            ledger.games.iter().filter(|g| g.winner.is_none()).count(),
                            1
                        );
                    }
                    let now = ledger.points.len() - open;
                    assert!(now >= scored);
                    scored = now;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        while let Some(open) = f.progression.current_point(id).await.unwrap() {
            let winner = if rng.gen_bool(0.5) { f.a } else { f.b };
            f.record_at(id, open.point(), winner).await.unwrap();
        }
        done.store(true, Ordering::SeqCst);

        reader.await.unwrap();
    }
}
