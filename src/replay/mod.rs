//! Replay of a scored match from a JSON script

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::{ScoringError, ScoringResult};
use crate::ledger::{MatchResult, MatchSummary, PlayerMatchStats, ScoreBoard};
use crate::progression::{MatchSetup, RecordOutcome};
use crate::scoring::{FormatInput, MatchFormat, Participants, PointOutcome};
use crate::stats::Standing;

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptPlayer {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// One point; `winner` is 0 or 1, indexing `players`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScriptPoint {
    pub winner: usize,
    #[serde(default)]
    pub faults: u32,
    #[serde(default)]
    pub lets: u32,
    #[serde(default)]
    pub ace: bool,
    #[serde(default)]
    pub unforced_error: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    pub players: [ScriptPlayer; 2],
    pub format: FormatInput,
    /// Index of the player serving first
    #[serde(default)]
    pub first_server: usize,
    pub points: Vec<ScriptPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    #[serde(rename = "match")]
    pub summary: MatchSummary,
    pub points_recorded: u32,
    pub score: ScoreBoard,
    pub statistics: [PlayerMatchStats; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MatchResult>,
    pub standings: Vec<Standing>,
}

fn player_index(index: usize, field: &str) -> ScoringResult<usize> {
    if index > 1 {
        return Err(ScoringError::InvalidConfig(format!(
            "{field} must be 0 or 1 (got {index})"
        )));
    }
    Ok(index)
}

/// Feed `script` through a fresh match and report the outcome
pub async fn run(state: &AppState, script: ReplayScript) -> ScoringResult<ReplayReport> {
    let format = MatchFormat::try_from(script.format)?;

    let ids = script
        .players
        .each_ref()
        .map(|p| state.store.register_player(&p.first_name, &p.last_name).id);
    let competition_id = state.store.register_competition(&ids);

    let created = state
        .progression
        .create_match(MatchSetup {
            competition_id,
            participants: Participants::new(ids[0], ids[1]),
            format,
            initial_server: ids[player_index(script.first_server, "first_server")?],
            started_at: Utc::now(),
        })
        .await?;
    let match_id = created.record.id;

    let mut next_point = created.opening.point();
    let mut recorded = 0u32;
    let mut result = None;

    for point in &script.points {
        if result.is_some() {
            warn!(
                match_id = %match_id,
                ignored = script.points.len() as u32 - recorded,
                "Match finished before the script ended"
            );
            break;
        }

        let outcome = PointOutcome {
            winner: ids[player_index(point.winner, "winner")?],
            faults: point.faults,
            lets: point.lets,
            ace: point.ace,
            unforced_error: point.unforced_error,
        };

        match state
            .progression
            .record_point_outcome(match_id, next_point, outcome)
            .await?
        {
            RecordOutcome::InProgress(update) => next_point = update.point(),
            RecordOutcome::Finished(done) => result = Some(done),
        }
        recorded += 1;
    }

    info!(match_id = %match_id, points = recorded, finished = result.is_some(), "Replay complete");

    Ok(ReplayReport {
        summary: state.stats.match_summary(match_id).await?,
        points_recorded: recorded,
        score: state.stats.current_score(match_id).await?,
        statistics: state.stats.match_statistics(match_id).await?,
        result,
        standings: state.stats.standings(competition_id).await?,
    })
}
