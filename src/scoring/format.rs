//! Match format selection and validation

use serde::{Deserialize, Serialize};

use crate::error::ScoringError;

/// How a match is scored. Chosen at creation and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MatchFormat {
    /// Single scope: first to `min_points` with a lead of at least `win_by`
    Flat { min_points: u32, win_by: u32 },
    /// Point -> Game -> Set -> Match, each level won by a simple majority
    Hierarchical {
        points_per_game: u32,
        games_per_set: u32,
        sets_to_win: u32,
    },
}

impl MatchFormat {
    pub fn is_hierarchical(&self) -> bool {
        matches!(self, MatchFormat::Hierarchical { .. })
    }

    /// Reject formats whose thresholds can never be met
    pub fn validate(&self) -> Result<(), ScoringError> {
        match *self {
            MatchFormat::Flat { min_points, win_by } => {
                if min_points == 0 {
                    return Err(ScoringError::InvalidConfig(
                        "min_points must be greater than zero".into(),
                    ));
                }
                if win_by == 0 {
                    return Err(ScoringError::InvalidConfig(
                        "win_by must be greater than zero".into(),
                    ));
                }
            }
            MatchFormat::Hierarchical {
                points_per_game,
                games_per_set,
                sets_to_win,
            } => {
                for (name, value) in [
                    ("points_per_game", points_per_game),
                    ("games_per_set", games_per_set),
                    ("sets_to_win", sets_to_win),
                ] {
                    if value == 0 {
                        return Err(ScoringError::InvalidConfig(format!(
                            "{name} must be greater than zero"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Loosely typed format as it arrives from a caller
///
/// Hierarchical mode is selected by the presence of `games_per_set` or
/// `sets_to_win`; `win_by` only belongs to flat mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatInput {
    pub min_points: Option<i64>,
    #[serde(default)]
    pub win_by: Option<i64>,
    #[serde(default)]
    pub games_per_set: Option<i64>,
    #[serde(default)]
    pub sets_to_win: Option<i64>,
}

fn positive(name: &str, value: Option<i64>) -> Result<u32, ScoringError> {
    let value = value.ok_or_else(|| ScoringError::InvalidConfig(format!("{name} is required")))?;
    if value <= 0 {
        return Err(ScoringError::InvalidConfig(format!(
            "{name} must be greater than zero (got {value})"
        )));
    }
    u32::try_from(value)
        .map_err(|_| ScoringError::InvalidConfig(format!("{name} is too large (got {value})")))
}

impl TryFrom<FormatInput> for MatchFormat {
    type Error = ScoringError;

    fn try_from(input: FormatInput) -> Result<Self, Self::Error> {
        let min_points = positive("min_points", input.min_points)?;
        let hierarchical = input.games_per_set.is_some() || input.sets_to_win.is_some();

        if hierarchical {
            if input.win_by.is_some() {
                return Err(ScoringError::InvalidConfig(
                    "win_by cannot be combined with games_per_set/sets_to_win".into(),
                ));
            }
            Ok(MatchFormat::Hierarchical {
                points_per_game: min_points,
                games_per_set: positive("games_per_set", input.games_per_set)?,
                sets_to_win: positive("sets_to_win", input.sets_to_win)?,
            })
        } else {
            Ok(MatchFormat::Flat {
                min_points,
                win_by: positive("win_by", input.win_by)?,
            })
        }
    }
}
