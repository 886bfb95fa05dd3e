//! Match Tracker - point-by-point scoring for two-player matches
//!
//! Records each point of a match in an append-only ledger, advances
//! games, sets and the match according to the match format, and derives
//! scores, per-player statistics and competition standings from the ledger.

pub mod app;
pub mod config;
pub mod error;
pub mod ledger;
pub mod progression;
pub mod replay;
pub mod scoring;
pub mod stats;
pub mod store;
pub mod util;

pub use app::AppState;
pub use error::{ScoringError, ScoringResult};
pub use ledger::PointKey;
pub use progression::{MatchProgression, MatchSetup, RecordOutcome, ScoreUpdate};
pub use scoring::{MatchFormat, Participants, PointOutcome};
pub use stats::{Standing, StatsAggregator};
pub use store::{InMemoryStore, MatchStore, Roster};
