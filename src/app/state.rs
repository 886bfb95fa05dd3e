//! Application state shared by the replay tool and embedding services

use std::sync::Arc;

use crate::config::Config;
use crate::progression::MatchProgression;
use crate::stats::StatsAggregator;
use crate::store::InMemoryStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<InMemoryStore>,
    pub progression: Arc<MatchProgression<InMemoryStore>>,
    pub stats: StatsAggregator<InMemoryStore>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // One store backs both the ledger and the roster
        let store = Arc::new(InMemoryStore::new());

        let progression = Arc::new(MatchProgression::new(store.clone()));
        let stats = StatsAggregator::new(store.clone());

        Self {
            config,
            store,
            progression,
            stats,
        }
    }
}
