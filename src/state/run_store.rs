use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::db::models::{ParlayRow, ScoredBetRow};
use crate::pipeline::RunOutput;
use crate::types::RunStats;

/// Flat-row view of one finished run, as served by the API.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub sport: String,
    pub run_at: DateTime<Utc>,
    /// Sorted by best-side EV, highest first.
    pub bets: Vec<ScoredBetRow>,
    pub parlays: Vec<ParlayRow>,
    pub stats: RunStats,
}

impl From<&RunOutput> for RunSnapshot {
    fn from(o: &RunOutput) -> Self {
        let mut bets: Vec<ScoredBetRow> = o
            .scored
            .iter()
            .map(|b| ScoredBetRow::from_scored(&o.sport, b))
            .collect();
        bets.sort_by(|a, b| b.best_ev.total_cmp(&a.best_ev));
        Self {
            sport: o.sport.clone(),
            run_at: o.run_at,
            bets,
            parlays: o.parlays.iter().map(ParlayRow::from).collect(),
            stats: o.stats.clone(),
        }
    }
}

/// Latest run per sport. Written by the pipeline tasks, read by API handlers.
#[derive(Debug, Default)]
pub struct RunStore {
    latest: DashMap<String, Arc<RunSnapshot>>,
}

impl RunStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, output: &RunOutput) {
        self.latest
            .insert(output.sport.to_uppercase(), Arc::new(RunSnapshot::from(output)));
    }

    pub fn latest(&self, sport: &str) -> Option<Arc<RunSnapshot>> {
        self.latest
            .get(&sport.trim().to_uppercase())
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn sports(&self) -> Vec<String> {
        let mut sports: Vec<String> = self.latest.iter().map(|e| e.key().clone()).collect();
        sports.sort();
        sports
    }
}
