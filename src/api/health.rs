//! Shared health state for the /health endpoint.
//! Updated by the pipeline tasks in main, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct HealthState {
    pub runs_completed: AtomicU64,
    pub runs_failed: AtomicU64,
    /// Unix seconds of the last completed run (0 = none).
    pub last_run_at: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub last_run_at: Option<u64>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_run(&self, at_secs: u64) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.last_run_at.store(at_secs, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> HealthReport {
        let runs_completed = self.runs_completed.load(Ordering::Relaxed);
        let runs_failed = self.runs_failed.load(Ordering::Relaxed);
        let last = self.last_run_at.load(Ordering::Relaxed);
        HealthReport {
            status: if runs_failed == 0 { "ok" } else { "degraded" },
            runs_completed,
            runs_failed,
            last_run_at: (last > 0).then_some(last),
        }
    }
}
