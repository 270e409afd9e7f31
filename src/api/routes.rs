use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::health::{HealthReport, HealthState};
use crate::db::models::{ParlayRow, RunRow, ScoredBetRow};
use crate::db::reader;
use crate::error::AppError;
use crate::state::{RunSnapshot, RunStore};
use crate::types::RunStats;

const DEFAULT_LIMIT: usize = 100;
const DEFAULT_RUNS_LIMIT: i64 = 20;
const MAX_RUNS_LIMIT: i64 = 500;

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub runs: Arc<RunStore>,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/sports", get(get_sports))
        .route("/sports/:sport/bets", get(get_bets))
        .route("/sports/:sport/parlays", get(get_parlays))
        .route("/sports/:sport/stats", get(get_stats))
        .route("/runs", get(get_runs))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct BetsQuery {
    pub min_ev: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct RunsQuery {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct SportSummary {
    pub sport: String,
    pub run_at: DateTime<Utc>,
    pub bets: usize,
    pub parlays: usize,
    pub match_rate: f64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthReport> {
    Json(state.health.report())
}

async fn get_sports(State(state): State<ApiState>) -> Json<Vec<SportSummary>> {
    let summaries = state
        .runs
        .sports()
        .iter()
        .filter_map(|s| state.runs.latest(s))
        .map(|run| SportSummary {
            sport: run.sport.clone(),
            run_at: run.run_at,
            bets: run.bets.len(),
            parlays: run.parlays.len(),
            match_rate: run.stats.matching.match_rate(),
        })
        .collect();
    Json(summaries)
}

fn latest(state: &ApiState, sport: &str) -> Result<Arc<RunSnapshot>, AppError> {
    state
        .runs
        .latest(sport)
        .ok_or_else(|| AppError::NotFound(format!("no run for sport {sport}")))
}

async fn get_bets(
    State(state): State<ApiState>,
    Path(sport): Path<String>,
    Query(params): Query<BetsQuery>,
) -> Result<Json<Vec<ScoredBetRow>>, AppError> {
    let run = latest(&state, &sport)?;
    let bets = run
        .bets
        .iter()
        .filter(|b| params.min_ev.map_or(true, |min| b.best_ev >= min))
        .take(params.limit.unwrap_or(DEFAULT_LIMIT))
        .cloned()
        .collect();
    Ok(Json(bets))
}

async fn get_parlays(
    State(state): State<ApiState>,
    Path(sport): Path<String>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<ParlayRow>>, AppError> {
    let run = latest(&state, &sport)?;
    let parlays = run
        .parlays
        .iter()
        .take(params.limit.unwrap_or(DEFAULT_LIMIT))
        .cloned()
        .collect();
    Ok(Json(parlays))
}

async fn get_stats(
    State(state): State<ApiState>,
    Path(sport): Path<String>,
) -> Result<Json<RunStats>, AppError> {
    let run = latest(&state, &sport)?;
    Ok(Json(run.stats.clone()))
}

async fn get_runs(
    State(state): State<ApiState>,
    Query(params): Query<RunsQuery>,
) -> Result<Json<Vec<RunRow>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_RUNS_LIMIT).clamp(1, MAX_RUNS_LIMIT);
    let rows = reader::recent_runs(&state.pool, limit).await?;
    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::db::{connect_memory, writer::write_run};
    use crate::ingest::IngestOutcome;
    use crate::pipeline::{run, PipelineSettings};
    use crate::sport::ProfileRegistry;
    use crate::types::{OddsRecord, PlayerIdentity, Price, ProjectionRecord};

    async fn state_with_mlb_run() -> ApiState {
        let pool = connect_memory().await.unwrap();
        let runs = RunStore::new();
        let health = Arc::new(HealthState::new());

        let player = PlayerIdentity {
            name: "J. Smith".to_string(),
            team: Some("NYY".to_string()),
            sport: "MLB".to_string(),
        };
        let input = IngestOutcome {
            projections: vec![ProjectionRecord {
                player: player.clone(),
                market: "Strikeouts".to_string(),
                line: 6.5,
                true_prob_over: Some(0.58),
                game_id: "G1".to_string(),
                fetched_at: Utc::now(),
            }],
            odds: vec![OddsRecord {
                player: PlayerIdentity { team: None, ..player },
                market: "Ks".to_string(),
                line: 6.5,
                price_over: Some(Price::American(-110.0)),
                price_under: Some(Price::American(-110.0)),
                sportsbook: "fanduel".to_string(),
                game_id: "G1".to_string(),
                fetched_at: Utc::now(),
            }],
            ..Default::default()
        };
        let rules = ProfileRegistry::builtin().unwrap().resolve("MLB").unwrap();
        let output = run(input, &rules, &PipelineSettings::default());
        write_run(&pool, &output).await.unwrap();
        runs.publish(&output);
        health.record_run(1);

        ApiState { pool, runs, health }
    }

    async fn get_json(state: ApiState, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn bets_are_served_and_filtered_by_min_ev() {
        let state = state_with_mlb_run().await;

        let (status, body) = get_json(state.clone(), "/sports/mlb/bets").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["market"], "pitcher_strikeouts");
        assert_eq!(body[0]["best_side"], "over");
        assert_eq!(body[0]["price_over"], "-110");

        let (_, body) = get_json(state, "/sports/MLB/bets?min_ev=0.2").await;
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_sport_is_404() {
        let state = state_with_mlb_run().await;
        let (status, _) = get_json(state, "/sports/NBA/parlays").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stats_sports_runs_and_health() {
        let state = state_with_mlb_run().await;

        let (status, body) = get_json(state.clone(), "/sports/MLB/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["matching"]["matched"], 1);
        assert_eq!(body["parlays"]["anchors_without_companions"], 1);

        let (_, body) = get_json(state.clone(), "/sports").await;
        assert_eq!(body[0]["sport"], "MLB");
        assert_eq!(body[0]["bets"], 1);

        let (_, body) = get_json(state.clone(), "/runs?limit=5").await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, body) = get_json(state, "/health").await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["runs_completed"], 1);
    }
}
