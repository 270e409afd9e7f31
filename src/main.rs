mod api;
mod config;
mod db;
mod error;
mod ingest;
mod matcher;
mod parlay;
mod pipeline;
mod pricing;
mod sport;
mod state;
mod types;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{router, ApiState, HealthState};
use crate::config::{Config, RUN_CHANNEL_CAPACITY};
use crate::db::reader;
use crate::db::writer::DbWriter;
use crate::error::Result;
use crate::ingest::ingest;
use crate::pipeline::RunOutput;
use crate::sport::ProfileRegistry;
use crate::state::RunStore;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Sport rules: resolved before any stage runs ---
    let registry = ProfileRegistry::load(cfg.sport_profiles_path.as_deref())?;
    let mut resolved = Vec::with_capacity(cfg.sports.len());
    for sport in &cfg.sports {
        let rules = registry.resolve(sport)?;
        info!(
            sport = %rules.sport,
            correlations = rules.correlations.len(),
            books = rules.sportsbooks.len(),
            min_books = rules.min_books,
            "Sport profile {} ready",
            rules.sport
        );
        resolved.push(rules);
    }

    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    let runs = RunStore::new();
    let health = Arc::new(HealthState::new());

    // DB writer (background, drains until every sender is dropped)
    let (run_tx, run_rx) = mpsc::channel::<RunOutput>(RUN_CHANNEL_CAPACITY);
    let writer = tokio::spawn(DbWriter::new(pool.clone(), run_rx).run());

    // --- One blocking task per sport ---
    let mut tasks = Vec::with_capacity(resolved.len());
    for rules in resolved {
        let projection_rows = reader::load_projection_rows(&pool, &rules.sport).await?;
        let odds_rows = reader::load_odds_rows(&pool, &rules.sport).await?;
        let settings = cfg.pipeline.clone();
        let format = cfg.odds_format;
        tasks.push(tokio::task::spawn_blocking(move || {
            let input = ingest(&rules.sport, &projection_rows, &odds_rows, format, &rules.sportsbooks);
            pipeline::run(input, &rules, &settings)
        }));
    }

    for task in tasks {
        match task.await {
            Ok(output) => {
                log_top_parlays(&output);
                runs.publish(&output);
                health.record_run(output.run_at.timestamp().max(0) as u64);
                if let Err(e) = run_tx.send(output).await {
                    warn!("DB writer channel closed: {e}");
                }
            }
            Err(e) => {
                health.record_failure();
                error!("Pipeline task failed: {e}");
            }
        }
    }
    drop(run_tx);

    if !cfg.serve_api {
        writer.await?;
        info!("Runs complete, SERVE_API=false: exiting");
        return Ok(());
    }

    // HTTP API server
    let app = router(ApiState { pool, runs, health });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

fn log_top_parlays(output: &RunOutput) {
    for (i, p) in output.parlays.iter().take(5).enumerate() {
        info!(
            sport = %output.sport,
            rank = i + 1,
            combined_ev = p.combined_ev,
            combined_prob = p.combined_prob,
            quality = %p.quality,
            "PARLAY #{} | legs: {} | EV: {:+.3} | P: {:.3} | odds: {:.2} | {}",
            i + 1,
            p.legs.len(),
            p.combined_ev,
            p.combined_prob,
            p.combined_decimal_odds,
            p.logic,
        );
    }
}
