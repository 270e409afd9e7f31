use tokio::sync::mpsc;
use tracing::{error, info};

use crate::db::models::{ParlayRow, ScoredBetRow};
use crate::error::Result;
use crate::pipeline::RunOutput;

/// Receives finished runs and persists them to SQLite.
/// Runs as a dedicated background task; exits when every sender is dropped.
pub struct DbWriter {
    pool: sqlx::SqlitePool,
    run_rx: mpsc::Receiver<RunOutput>,
}

impl DbWriter {
    pub fn new(pool: sqlx::SqlitePool, run_rx: mpsc::Receiver<RunOutput>) -> Self {
        Self { pool, run_rx }
    }

    pub async fn run(mut self) {
        while let Some(output) = self.run_rx.recv().await {
            match write_run(&self.pool, &output).await {
                Ok(run_id) => info!(
                    sport = %output.sport,
                    run_id,
                    "[RUN] persisted {} bets and {} parlays",
                    output.scored.len(),
                    output.parlays.len()
                ),
                Err(e) => error!(sport = %output.sport, "DB write error: {e}"),
            }
        }
    }
}

/// Persist one run in a single transaction. Returns the new run id.
pub async fn write_run(pool: &sqlx::SqlitePool, output: &RunOutput) -> Result<i64> {
    let stats_json = serde_json::to_string(&output.stats)?;
    let mut tx = pool.begin().await?;

    let run_id = sqlx::query(
        r#"
        INSERT INTO runs (
            sport, run_at, projections, odds_records, matched, match_rate,
            scored, parlays, stats_json
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&output.sport)
    .bind(output.run_at.to_rfc3339())
    .bind(output.stats.ingest.projections as i64)
    .bind(output.stats.ingest.odds_records as i64)
    .bind(output.stats.matching.matched as i64)
    .bind(output.stats.matching.match_rate())
    .bind(output.scored.len() as i64)
    .bind(output.parlays.len() as i64)
    .bind(stats_json)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for bet in &output.scored {
        let row = ScoredBetRow::from_scored(&output.sport, bet);
        sqlx::query(
            r#"
            INSERT INTO scored_bets (
                run_id, sport, player, team, market, line, sportsbook, books, game_id,
                price_over, price_under, implied_over, implied_under,
                no_vig_over, no_vig_under, true_over, true_under,
                ev_over, ev_under, no_vig_ev_over, no_vig_ev_under,
                best_side, best_ev, overround
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run_id)
        .bind(&row.sport)
        .bind(&row.player)
        .bind(&row.team)
        .bind(&row.market)
        .bind(row.line)
        .bind(&row.sportsbook)
        .bind(row.books as i64)
        .bind(&row.game_id)
        .bind(&row.price_over)
        .bind(&row.price_under)
        .bind(row.implied_over)
        .bind(row.implied_under)
        .bind(row.no_vig_over)
        .bind(row.no_vig_under)
        .bind(row.true_over)
        .bind(row.true_under)
        .bind(row.ev_over)
        .bind(row.ev_under)
        .bind(row.no_vig_ev_over)
        .bind(row.no_vig_ev_under)
        .bind(row.best_side.to_string())
        .bind(row.best_ev)
        .bind(row.overround)
        .execute(&mut *tx)
        .await?;
    }

    for parlay in &output.parlays {
        let row = ParlayRow::from(parlay);
        let legs_json = serde_json::to_string(&row.legs)?;
        sqlx::query(
            r#"
            INSERT INTO parlays (
                run_id, sport, game_id, anchor, leg_count, legs_json,
                independent_prob, combined_prob, combined_decimal_odds, combined_ev,
                avg_correlation, quality, logic, leg_set_key
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run_id)
        .bind(&row.sport)
        .bind(&row.game_id)
        .bind(&row.anchor)
        .bind(row.legs.len() as i64)
        .bind(legs_json)
        .bind(row.independent_prob)
        .bind(row.combined_prob)
        .bind(row.combined_decimal_odds)
        .bind(row.combined_ev)
        .bind(row.avg_correlation)
        .bind(&row.quality)
        .bind(&row.logic)
        .bind(&row.leg_set_key)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(run_id)
}
