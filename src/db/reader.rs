use crate::db::models::{RawOddsRow, RawProjectionRow, RunRow};
use crate::error::Result;

/// Raw projection rows for one sport, in insertion order.
pub async fn load_projection_rows(pool: &sqlx::SqlitePool, sport: &str) -> Result<Vec<RawProjectionRow>> {
    let rows = sqlx::query_as::<_, RawProjectionRow>(
        r#"
        SELECT sport, player_name, team, market, line, true_prob_over, game_id, fetched_at
        FROM projection_rows
        WHERE upper(trim(sport)) = upper(?)
        ORDER BY id
        "#,
    )
    .bind(sport)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Raw odds outcome rows for one sport, in insertion order.
pub async fn load_odds_rows(pool: &sqlx::SqlitePool, sport: &str) -> Result<Vec<RawOddsRow>> {
    let rows = sqlx::query_as::<_, RawOddsRow>(
        r#"
        SELECT sport, player_name, team, market, line, side, price, sportsbook, game_id, fetched_at
        FROM odds_rows
        WHERE upper(trim(sport)) = upper(?)
        ORDER BY id
        "#,
    )
    .bind(sport)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Most recent runs first.
pub async fn recent_runs(pool: &sqlx::SqlitePool, limit: i64) -> Result<Vec<RunRow>> {
    let rows = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT id, sport, run_at, projections, odds_records, matched, match_rate, scored, parlays
        FROM runs
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
