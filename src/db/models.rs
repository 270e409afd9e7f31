//! Row types for the SQLite input and output tables (see migrations/).

use serde::{Deserialize, Serialize};

use crate::types::{Leg, Parlay, ScoredBet, Side};

// ---------------------------------------------------------------------------
// Input rows, as written by the fetch jobs. Every column is raw text.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct RawProjectionRow {
    pub sport: Option<String>,
    pub player_name: Option<String>,
    pub team: Option<String>,
    pub market: Option<String>,
    pub line: Option<String>,
    pub true_prob_over: Option<String>,
    pub game_id: Option<String>,
    pub fetched_at: Option<String>,
}

/// One outcome (side) of one sportsbook line.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct RawOddsRow {
    pub sport: Option<String>,
    pub player_name: Option<String>,
    pub team: Option<String>,
    pub market: Option<String>,
    pub line: Option<String>,
    pub side: Option<String>,
    pub price: Option<String>,
    pub sportsbook: Option<String>,
    pub game_id: Option<String>,
    pub fetched_at: Option<String>,
}

// ---------------------------------------------------------------------------
// Output rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredBetRow {
    pub sport: String,
    pub player: String,
    pub team: Option<String>,
    pub market: String,
    pub line: f64,
    pub sportsbook: String,
    /// Sportsbooks quoting the prop.
    pub books: usize,
    pub game_id: String,
    pub price_over: String,
    pub price_under: String,
    pub implied_over: f64,
    pub implied_under: f64,
    pub no_vig_over: f64,
    pub no_vig_under: f64,
    pub true_over: f64,
    pub true_under: f64,
    pub ev_over: f64,
    pub ev_under: f64,
    pub no_vig_ev_over: f64,
    pub no_vig_ev_under: f64,
    pub best_side: Side,
    pub best_ev: f64,
    pub overround: f64,
}

impl ScoredBetRow {
    pub fn from_scored(sport: &str, b: &ScoredBet) -> Self {
        let best_side = b.best_side();
        Self {
            sport: sport.to_string(),
            player: b.bet.projection.player.name.clone(),
            team: b.bet.projection.player.team.clone(),
            market: b.bet.canonical_market.clone(),
            line: b.bet.odds.line,
            sportsbook: b.bet.odds.sportsbook.clone(),
            books: b.bet.books,
            game_id: b.bet.projection.game_id.clone(),
            price_over: b.over.price.to_string(),
            price_under: b.under.price.to_string(),
            implied_over: b.over.implied_prob,
            implied_under: b.under.implied_prob,
            no_vig_over: b.over.no_vig_prob,
            no_vig_under: b.under.no_vig_prob,
            true_over: b.over.true_prob,
            true_under: b.under.true_prob,
            ev_over: b.over.ev,
            ev_under: b.under.ev,
            no_vig_ev_over: b.over.no_vig_ev,
            no_vig_ev_under: b.under.no_vig_ev,
            best_side,
            best_ev: b.quote(best_side).ev,
            overround: b.overround,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParlayLegRow {
    pub player: String,
    pub team: Option<String>,
    pub market: String,
    pub line: f64,
    pub side: Side,
    pub sportsbook: String,
    pub game_id: String,
    pub price: String,
    pub true_prob: f64,
    pub no_vig_prob: f64,
    pub ev: f64,
    pub books: usize,
    pub correlation: Option<f64>,
    pub link_logic: Option<String>,
}

impl From<&Leg> for ParlayLegRow {
    fn from(l: &Leg) -> Self {
        Self {
            player: l.player.clone(),
            team: l.team.clone(),
            market: l.market.clone(),
            line: l.line,
            side: l.side,
            sportsbook: l.sportsbook.clone(),
            game_id: l.game_id.clone(),
            price: l.price.to_string(),
            true_prob: l.true_prob,
            no_vig_prob: l.no_vig_prob,
            ev: l.ev,
            books: l.books,
            correlation: l.correlation,
            link_logic: l.link_logic.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParlayRow {
    pub sport: String,
    pub game_id: String,
    pub anchor: String,
    /// Anchor first.
    pub legs: Vec<ParlayLegRow>,
    pub independent_prob: f64,
    pub combined_prob: f64,
    pub combined_decimal_odds: f64,
    pub combined_ev: f64,
    pub avg_correlation: f64,
    pub quality: String,
    pub logic: String,
    pub leg_set_key: String,
}

impl From<&Parlay> for ParlayRow {
    fn from(p: &Parlay) -> Self {
        Self {
            sport: p.sport.clone(),
            game_id: p.game_id.clone(),
            anchor: p.anchor().describe(),
            legs: p.legs.iter().map(ParlayLegRow::from).collect(),
            independent_prob: p.independent_prob,
            combined_prob: p.combined_prob,
            combined_decimal_odds: p.combined_decimal_odds,
            combined_ev: p.combined_ev,
            avg_correlation: p.avg_correlation,
            quality: p.quality.to_string(),
            logic: p.logic.clone(),
            leg_set_key: p.leg_set_key(),
        }
    }
}

/// One persisted run, as listed by GET /runs.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RunRow {
    pub id: i64,
    pub sport: String,
    pub run_at: String,
    pub projections: i64,
    pub odds_records: i64,
    pub matched: i64,
    pub match_rate: f64,
    pub scored: i64,
    pub parlays: i64,
}
