use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::models::{RawOddsRow, RawProjectionRow};
use crate::matcher::normalize::canonical_player_name;
use crate::types::{IngestStats, OddsRecord, PlayerIdentity, Price, ProjectionRecord, Side};

/// Widest American price still treated as a real quote.
const MAX_AMERICAN: f64 = 2000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OddsFormat {
    #[default]
    American,
    Decimal,
}

impl FromStr for OddsFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "american" | "us" => Ok(OddsFormat::American),
            "decimal" | "eu" => Ok(OddsFormat::Decimal),
            other => Err(format!("unknown odds format '{other}' (expected american or decimal)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RejectReason {
    MissingName,
    MissingTeam,
    MissingMarket,
    BadLine,
    MissingSide,
    MissingBook,
    UnlistedBook,
    MissingGame,
    BadTimestamp,
}

impl RejectReason {
    fn count(self, stats: &mut IngestStats) {
        let counter = match self {
            RejectReason::MissingName => &mut stats.rejected_missing_name,
            RejectReason::MissingTeam => &mut stats.rejected_missing_team,
            RejectReason::MissingMarket => &mut stats.rejected_missing_market,
            RejectReason::BadLine => &mut stats.rejected_bad_line,
            RejectReason::MissingSide => &mut stats.rejected_missing_side,
            RejectReason::MissingBook => &mut stats.rejected_missing_book,
            RejectReason::UnlistedBook => &mut stats.rejected_unlisted_book,
            RejectReason::MissingGame => &mut stats.rejected_missing_game,
            RejectReason::BadTimestamp => &mut stats.rejected_bad_timestamp,
        };
        *counter += 1;
    }
}

#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub projections: Vec<ProjectionRecord>,
    pub odds: Vec<OddsRecord>,
    pub stats: IngestStats,
}

/// Turn raw rows into records. Malformed rows are dropped and counted;
/// one-row-per-outcome odds are paired into two-sided lines. A non-empty
/// `sportsbooks` list drops odds rows from any other book.
pub fn ingest(
    sport: &str,
    projection_rows: &[RawProjectionRow],
    odds_rows: &[RawOddsRow],
    format: OddsFormat,
    sportsbooks: &[String],
) -> IngestOutcome {
    let mut out = IngestOutcome {
        stats: IngestStats {
            projection_rows: projection_rows.len(),
            odds_rows: odds_rows.len(),
            ..Default::default()
        },
        ..Default::default()
    };

    for (i, row) in projection_rows.iter().enumerate() {
        match parse_projection(sport, row) {
            Ok(p) => out.projections.push(p),
            Err(reason) => {
                debug!(row = i, ?reason, "[INGEST] projection row rejected");
                reason.count(&mut out.stats);
            }
        }
    }

    let mut outcomes = Vec::with_capacity(odds_rows.len());
    for (i, row) in odds_rows.iter().enumerate() {
        match parse_outcome(sport, row, format, sportsbooks, &mut out.stats) {
            Ok(o) => outcomes.push(o),
            Err(reason) => {
                debug!(row = i, ?reason, "[INGEST] odds row rejected");
                reason.count(&mut out.stats);
            }
        }
    }
    out.odds = pair_outcomes(outcomes, &mut out.stats);

    out.stats.projections = out.projections.len();
    out.stats.odds_records = out.odds.len();
    info!(
        sport,
        projections = out.stats.projections,
        odds = out.stats.odds_records,
        rejected = out.stats.rejected(),
        "[INGEST] {} projections from {} rows, {} lines from {} outcome rows ({} rejected, {} unusable prices)",
        out.stats.projections,
        out.stats.projection_rows,
        out.stats.odds_records,
        out.stats.odds_rows,
        out.stats.rejected(),
        out.stats.unusable_prices,
    );
    out
}

// ---------------------------------------------------------------------------
// Row parsing
// ---------------------------------------------------------------------------

fn text(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_projection(sport: &str, row: &RawProjectionRow) -> Result<ProjectionRecord, RejectReason> {
    let name = text(&row.player_name).ok_or(RejectReason::MissingName)?;
    let team = text(&row.team).ok_or(RejectReason::MissingTeam)?;
    let market = text(&row.market).ok_or(RejectReason::MissingMarket)?;
    let (_, line) = text(&row.line).and_then(parse_line).ok_or(RejectReason::BadLine)?;
    let game_id = text(&row.game_id).ok_or(RejectReason::MissingGame)?;
    let fetched_at = text(&row.fetched_at)
        .and_then(parse_timestamp)
        .ok_or(RejectReason::BadTimestamp)?;

    Ok(ProjectionRecord {
        player: PlayerIdentity {
            name: name.to_string(),
            team: Some(team.to_string()),
            sport: text(&row.sport).unwrap_or(sport).to_uppercase(),
        },
        market: market.to_string(),
        line,
        true_prob_over: text(&row.true_prob_over).and_then(parse_probability),
        game_id: game_id.to_string(),
        fetched_at,
    })
}

/// One side of one sportsbook line, before pairing.
struct Outcome {
    player: PlayerIdentity,
    market: String,
    line: f64,
    side: Side,
    price: Option<Price>,
    sportsbook: String,
    game_id: String,
    fetched_at: DateTime<Utc>,
}

fn parse_outcome(
    sport: &str,
    row: &RawOddsRow,
    format: OddsFormat,
    sportsbooks: &[String],
    stats: &mut IngestStats,
) -> Result<Outcome, RejectReason> {
    let name = text(&row.player_name).ok_or(RejectReason::MissingName)?;
    let market = text(&row.market).ok_or(RejectReason::MissingMarket)?;
    let (line_side, line) = text(&row.line).and_then(parse_line).ok_or(RejectReason::BadLine)?;
    let side = text(&row.side)
        .and_then(Side::parse)
        .or(line_side)
        .ok_or(RejectReason::MissingSide)?;
    let sportsbook = text(&row.sportsbook).ok_or(RejectReason::MissingBook)?;
    if !sportsbooks.is_empty() && !sportsbooks.iter().any(|b| b.trim().eq_ignore_ascii_case(sportsbook)) {
        return Err(RejectReason::UnlistedBook);
    }
    let game_id = text(&row.game_id).ok_or(RejectReason::MissingGame)?;
    let fetched_at = text(&row.fetched_at)
        .and_then(parse_timestamp)
        .ok_or(RejectReason::BadTimestamp)?;

    let price = match text(&row.price) {
        Some(raw) => {
            let price = parse_price(raw, format);
            if price.is_none() {
                stats.unusable_prices += 1;
            }
            price
        }
        None => None,
    };

    Ok(Outcome {
        player: PlayerIdentity {
            name: name.to_string(),
            team: text(&row.team).map(str::to_string),
            sport: text(&row.sport).unwrap_or(sport).to_uppercase(),
        },
        market: market.to_string(),
        line,
        side,
        price,
        sportsbook: sportsbook.to_lowercase(),
        game_id: game_id.to_string(),
        fetched_at,
    })
}

/// `"6.5"`, `"Over 6.5"`, `"u 0.5"`. The side is returned when the text names one.
pub fn parse_line(raw: &str) -> Option<(Option<Side>, f64)> {
    let raw = raw.trim();
    let (side, number) = match raw.split_once(char::is_whitespace) {
        Some((word, rest)) => match Side::parse(word) {
            Some(side) => (Some(side), rest.trim()),
            None => (None, raw),
        },
        None => (None, raw),
    };
    let value: f64 = number.parse().ok()?;
    value.is_finite().then_some((side, value))
}

/// Usable quote in the configured format, or None.
pub fn parse_price(raw: &str, format: OddsFormat) -> Option<Price> {
    let value: f64 = raw.trim().trim_start_matches('+').parse().ok()?;
    let price = match format {
        OddsFormat::American => Price::American(value),
        OddsFormat::Decimal => Price::Decimal(value),
    };
    let decimal = price.decimal_odds()?;
    let usable = (1.0 + 100.0 / MAX_AMERICAN)..=(1.0 + MAX_AMERICAN / 100.0);
    usable.contains(&decimal).then_some(price)
}

/// Plain probability or a percentage ("58%").
fn parse_probability(raw: &str) -> Option<f64> {
    match raw.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f64>().ok().map(|v| v / 100.0),
        None => raw.parse().ok(),
    }
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Pairing
// ---------------------------------------------------------------------------

/// (canonical player, market, line bits, sportsbook, game)
type PairKey = (String, String, u64, String, String);

struct Pending {
    over: Option<Outcome>,
    under: Option<Outcome>,
}

fn pair_outcomes(outcomes: Vec<Outcome>, stats: &mut IngestStats) -> Vec<OddsRecord> {
    let mut index: HashMap<PairKey, usize> = HashMap::new();
    let mut pending: Vec<Pending> = Vec::new();

    for o in outcomes {
        let key = (
            canonical_player_name(&o.player.name, o.player.team.as_deref()),
            o.market.to_lowercase(),
            o.line.to_bits(),
            o.sportsbook.clone(),
            o.game_id.to_lowercase(),
        );
        let slot = *index.entry(key).or_insert_with(|| {
            pending.push(Pending { over: None, under: None });
            pending.len() - 1
        });
        let entry = match o.side {
            Side::Over => &mut pending[slot].over,
            Side::Under => &mut pending[slot].under,
        };
        match entry.as_ref().map(|current| current.fetched_at) {
            // later row for the same side wins
            Some(current) if current > o.fetched_at => {
                stats.superseded_outcome_rows += 1;
            }
            Some(_) => {
                stats.superseded_outcome_rows += 1;
                *entry = Some(o);
            }
            None => *entry = Some(o),
        }
    }

    pending.into_iter().filter_map(into_record).collect()
}

fn into_record(p: Pending) -> Option<OddsRecord> {
    let fetched_at = match (&p.over, &p.under) {
        (Some(o), Some(u)) => o.fetched_at.max(u.fetched_at),
        (Some(o), None) => o.fetched_at,
        (None, Some(u)) => u.fetched_at,
        (None, None) => return None,
    };
    let price_over = p.over.as_ref().and_then(|o| o.price);
    let price_under = p.under.as_ref().and_then(|u| u.price);
    let team = p
        .over
        .as_ref()
        .and_then(|o| o.player.team.clone())
        .or_else(|| p.under.as_ref().and_then(|u| u.player.team.clone()));

    let base = p.over.or(p.under)?;
    Some(OddsRecord {
        player: PlayerIdentity { team, ..base.player },
        market: base.market,
        line: base.line,
        price_over,
        price_under,
        sportsbook: base.sportsbook,
        game_id: base.game_id,
        fetched_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projection(name: &str, team: &str, line: &str, prob: &str) -> RawProjectionRow {
        RawProjectionRow {
            sport: Some("MLB".to_string()),
            player_name: Some(name.to_string()),
            team: Some(team.to_string()),
            market: Some("Strikeouts".to_string()),
            line: Some(line.to_string()),
            true_prob_over: Some(prob.to_string()),
            game_id: Some("G1".to_string()),
            fetched_at: Some("2025-06-01T17:00:00Z".to_string()),
        }
    }

    fn outcome(side: Option<&str>, line: &str, price: &str, book: &str, at: &str) -> RawOddsRow {
        RawOddsRow {
            sport: Some("MLB".to_string()),
            player_name: Some("Smith, J.".to_string()),
            team: None,
            market: Some("Ks".to_string()),
            line: Some(line.to_string()),
            side: side.map(str::to_string),
            price: Some(price.to_string()),
            sportsbook: Some(book.to_string()),
            game_id: Some("G1".to_string()),
            fetched_at: Some(at.to_string()),
        }
    }

    #[test]
    fn malformed_projection_rows_are_counted_per_reason() {
        let rows = vec![
            projection("J. Smith", "NYY", "6.5", "0.58"),
            projection("", "NYY", "6.5", "0.58"),
            projection("A. Jones", "", "6.5", "0.58"),
            projection("B. Lee", "BOS", "six", "0.58"),
            projection("C. Diaz", "BOS", "4.5", "58%"),
        ];
        let out = ingest("MLB", &rows, &[], OddsFormat::American, &[]);

        assert_eq!(out.projections.len(), 2);
        assert_eq!(out.stats.rejected_missing_name, 1);
        assert_eq!(out.stats.rejected_missing_team, 1);
        assert_eq!(out.stats.rejected_bad_line, 1);
        assert_eq!(out.stats.rejected(), 3);
        assert!((out.projections[1].true_prob_over.unwrap() - 0.58).abs() < 1e-12);
    }

    #[test]
    fn outcome_rows_pair_into_two_sided_lines() {
        let rows = vec![
            outcome(Some("Over"), "6.5", "-110", "FanDuel", "2025-06-01 16:00:00"),
            outcome(None, "Under 6.5", "-110", "fanduel", "2025-06-01 16:05:00"),
            outcome(Some("over"), "6.5", "+105", "draftkings", "2025-06-01 16:00:00"),
        ];
        let out = ingest("MLB", &[], &rows, OddsFormat::American, &[]);

        assert_eq!(out.odds.len(), 2);
        let fd = out.odds.iter().find(|o| o.sportsbook == "fanduel").unwrap();
        assert_eq!(fd.price_over, Some(Price::American(-110.0)));
        assert_eq!(fd.price_under, Some(Price::American(-110.0)));
        assert_eq!(fd.fetched_at, parse_timestamp("2025-06-01 16:05:00").unwrap());

        let dk = out.odds.iter().find(|o| o.sportsbook == "draftkings").unwrap();
        assert_eq!(dk.price_over, Some(Price::American(105.0)));
        assert_eq!(dk.price_under, None);
    }

    #[test]
    fn latest_outcome_row_wins() {
        let rows = vec![
            outcome(Some("over"), "6.5", "-120", "fanduel", "2025-06-01 16:10:00"),
            outcome(Some("over"), "6.5", "-110", "fanduel", "2025-06-01 16:00:00"),
            outcome(Some("under"), "6.5", "-105", "fanduel", "2025-06-01 16:00:00"),
        ];
        let out = ingest("MLB", &[], &rows, OddsFormat::American, &[]);
        assert_eq!(out.odds.len(), 1);
        assert_eq!(out.odds[0].price_over, Some(Price::American(-120.0)));
        assert_eq!(out.stats.superseded_outcome_rows, 1);
    }

    #[test]
    fn outcome_rows_pair_across_name_spellings() {
        let mut under = outcome(Some("under"), "6.5", "-110", "fanduel", "2025-06-01 16:00:00");
        under.player_name = Some("J. Smith".to_string());
        let rows = vec![
            outcome(Some("over"), "6.5", "-110", "fanduel", "2025-06-01 16:00:00"),
            under,
        ];
        let out = ingest("MLB", &[], &rows, OddsFormat::American, &[]);
        assert_eq!(out.odds.len(), 1);
        assert_eq!(out.odds[0].price_over, Some(Price::American(-110.0)));
        assert_eq!(out.odds[0].price_under, Some(Price::American(-110.0)));
    }

    #[test]
    fn unlisted_books_are_dropped_and_counted() {
        let rows = vec![
            outcome(Some("over"), "6.5", "-110", "FanDuel", "2025-06-01 16:00:00"),
            outcome(Some("under"), "6.5", "-110", "fanduel", "2025-06-01 16:00:00"),
            outcome(Some("over"), "6.5", "-105", "sharpbook", "2025-06-01 16:00:00"),
        ];
        let books = vec!["fanduel".to_string(), "draftkings".to_string()];
        let out = ingest("MLB", &[], &rows, OddsFormat::American, &books);
        assert_eq!(out.odds.len(), 1);
        assert_eq!(out.odds[0].sportsbook, "fanduel");
        assert_eq!(out.stats.rejected_unlisted_book, 1);
        assert_eq!(out.stats.rejected(), 1);

        // empty list keeps every book
        let out = ingest("MLB", &[], &rows, OddsFormat::American, &[]);
        assert_eq!(out.odds.len(), 2);
    }

    #[test]
    fn unusable_prices_become_missing() {
        let rows = vec![
            outcome(Some("over"), "6.5", "+2500", "fanduel", "2025-06-01 16:00:00"),
            outcome(Some("under"), "6.5", "n/a", "fanduel", "2025-06-01 16:00:00"),
            outcome(None, "6.5", "-110", "fanduel", "2025-06-01 16:00:00"),
        ];
        let out = ingest("MLB", &[], &rows, OddsFormat::American, &[]);
        assert_eq!(out.odds.len(), 1);
        assert_eq!(out.odds[0].price_over, None);
        assert_eq!(out.odds[0].price_under, None);
        assert_eq!(out.stats.unusable_prices, 2);
        assert_eq!(out.stats.rejected_missing_side, 1);
    }

    #[test]
    fn decimal_format_and_line_text() {
        assert_eq!(parse_price("1.91", OddsFormat::Decimal), Some(Price::Decimal(1.91)));
        assert_eq!(parse_price("0.95", OddsFormat::Decimal), None);
        assert_eq!(parse_price("+150", OddsFormat::American), Some(Price::American(150.0)));
        assert_eq!(parse_line("Over 6.5"), Some((Some(Side::Over), 6.5)));
        assert_eq!(parse_line("0.5"), Some((None, 0.5)));
        assert_eq!(parse_line("Over"), None);
        assert!(parse_timestamp("yesterday").is_none());
    }
}
