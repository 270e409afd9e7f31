use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::matcher::normalize::{
    canonical_game_id, canonical_player_name, initial_key, SynonymTable,
};
use crate::types::{MatchStats, MatchedBet, OddsRecord, ProjectionRecord};

/// Float slack applied on top of the configured line tolerance.
const LINE_EPSILON: f64 = 1e-9;

/// How competing odds lines for one projection are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookPolicy {
    /// Exactly one line per projection: most recent, then lowest sportsbook id.
    #[default]
    SingleBest,
    /// One line per sportsbook; best price is picked downstream.
    PerBook,
}

impl FromStr for BookPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single_best" | "single" => Ok(BookPolicy::SingleBest),
            "per_book" => Ok(BookPolicy::PerBook),
            other => Err(format!("unknown book policy '{other}' (expected single_best or per_book)")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MatchSettings {
    /// Maximum |projection line - odds line| still considered the same line.
    pub line_tolerance: f64,
    pub book_policy: BookPolicy,
    /// Match rate under which a data-drift warning is logged.
    pub min_match_rate: f64,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            line_tolerance: 0.0,
            book_policy: BookPolicy::SingleBest,
            min_match_rate: 0.25,
        }
    }
}

impl MatchSettings {
    pub fn lines_agree(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.line_tolerance + LINE_EPSILON
    }
}

#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub matched: Vec<MatchedBet>,
    pub stats: MatchStats,
}

/// (canonical player, canonical market, canonical game)
type MatchKey = (String, String, String);

struct KeyedOdds<'a> {
    record: &'a OddsRecord,
    index: usize,
    canonical_player: String,
    canonical_market: String,
}

struct KeyedProjection<'a> {
    record: &'a ProjectionRecord,
    index: usize,
    canonical_player: String,
    canonical_market: String,
    game: String,
}

struct Candidate<'a> {
    odds: &'a KeyedOdds<'a>,
    line_distance: f64,
}

/// Align projections with sportsbook lines.
///
/// Records are keyed by (canonical player, canonical market, game) and agree
/// on line within `settings.line_tolerance`. Output order follows projection
/// input order, then sportsbook id for per-book matches.
pub fn match_lines(
    projections: &[ProjectionRecord],
    odds: &[OddsRecord],
    synonyms: &SynonymTable,
    settings: &MatchSettings,
) -> MatchOutcome {
    let mut stats = MatchStats {
        projections_in: projections.len(),
        odds_in: odds.len(),
        ..Default::default()
    };
    let mut unknown_labels: HashSet<String> = HashSet::new();

    let keyed: Vec<KeyedOdds> = odds
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let (canonical_market, known) = synonyms.canonical(&record.market);
            if !known {
                unknown_labels.insert(canonical_market.clone());
            }
            KeyedOdds {
                record,
                index,
                canonical_player: canonical_player_name(
                    &record.player.name,
                    record.player.team.as_deref(),
                ),
                canonical_market,
            }
        })
        .collect();

    let mut by_key: HashMap<MatchKey, Vec<usize>> = HashMap::new();
    let mut by_initial: HashMap<MatchKey, Vec<usize>> = HashMap::new();
    for (i, k) in keyed.iter().enumerate() {
        let game = canonical_game_id(&k.record.game_id);
        by_key
            .entry((k.canonical_player.clone(), k.canonical_market.clone(), game.clone()))
            .or_default()
            .push(i);
        if let Some(initial) = initial_key(&k.canonical_player) {
            by_initial
                .entry((initial, k.canonical_market.clone(), game))
                .or_default()
                .push(i);
        }
    }

    let kept: Vec<KeyedProjection> = dedup_projections(projections, synonyms, &mut stats, &mut unknown_labels)
        .into_iter()
        .map(|(index, record)| KeyedProjection {
            record,
            index,
            canonical_player: canonical_player_name(&record.player.name, record.player.team.as_deref()),
            canonical_market: synonyms.canonical(&record.market).0,
            game: canonical_game_id(&record.game_id),
        })
        .collect();

    // distinct projected names behind each initial key
    let mut initial_claims: HashMap<MatchKey, HashSet<&str>> = HashMap::new();
    for p in &kept {
        if let Some(initial) = initial_key(&p.canonical_player) {
            initial_claims
                .entry((initial, p.canonical_market.clone(), p.game.clone()))
                .or_default()
                .insert(p.canonical_player.as_str());
        }
    }

    let mut used_odds: HashSet<usize> = HashSet::new();
    let mut matched = Vec::new();

    for p in &kept {
        let (projection, proj_idx) = (p.record, p.index);
        let key = (p.canonical_player.clone(), p.canonical_market.clone(), p.game.clone());
        let mut candidates = line_candidates(by_key.get(&key), &keyed, projection.line, settings);

        if candidates.is_empty() {
            if let Some(initial) = initial_key(&p.canonical_player) {
                let initial = (initial, p.canonical_market.clone(), p.game.clone());
                let claimants = initial_claims.get(&initial).map_or(0, HashSet::len);
                let fallback = line_candidates(by_initial.get(&initial), &keyed, projection.line, settings);
                let names: HashSet<&str> = fallback
                    .iter()
                    .map(|c| c.odds.canonical_player.as_str())
                    .collect();
                if names.len() == 1 && claimants == 1 {
                    stats.initial_fallbacks += 1;
                    candidates = fallback;
                } else if !fallback.is_empty() && claimants > 1 {
                    stats.ambiguous_initials += 1;
                }
            }
        }

        if candidates.is_empty() {
            stats.unmatched_projections += 1;
            debug!(
                player = %projection.player.name,
                market = %projection.market,
                line = projection.line,
                game = %projection.game_id,
                "[MATCH] no odds line for projection #{proj_idx}"
            );
            continue;
        }
        if candidates.len() > 1 {
            stats.ambiguous_resolved += 1;
        }
        let books = candidates
            .iter()
            .map(|c| c.odds.record.sportsbook.as_str())
            .collect::<HashSet<_>>()
            .len();

        for chosen in resolve(candidates, settings.book_policy) {
            used_odds.insert(chosen.odds.index);
            matched.push(MatchedBet {
                projection: projection.clone(),
                odds: chosen.odds.record.clone(),
                canonical_player: p.canonical_player.clone(),
                canonical_market: p.canonical_market.clone(),
                books,
            });
        }
    }

    stats.matched = matched.len();
    stats.unmatched_odds = odds.len() - used_odds.len();
    stats.unknown_market_labels = unknown_labels.len();

    let rate = stats.match_rate();
    info!(
        matched = stats.matched,
        unmatched_projections = stats.unmatched_projections,
        unmatched_odds = stats.unmatched_odds,
        match_rate = rate,
        "[MATCH] {} projections x {} odds lines -> {} matches ({:.1}% of projections)",
        stats.projections_in,
        stats.odds_in,
        stats.matched,
        rate * 100.0,
    );
    if stats.projections_in > 0 && rate < settings.min_match_rate {
        warn!(
            match_rate = rate,
            threshold = settings.min_match_rate,
            unknown_market_labels = ?unknown_labels,
            "[MATCH] match rate {:.1}% below {:.1}%, check upstream names and market labels",
            rate * 100.0,
            settings.min_match_rate * 100.0,
        );
    }

    MatchOutcome { matched, stats }
}

/// Collapses re-scraped projections (same key and line) to the most recent one.
/// Returns (input index, record) pairs in input order.
fn dedup_projections<'a>(
    projections: &'a [ProjectionRecord],
    synonyms: &SynonymTable,
    stats: &mut MatchStats,
    unknown_labels: &mut HashSet<String>,
) -> Vec<(usize, &'a ProjectionRecord)> {
    let mut latest: HashMap<(MatchKey, u64), usize> = HashMap::new();
    for (i, p) in projections.iter().enumerate() {
        let (market, known) = synonyms.canonical(&p.market);
        if !known {
            unknown_labels.insert(market.clone());
        }
        let key = (
            (
                canonical_player_name(&p.player.name, p.player.team.as_deref()),
                market,
                canonical_game_id(&p.game_id),
            ),
            p.line.to_bits(),
        );
        match latest.get(&key) {
            Some(&prev) if projections[prev].fetched_at >= p.fetched_at => {
                stats.duplicate_projections += 1;
            }
            Some(_) => {
                stats.duplicate_projections += 1;
                latest.insert(key, i);
            }
            None => {
                latest.insert(key, i);
            }
        }
    }

    let mut kept: Vec<usize> = latest.into_values().collect();
    kept.sort_unstable();
    kept.into_iter().map(|i| (i, &projections[i])).collect()
}

fn line_candidates<'a>(
    indices: Option<&Vec<usize>>,
    keyed: &'a [KeyedOdds<'a>],
    line: f64,
    settings: &MatchSettings,
) -> Vec<Candidate<'a>> {
    indices
        .map(|idx| {
            idx.iter()
                .map(|&i| &keyed[i])
                .filter(|k| settings.lines_agree(k.record.line, line))
                .map(|k| Candidate {
                    odds: k,
                    line_distance: (k.record.line - line).abs(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Total order: better candidates sort first.
fn candidate_order(a: &Candidate, b: &Candidate) -> Ordering {
    b.odds
        .record
        .fetched_at
        .cmp(&a.odds.record.fetched_at)
        .then_with(|| a.odds.record.sportsbook.cmp(&b.odds.record.sportsbook))
        .then_with(|| a.line_distance.total_cmp(&b.line_distance))
        .then_with(|| a.odds.index.cmp(&b.odds.index))
}

fn resolve<'a>(mut candidates: Vec<Candidate<'a>>, policy: BookPolicy) -> Vec<Candidate<'a>> {
    candidates.sort_by(candidate_order);
    match policy {
        BookPolicy::SingleBest => candidates.into_iter().take(1).collect(),
        BookPolicy::PerBook => {
            let mut per_book: BTreeMap<&str, Candidate<'a>> = BTreeMap::new();
            for c in candidates {
                // already sorted best-first, so the first seen per book wins
                per_book.entry(c.odds.record.sportsbook.as_str()).or_insert(c);
            }
            per_book.into_values().collect()
        }
    }
}
