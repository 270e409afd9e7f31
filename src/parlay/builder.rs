use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, info};

use crate::matcher::normalize::{canonical_game_id, fold_token};
use crate::parlay::anchor::{best_price_legs, AnchorCandidate};
use crate::parlay::correlation::CorrelationTable;
use crate::pricing::expected_value;
use crate::types::{Leg, Parlay, ParlayStats, QualityTier, ScoredBet};

#[derive(Debug, Clone)]
pub struct ParlaySettings {
    /// Anchor included.
    pub max_legs: usize,
    pub companion_ev_floor: f64,
    pub min_correlation: f64,
    /// Explicitly linked game pairs (order-insensitive).
    pub linked_games: Vec<(String, String)>,
    /// Keep only the best N parlays. Set per sport.
    pub max_parlays: Option<usize>,
}

impl Default for ParlaySettings {
    fn default() -> Self {
        Self {
            max_legs: 6,
            companion_ev_floor: 0.01,
            min_correlation: 0.5,
            linked_games: Vec::new(),
            max_parlays: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ParlayOutcome {
    pub parlays: Vec<Parlay>,
    pub stats: ParlayStats,
}

// ---------------------------------------------------------------------------
// Game links
// ---------------------------------------------------------------------------

/// Decides whether a companion from another game may join an anchor.
#[derive(Debug, Default)]
pub struct GameLinks {
    pairs: HashSet<(String, String)>,
    /// canonical game -> teams seen in it
    teams: HashMap<String, BTreeSet<String>>,
    same_matchup: bool,
}

impl GameLinks {
    pub fn new(explicit: &[(String, String)], same_matchup: bool, pool: &[Leg]) -> Self {
        let mut pairs = HashSet::new();
        for (a, b) in explicit {
            let (a, b) = (canonical_game_id(a), canonical_game_id(b));
            pairs.insert((a.clone(), b.clone()));
            pairs.insert((b, a));
        }

        let mut teams: HashMap<String, BTreeSet<String>> = HashMap::new();
        if same_matchup {
            for leg in pool {
                if let Some(team) = leg.team.as_deref().map(fold_token).filter(|t| !t.is_empty()) {
                    teams.entry(canonical_game_id(&leg.game_id)).or_default().insert(team);
                }
            }
        }

        Self { pairs, teams, same_matchup }
    }

    pub fn linked(&self, a: &str, b: &str) -> bool {
        let (a, b) = (canonical_game_id(a), canonical_game_id(b));
        if a == b || self.pairs.contains(&(a.clone(), b.clone())) {
            return true;
        }
        if !self.same_matchup {
            return false;
        }
        // doubleheaders: same two teams on both sides
        match (self.teams.get(&a), self.teams.get(&b)) {
            (Some(ta), Some(tb)) => ta.len() == 2 && ta == tb,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// EV desc, then |correlation| desc, then identity.
fn companion_cmp(a: &Leg, b: &Leg) -> Ordering {
    let corr = |l: &Leg| l.correlation.unwrap_or(0.0).abs();
    b.ev
        .total_cmp(&a.ev)
        .then_with(|| corr(b).total_cmp(&corr(a)))
        .then_with(|| a.game_id.cmp(&b.game_id))
        .then_with(|| a.identity_cmp(b))
}

/// Greedy parlay per anchor; duplicates by leg set keep the higher combined EV.
pub fn build_parlays(
    sport: &str,
    anchors: &[AnchorCandidate],
    scored: &[ScoredBet],
    correlations: &CorrelationTable,
    links: &GameLinks,
    settings: &ParlaySettings,
) -> ParlayOutcome {
    let pool = best_price_legs(scored);
    let mut stats = ParlayStats {
        anchors: anchors.len(),
        ..Default::default()
    };
    let mut by_key: HashMap<String, Parlay> = HashMap::new();

    for anchor in anchors {
        let anchor = &anchor.leg;

        let mut candidates: Vec<Leg> = pool
            .iter()
            .filter(|c| links.linked(&anchor.game_id, &c.game_id))
            .filter(|c| !c.same_player_market(anchor))
            .filter(|c| c.ev >= settings.companion_ev_floor)
            .filter_map(|c| {
                let link = correlations.link_for(anchor, c, settings.min_correlation)?;
                let mut leg = c.clone();
                leg.correlation = Some(link.strength);
                leg.link_logic = Some(link.logic.clone());
                Some(leg)
            })
            .collect();
        candidates.sort_by(companion_cmp);

        let mut legs = vec![anchor.clone()];
        for c in candidates {
            if legs.len() >= settings.max_legs {
                break;
            }
            if legs.iter().any(|l| l.same_player_market(&c)) {
                continue;
            }
            legs.push(c);
        }

        if legs.len() < 2 {
            stats.anchors_without_companions += 1;
            debug!("[PARLAY] no companions for anchor {}", anchor.describe());
            continue;
        }

        let Some(parlay) = assemble(sport, legs, correlations) else {
            continue;
        };

        let key = parlay.leg_set_key();
        match by_key.get(&key).map(|existing| existing.combined_ev) {
            Some(existing_ev) if existing_ev >= parlay.combined_ev => {
                stats.duplicates_dropped += 1;
            }
            Some(_) => {
                stats.duplicates_dropped += 1;
                by_key.insert(key, parlay);
            }
            None => {
                by_key.insert(key, parlay);
            }
        }
    }

    let mut parlays: Vec<Parlay> = by_key.into_values().collect();
    parlays.sort_by(|a, b| {
        b.combined_ev
            .total_cmp(&a.combined_ev)
            .then_with(|| a.leg_set_key().cmp(&b.leg_set_key()))
    });
    if let Some(max) = settings.max_parlays {
        stats.truncated = parlays.len().saturating_sub(max);
        parlays.truncate(max);
    }
    stats.built = parlays.len();

    info!(
        anchors = stats.anchors,
        built = stats.built,
        without_companions = stats.anchors_without_companions,
        duplicates = stats.duplicates_dropped,
        truncated = stats.truncated,
        "[PARLAY] built {} parlays from {} anchors",
        stats.built,
        stats.anchors
    );

    ParlayOutcome { parlays, stats }
}

/// Combined probability, odds and EV for an ordered leg list (anchor first).
fn assemble(sport: &str, legs: Vec<Leg>, correlations: &CorrelationTable) -> Option<Parlay> {
    let independent_prob: f64 = legs.iter().map(|l| l.true_prob).product();

    let mut lift = 1.0;
    for (i, a) in legs.iter().enumerate() {
        for b in &legs[i + 1..] {
            lift *= correlations.joint_multiplier(a, b);
        }
    }
    let cap = legs.iter().map(|l| l.true_prob).fold(1.0, f64::min);
    let combined_prob = (independent_prob * lift).min(cap);

    let combined_decimal_odds = legs
        .iter()
        .try_fold(1.0, |acc, l| l.price.decimal_odds().map(|d| acc * d))?;
    let combined_ev = expected_value(combined_prob, combined_decimal_odds - 1.0);

    let companions = &legs[1..];
    let avg_correlation = companions
        .iter()
        .map(|l| l.correlation.unwrap_or(0.0).abs())
        .sum::<f64>()
        / companions.len() as f64;
    let mean_leg_ev = legs.iter().map(|l| l.ev).sum::<f64>() / legs.len() as f64;
    let quality = quality_tier(avg_correlation, mean_leg_ev, companions.len());

    Some(Parlay {
        sport: sport.to_string(),
        game_id: legs[0].game_id.clone(),
        logic: logic_string(&legs),
        independent_prob,
        combined_prob,
        combined_decimal_odds,
        combined_ev,
        avg_correlation,
        quality,
        legs,
    })
}

pub fn quality_tier(avg_correlation: f64, mean_leg_ev: f64, companions: usize) -> QualityTier {
    if avg_correlation >= 0.70 && mean_leg_ev >= 0.035 && companions <= 3 {
        QualityTier::Excellent
    } else if avg_correlation >= 0.60 && mean_leg_ev >= 0.025 && companions <= 4 {
        QualityTier::Good
    } else if avg_correlation >= 0.50 && mean_leg_ev >= 0.02 {
        QualityTier::Fair
    } else {
        QualityTier::Speculative
    }
}

fn logic_string(legs: &[Leg]) -> String {
    let companions: Vec<String> = legs[1..]
        .iter()
        .map(|l| match l.link_logic.as_deref() {
            Some(logic) if !logic.is_empty() => format!("{} ({logic})", l.describe()),
            _ => l.describe(),
        })
        .collect();
    format!("Anchor: {} → Correlated: {}", legs[0].describe(), companions.join("; "))
}
