use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::matcher::normalize::canonical_game_id;
use crate::types::{Leg, ScoredBet, Side};

/// Which legs may serve as the base of a parlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnchorRule {
    /// Role-restricted markets (MLB: pitcher markets).
    RoleMarkets {
        markets: Vec<String>,
        min_ev: f64,
        /// Empty allows both sides.
        #[serde(default)]
        sides: Vec<Side>,
    },
    AllMarkets { min_ev: f64 },
}

impl AnchorRule {
    pub fn admits(&self, leg: &Leg) -> bool {
        match self {
            AnchorRule::RoleMarkets { markets, min_ev, sides } => {
                markets.iter().any(|m| *m == leg.market)
                    && (sides.is_empty() || sides.contains(&leg.side))
                    && leg.ev >= *min_ev
            }
            AnchorRule::AllMarkets { min_ev } => leg.ev >= *min_ev,
        }
    }

    pub fn min_ev(&self) -> f64 {
        match self {
            AnchorRule::RoleMarkets { min_ev, .. } | AnchorRule::AllMarkets { min_ev } => *min_ev,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnchorCandidate {
    pub leg: Leg,
    /// 1-based rank inside its game.
    pub rank: usize,
}

/// Every side of every scored bet, keeping only the best-EV book for each
/// (game, player, market, line, side). Ties go to the lowest sportsbook id.
pub fn best_price_legs(scored: &[ScoredBet]) -> Vec<Leg> {
    let mut best: HashMap<String, Leg> = HashMap::new();
    for bet in scored {
        for side in Side::BOTH {
            let leg = Leg::from_scored(bet, side);
            let key = leg.prop_key();
            let replace = best.get(&key).map_or(true, |current| beats(&leg, current));
            if replace {
                best.insert(key, leg);
            }
        }
    }

    let mut legs: Vec<Leg> = best.into_values().collect();
    legs.sort_by(|a, b| a.game_id.cmp(&b.game_id).then_with(|| a.identity_cmp(b)));
    legs
}

fn beats(candidate: &Leg, current: &Leg) -> bool {
    match candidate.ev.total_cmp(&current.ev) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => candidate.sportsbook < current.sportsbook,
    }
}

/// EV desc, then |true - no-vig| desc, then identity.
pub fn rank_cmp(a: &Leg, b: &Leg) -> Ordering {
    b.ev
        .total_cmp(&a.ev)
        .then_with(|| b.edge().abs().total_cmp(&a.edge().abs()))
        .then_with(|| a.identity_cmp(b))
}

/// Top `per_game` eligible legs of each game, ordered by game then rank.
pub fn select_anchors(scored: &[ScoredBet], rule: &AnchorRule, per_game: usize) -> Vec<AnchorCandidate> {
    let mut by_game: BTreeMap<String, Vec<Leg>> = BTreeMap::new();
    let mut eligible = 0usize;
    for leg in best_price_legs(scored) {
        if rule.admits(&leg) {
            eligible += 1;
            by_game.entry(canonical_game_id(&leg.game_id)).or_default().push(leg);
        }
    }

    let mut anchors = Vec::new();
    for (game, mut legs) in by_game {
        legs.sort_by(rank_cmp);
        for (i, leg) in legs.into_iter().take(per_game).enumerate() {
            debug!(
                game = %game,
                rank = i + 1,
                ev = leg.ev,
                "[ANCHOR] {} @ {} ({})",
                leg.describe(),
                leg.price,
                leg.sportsbook
            );
            anchors.push(AnchorCandidate { leg, rank: i + 1 });
        }
    }

    info!(
        eligible,
        selected = anchors.len(),
        min_ev = rule.min_ev(),
        "[ANCHOR] selected {} anchors from {} eligible legs (max {} per game)",
        anchors.len(),
        eligible,
        per_game
    );
    anchors
}
