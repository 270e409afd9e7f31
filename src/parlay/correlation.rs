use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::matcher::normalize::fold_token;
use crate::matcher::SynonymTable;
use crate::types::Leg;

/// Which team the companion must play for, relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRelation {
    OpposingTeam,
    SameTeam,
    AnyTeam,
}

impl TeamRelation {
    /// Unknown teams only satisfy `AnyTeam`.
    pub fn holds(&self, a: Option<&str>, b: Option<&str>) -> bool {
        if *self == TeamRelation::AnyTeam {
            return true;
        }
        let (Some(a), Some(b)) = (a.map(fold_token), b.map(fold_token)) else {
            return false;
        };
        if a.is_empty() || b.is_empty() {
            return false;
        }
        match self {
            TeamRelation::OpposingTeam => a != b,
            TeamRelation::SameTeam => a == b,
            TeamRelation::AnyTeam => true,
        }
    }
}

fn default_joint_multiplier() -> f64 {
    1.0
}

/// A declared statistical link from an anchor market to a companion market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationLink {
    pub anchor_market: String,
    pub companion_market: String,
    /// Signed strength in [-1, 1]. Positive: same side as the anchor.
    pub strength: f64,
    pub relation: TeamRelation,
    /// Lift applied to the joint probability when both legs are in one parlay.
    #[serde(default = "default_joint_multiplier")]
    pub joint_multiplier: f64,
    #[serde(default)]
    pub logic: String,
}

impl CorrelationLink {
    /// Team relation and side direction hold for this pair of legs.
    pub fn holds(&self, anchor: &Leg, companion: &Leg) -> bool {
        if anchor.market != self.anchor_market || companion.market != self.companion_market {
            return false;
        }
        if !self.relation.holds(anchor.team.as_deref(), companion.team.as_deref()) {
            return false;
        }
        if self.strength >= 0.0 {
            companion.side == anchor.side
        } else {
            companion.side == anchor.side.opposite()
        }
    }
}

/// Links indexed by (anchor market, companion market).
#[derive(Debug, Clone, Default)]
pub struct CorrelationTable {
    links: HashMap<(String, String), Vec<CorrelationLink>>,
    len: usize,
}

impl CorrelationTable {
    /// Market labels are canonicalized through the sport's synonym table.
    pub fn new(links: &[CorrelationLink], synonyms: &SynonymTable) -> Self {
        let mut table = Self::default();
        for link in links {
            let mut link = link.clone();
            link.anchor_market = synonyms.canonical(&link.anchor_market).0;
            link.companion_market = synonyms.canonical(&link.companion_market).0;
            table
                .links
                .entry((link.anchor_market.clone(), link.companion_market.clone()))
                .or_default()
                .push(link);
            table.len += 1;
        }
        table
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Strongest link from `anchor` to `companion` that holds and reaches
    /// `min_strength` in absolute value.
    pub fn link_for(&self, anchor: &Leg, companion: &Leg, min_strength: f64) -> Option<&CorrelationLink> {
        self.links
            .get(&(anchor.market.clone(), companion.market.clone()))?
            .iter()
            .filter(|l| l.strength.abs() >= min_strength && l.holds(anchor, companion))
            .max_by(|a, b| a.strength.abs().total_cmp(&b.strength.abs()))
    }

    /// Joint-probability lift for a pair of legs in either order; 1.0 when no
    /// declared link holds.
    pub fn joint_multiplier(&self, a: &Leg, b: &Leg) -> f64 {
        self.link_for(a, b, 0.0)
            .or_else(|| self.link_for(b, a, 0.0))
            .map_or(1.0, |l| l.joint_multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Price, Side};

    fn leg(market: &str, team: &str, side: Side) -> Leg {
        Leg {
            player: format!("{market} player"),
            team: Some(team.to_string()),
            canonical_player: format!("{market} player"),
            market: market.to_string(),
            line: 0.5,
            side,
            sportsbook: "fanduel".to_string(),
            game_id: "G1".to_string(),
            price: Price::American(-110.0),
            true_prob: 0.55,
            no_vig_prob: 0.5,
            ev: 0.05,
            books: 1,
            correlation: None,
            link_logic: None,
        }
    }

    fn table() -> CorrelationTable {
        let synonyms = SynonymTable::new(&HashMap::from([
            ("ks".to_string(), "pitcher_strikeouts".to_string()),
            ("hits".to_string(), "batter_hits".to_string()),
        ]));
        CorrelationTable::new(
            &[CorrelationLink {
                anchor_market: "Ks".to_string(),
                companion_market: "Hits".to_string(),
                strength: -0.7,
                relation: TeamRelation::OpposingTeam,
                joint_multiplier: 1.05,
                logic: "More strikeouts = fewer hits".to_string(),
            }],
            &synonyms,
        )
    }

    #[test]
    fn negative_link_wants_the_opposite_side_on_the_other_team() {
        let t = table();
        let anchor = leg("pitcher_strikeouts", "NYY", Side::Over);

        assert!(t.link_for(&anchor, &leg("batter_hits", "BOS", Side::Under), 0.5).is_some());
        assert!(t.link_for(&anchor, &leg("batter_hits", "BOS", Side::Over), 0.5).is_none());
        assert!(t.link_for(&anchor, &leg("batter_hits", "nyy", Side::Under), 0.5).is_none());
        assert!(t.link_for(&anchor, &leg("batter_hits", "BOS", Side::Under), 0.8).is_none());
    }

    #[test]
    fn joint_multiplier_is_symmetric() {
        let t = table();
        let k = leg("pitcher_strikeouts", "NYY", Side::Over);
        let h = leg("batter_hits", "BOS", Side::Under);
        assert_eq!(t.joint_multiplier(&k, &h), 1.05);
        assert_eq!(t.joint_multiplier(&h, &k), 1.05);
        assert_eq!(t.joint_multiplier(&h, &h), 1.0);
    }

    #[test]
    fn team_relation_with_missing_team() {
        assert!(TeamRelation::AnyTeam.holds(None, Some("BOS")));
        assert!(!TeamRelation::OpposingTeam.holds(None, Some("BOS")));
        assert!(TeamRelation::SameTeam.holds(Some("Bos "), Some("BOS")));
    }
}
