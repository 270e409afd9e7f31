use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::{AppError, Result};
use crate::matcher::SynonymTable;
use crate::parlay::{AnchorRule, CorrelationLink, CorrelationTable};

const BUILTIN_PROFILES: &str = include_str!("../config/sports.toml");

fn default_min_books() -> usize {
    1
}

/// Per-sport data as written in the profile TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct SportProfile {
    /// alias -> canonical market label
    #[serde(default)]
    pub market_synonyms: HashMap<String, String>,
    #[serde(default)]
    pub anchor: Option<AnchorRule>,
    #[serde(default)]
    pub correlations: Vec<CorrelationLink>,
    /// Games featuring the same two teams count as linked (doubleheaders).
    #[serde(default)]
    pub link_same_matchup_games: bool,
    /// Books whose odds are read. Empty reads every book.
    #[serde(default)]
    pub sportsbooks: Vec<String>,
    /// Props quoted by fewer books are not scored.
    #[serde(default = "default_min_books")]
    pub min_books: usize,
    /// Cap on parlays kept per run, best combined EV first.
    #[serde(default)]
    pub max_parlays: Option<usize>,
}

impl SportProfile {
    fn validate(&self, sport: &str) -> Result<()> {
        let bad = |msg: String| Err(AppError::Config(format!("sport {sport}: {msg}")));

        match &self.anchor {
            Some(AnchorRule::RoleMarkets { markets, min_ev, .. }) => {
                if markets.is_empty() {
                    return bad("role_markets anchor rule lists no markets".to_string());
                }
                if !min_ev.is_finite() {
                    return bad("anchor min_ev must be finite".to_string());
                }
            }
            Some(AnchorRule::AllMarkets { min_ev }) if !min_ev.is_finite() => {
                return bad("anchor min_ev must be finite".to_string());
            }
            _ => {}
        }

        if self.min_books == 0 {
            return bad("min_books must be at least 1".to_string());
        }
        if self.max_parlays == Some(0) {
            return bad("max_parlays must be at least 1 when set".to_string());
        }

        for link in &self.correlations {
            if !link.strength.is_finite() || !(-1.0..=1.0).contains(&link.strength) {
                return bad(format!(
                    "correlation {} -> {} strength {} outside [-1, 1]",
                    link.anchor_market, link.companion_market, link.strength
                ));
            }
            if !link.joint_multiplier.is_finite() || link.joint_multiplier < 1.0 {
                return bad(format!(
                    "correlation {} -> {} joint_multiplier {} must be >= 1",
                    link.anchor_market, link.companion_market, link.joint_multiplier
                ));
            }
        }
        Ok(())
    }
}

/// Rules for one sport, resolved at the start of a run.
#[derive(Debug, Clone)]
pub struct SportRules {
    pub sport: String,
    pub synonyms: SynonymTable,
    pub anchor: AnchorRule,
    pub correlations: CorrelationTable,
    pub link_same_matchup_games: bool,
    /// Lower-case book keys; empty reads every book.
    pub sportsbooks: Vec<String>,
    pub min_books: usize,
    pub max_parlays: Option<usize>,
}

/// Sport profiles keyed by upper-case sport id.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, SportProfile>,
}

impl ProfileRegistry {
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_PROFILES)
    }

    /// Built-in profiles, then any file at `path` adding or replacing sports.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut registry = Self::builtin()?;
        if let Some(path) = path {
            let replaced = registry.merge_file(Path::new(path))?;
            info!("Loaded sport profiles from {path} ({replaced} sports)");
        }
        Ok(registry)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let raw: BTreeMap<String, SportProfile> = toml::from_str(text)?;
        let mut profiles = BTreeMap::new();
        for (sport, profile) in raw {
            let sport = sport.trim().to_uppercase();
            profile.validate(&sport)?;
            profiles.insert(sport, profile);
        }
        Ok(Self { profiles })
    }

    /// Returns how many sports the file defined.
    pub fn merge_file(&mut self, path: &Path) -> Result<usize> {
        let text = std::fs::read_to_string(path)?;
        let other = Self::from_toml(&text)?;
        let n = other.profiles.len();
        self.profiles.extend(other.profiles);
        Ok(n)
    }

    pub fn sports(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// Unknown sport, missing anchor rule or empty correlation table are
    /// configuration errors.
    pub fn resolve(&self, sport: &str) -> Result<SportRules> {
        let sport = sport.trim().to_uppercase();
        let profile = self
            .profiles
            .get(&sport)
            .ok_or_else(|| {
                AppError::Config(format!(
                    "no sport profile for {sport} (known: {})",
                    self.sports().join(", ")
                ))
            })?;

        let synonyms = SynonymTable::new(&profile.market_synonyms);

        let anchor = match &profile.anchor {
            Some(AnchorRule::RoleMarkets { markets, min_ev, sides }) => AnchorRule::RoleMarkets {
                markets: markets.iter().map(|m| synonyms.canonical(m).0).collect(),
                min_ev: *min_ev,
                sides: sides.clone(),
            },
            Some(rule) => rule.clone(),
            None => {
                return Err(AppError::Config(format!("sport {sport} has no anchor rule")));
            }
        };

        let correlations = CorrelationTable::new(&profile.correlations, &synonyms);
        if correlations.is_empty() {
            return Err(AppError::Config(format!("sport {sport} has no correlation links")));
        }

        Ok(SportRules {
            sport,
            synonyms,
            anchor,
            correlations,
            link_same_matchup_games: profile.link_same_matchup_games,
            sportsbooks: profile
                .sportsbooks
                .iter()
                .map(|b| b.trim().to_lowercase())
                .filter(|b| !b.is_empty())
                .collect(),
            min_books: profile.min_books,
            max_parlays: profile.max_parlays,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parlay::correlation::TeamRelation;

    #[test]
    fn builtin_mlb_profile_resolves() {
        let registry = ProfileRegistry::builtin().unwrap();
        let rules = registry.resolve("mlb").unwrap();

        assert_eq!(rules.sport, "MLB");
        assert_eq!(rules.synonyms.canonical("Ks"), ("pitcher_strikeouts".to_string(), true));
        assert_eq!(rules.synonyms.canonical("Strikeouts").0, "pitcher_strikeouts");
        assert_eq!(rules.correlations.len(), 6);
        assert!(rules.link_same_matchup_games);
        assert!(rules.sportsbooks.contains(&"fanduel".to_string()));
        assert_eq!(rules.min_books, 1);
        assert_eq!(rules.max_parlays, None);
        match &rules.anchor {
            AnchorRule::RoleMarkets { markets, .. } => {
                assert!(markets.contains(&"pitcher_strikeouts".to_string()));
            }
            other => panic!("unexpected anchor rule {other:?}"),
        }

        let profile = &registry.profiles["MLB"];
        assert!(profile
            .correlations
            .iter()
            .all(|l| l.relation == TeamRelation::OpposingTeam));
    }

    #[test]
    fn builtin_nfl_profile_caps_parlays_and_requires_books() {
        let rules = ProfileRegistry::builtin().unwrap().resolve("NFL").unwrap();
        assert_eq!(rules.max_parlays, Some(10));
        assert_eq!(rules.min_books, 3);
        assert_eq!(rules.sportsbooks.len(), 15);
        assert!(rules.sportsbooks.iter().all(|b| *b == b.to_lowercase()));
    }

    #[test]
    fn unknown_sport_and_incomplete_profiles_are_config_errors() {
        let registry = ProfileRegistry::from_toml(
            r#"
            [NBA.market_synonyms]
            points = "player_points"

            [NHL.anchor]
            kind = "all_markets"
            min_ev = 0.02
            "#,
        )
        .unwrap();

        assert!(matches!(registry.resolve("WNBA"), Err(AppError::Config(_))));
        assert!(matches!(registry.resolve("NBA"), Err(AppError::Config(_))));
        assert!(matches!(registry.resolve("NHL"), Err(AppError::Config(_))));
    }

    #[test]
    fn out_of_range_values_fail_validation() {
        let strength = r#"
            [X]
            [[X.correlations]]
            anchor_market = "a"
            companion_market = "b"
            strength = 1.4
            relation = "any_team"
        "#;
        assert!(matches!(ProfileRegistry::from_toml(strength), Err(AppError::Config(_))));

        let multiplier = r#"
            [X]
            [[X.correlations]]
            anchor_market = "a"
            companion_market = "b"
            strength = 0.6
            relation = "same_team"
            joint_multiplier = 0.9
        "#;
        assert!(matches!(ProfileRegistry::from_toml(multiplier), Err(AppError::Config(_))));

        let empty_roles = r#"
            [X.anchor]
            kind = "role_markets"
            markets = []
            min_ev = 0.0
        "#;
        assert!(matches!(ProfileRegistry::from_toml(empty_roles), Err(AppError::Config(_))));

        assert!(matches!(
            ProfileRegistry::from_toml("[X]\nmin_books = 0\n"),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            ProfileRegistry::from_toml("[X]\nmax_parlays = 0\n"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn override_replaces_a_builtin_sport() {
        let mut registry = ProfileRegistry::builtin().unwrap();
        let other = ProfileRegistry::from_toml(
            r#"
            [mlb.anchor]
            kind = "all_markets"
            min_ev = 0.05

            [[mlb.correlations]]
            anchor_market = "hits"
            companion_market = "total_bases"
            strength = 0.8
            relation = "same_team"
            "#,
        )
        .unwrap();
        registry.profiles.extend(other.profiles);

        let rules = registry.resolve("MLB").unwrap();
        assert_eq!(rules.anchor, AnchorRule::AllMarkets { min_ev: 0.05 });
        assert_eq!(rules.correlations.len(), 1);
        assert!(registry.sports().contains(&"NFL".to_string()));
    }
}
