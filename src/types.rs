use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Sides and prices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Over,
    Under,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Over, Side::Under];

    pub fn opposite(self) -> Side {
        match self {
            Side::Over => Side::Under,
            Side::Under => Side::Over,
        }
    }

    /// Parses "over"/"under" and the "o"/"u" shorthands some books use.
    pub fn parse(s: &str) -> Option<Side> {
        match s.trim().to_ascii_lowercase().as_str() {
            "over" | "o" | "yes" => Some(Side::Over),
            "under" | "u" | "no" => Some(Side::Under),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Over => write!(f, "over"),
            Side::Under => write!(f, "under"),
        }
    }
}

/// A sportsbook price for one side of a two-way market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "value", rename_all = "lowercase")]
pub enum Price {
    /// American odds: -110, +150. Valid when |value| >= 100.
    American(f64),
    /// Decimal odds: 1.91, 2.50. Valid when value > 1.0.
    Decimal(f64),
}

impl Price {
    /// Decimal odds (stake included), or None if the price is not a valid quote.
    pub fn decimal_odds(&self) -> Option<f64> {
        match *self {
            Price::American(v) if v.is_finite() && v >= 100.0 => Some(1.0 + v / 100.0),
            Price::American(v) if v.is_finite() && v <= -100.0 => Some(1.0 + 100.0 / v.abs()),
            Price::Decimal(v) if v.is_finite() && v > 1.0 => Some(v),
            _ => None,
        }
    }

    /// Raw implied probability (vig included).
    pub fn implied_probability(&self) -> Option<f64> {
        self.decimal_odds().map(|d| 1.0 / d)
    }

    /// Profit per unit stake if the side wins.
    pub fn net_payout(&self) -> Option<f64> {
        self.decimal_odds().map(|d| d - 1.0)
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Price::American(v) => write!(f, "{v:+.0}"),
            Price::Decimal(v) => write!(f, "{v:.2}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub name: String,
    pub team: Option<String>,
    pub sport: String,
}

/// One projected prop from the projection source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionRecord {
    pub player: PlayerIdentity,
    pub market: String,
    pub line: f64,
    /// Projection's estimated probability that the OVER hits.
    pub true_prob_over: Option<f64>,
    pub game_id: String,
    pub fetched_at: DateTime<Utc>,
}

impl ProjectionRecord {
    /// True probability for one side; the under is the complement of the over.
    pub fn true_probability(&self, side: Side) -> Option<f64> {
        let p = self.true_prob_over?;
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return None;
        }
        Some(match side {
            Side::Over => p,
            Side::Under => 1.0 - p,
        })
    }
}

/// One two-sided sportsbook line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsRecord {
    pub player: PlayerIdentity,
    pub market: String,
    pub line: f64,
    pub price_over: Option<Price>,
    pub price_under: Option<Price>,
    pub sportsbook: String,
    pub game_id: String,
    pub fetched_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Derived records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MatchedBet {
    pub projection: ProjectionRecord,
    pub odds: OddsRecord,
    pub canonical_player: String,
    pub canonical_market: String,
    /// Distinct sportsbooks quoting this prop at an agreeing line.
    pub books: usize,
}

/// Pricing of one side of a scored bet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SideQuote {
    pub price: Price,
    pub implied_prob: f64,
    pub no_vig_prob: f64,
    pub true_prob: f64,
    /// EV per unit stake at the offered price.
    pub ev: f64,
    /// EV per unit stake at the devigged fair price.
    pub no_vig_ev: f64,
}

#[derive(Debug, Clone)]
pub struct ScoredBet {
    pub bet: MatchedBet,
    pub over: SideQuote,
    pub under: SideQuote,
    /// Sum of raw implied probabilities (1.0 = no vig).
    pub overround: f64,
}

impl ScoredBet {
    pub fn quote(&self, side: Side) -> &SideQuote {
        match side {
            Side::Over => &self.over,
            Side::Under => &self.under,
        }
    }

    /// Best side by EV at the offered price.
    pub fn best_side(&self) -> Side {
        if self.under.ev > self.over.ev {
            Side::Under
        } else {
            Side::Over
        }
    }
}

/// One side of one scored bet, as used by anchors and parlays.
#[derive(Debug, Clone, Serialize)]
pub struct Leg {
    pub player: String,
    pub team: Option<String>,
    pub canonical_player: String,
    pub market: String,
    pub line: f64,
    pub side: Side,
    pub sportsbook: String,
    pub game_id: String,
    pub price: Price,
    pub true_prob: f64,
    pub no_vig_prob: f64,
    pub ev: f64,
    pub books: usize,
    /// Signed correlation with the anchor (None on the anchor itself).
    pub correlation: Option<f64>,
    pub link_logic: Option<String>,
}

impl Leg {
    pub fn from_scored(bet: &ScoredBet, side: Side) -> Self {
        let quote = bet.quote(side);
        Self {
            player: bet.bet.projection.player.name.clone(),
            team: bet.bet.projection.player.team.clone(),
            canonical_player: bet.bet.canonical_player.clone(),
            market: bet.bet.canonical_market.clone(),
            line: bet.bet.odds.line,
            side,
            sportsbook: bet.bet.odds.sportsbook.clone(),
            game_id: bet.bet.projection.game_id.clone(),
            price: quote.price,
            true_prob: quote.true_prob,
            no_vig_prob: quote.no_vig_prob,
            ev: quote.ev,
            books: bet.bet.books,
            correlation: None,
            link_logic: None,
        }
    }

    /// Identity of the prop side, independent of the book quoting it.
    pub fn prop_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.game_id, self.canonical_player, self.market, self.line, self.side
        )
    }

    pub fn same_player_market(&self, other: &Leg) -> bool {
        self.canonical_player == other.canonical_player && self.market == other.market
    }

    pub fn edge(&self) -> f64 {
        self.true_prob - self.no_vig_prob
    }

    /// Deterministic ordering used as the last tie-break everywhere.
    pub fn identity_cmp(&self, other: &Leg) -> std::cmp::Ordering {
        self.canonical_player
            .cmp(&other.canonical_player)
            .then_with(|| self.market.cmp(&other.market))
            .then_with(|| self.line.total_cmp(&other.line))
            .then_with(|| self.side.cmp(&other.side))
            .then_with(|| self.sportsbook.cmp(&other.sportsbook))
    }

    pub fn describe(&self) -> String {
        format!("{} {} {} {}", self.player, self.market, self.side, self.line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Excellent,
    Good,
    Fair,
    Speculative,
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QualityTier::Excellent => "excellent",
            QualityTier::Good => "good",
            QualityTier::Fair => "fair",
            QualityTier::Speculative => "speculative",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Parlay {
    pub sport: String,
    pub game_id: String,
    /// Anchor first, companions in selection order.
    pub legs: Vec<Leg>,
    pub independent_prob: f64,
    pub combined_prob: f64,
    pub combined_decimal_odds: f64,
    pub combined_ev: f64,
    pub avg_correlation: f64,
    pub quality: QualityTier,
    pub logic: String,
}

impl Parlay {
    pub fn anchor(&self) -> &Leg {
        &self.legs[0]
    }

    /// Order-independent identity of the leg set.
    pub fn leg_set_key(&self) -> String {
        leg_set_key(&self.legs)
    }
}

pub fn leg_set_key(legs: &[Leg]) -> String {
    let mut keys: Vec<String> = legs.iter().map(Leg::prop_key).collect();
    keys.sort();
    keys.join(";")
}

// ---------------------------------------------------------------------------
// Run statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    pub projection_rows: usize,
    pub odds_rows: usize,
    pub projections: usize,
    pub odds_records: usize,
    pub rejected_missing_name: usize,
    pub rejected_missing_team: usize,
    pub rejected_missing_market: usize,
    pub rejected_bad_line: usize,
    pub rejected_missing_side: usize,
    pub rejected_missing_book: usize,
    /// Odds rows from a book outside the sport's list.
    pub rejected_unlisted_book: usize,
    pub rejected_missing_game: usize,
    pub rejected_bad_timestamp: usize,
    /// Outcome rows superseded by a later row for the same side.
    pub superseded_outcome_rows: usize,
    /// Prices present but outside the usable range.
    pub unusable_prices: usize,
}

impl IngestStats {
    pub fn rejected(&self) -> usize {
        self.rejected_missing_name
            + self.rejected_missing_team
            + self.rejected_missing_market
            + self.rejected_bad_line
            + self.rejected_missing_side
            + self.rejected_missing_book
            + self.rejected_unlisted_book
            + self.rejected_missing_game
            + self.rejected_bad_timestamp
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchStats {
    pub projections_in: usize,
    pub odds_in: usize,
    pub matched: usize,
    pub unmatched_projections: usize,
    pub unmatched_odds: usize,
    pub duplicate_projections: usize,
    /// Projections with more than one candidate that had to be resolved.
    pub ambiguous_resolved: usize,
    pub initial_fallbacks: usize,
    /// Fallbacks refused because several projected names share the initial key.
    pub ambiguous_initials: usize,
    pub unknown_market_labels: usize,
}

impl MatchStats {
    /// Share of (deduplicated) projections that found an odds line.
    pub fn match_rate(&self) -> f64 {
        let considered = self.projections_in - self.duplicate_projections;
        if considered == 0 {
            return 0.0;
        }
        (considered - self.unmatched_projections) as f64 / considered as f64
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoreStats {
    pub scored: usize,
    pub skipped_incomplete_market: usize,
    pub skipped_invalid_price: usize,
    pub skipped_underround: usize,
    pub skipped_missing_true_prob: usize,
    pub skipped_too_few_books: usize,
    pub positive_ev_sides: usize,
}

impl ScoreStats {
    pub fn skipped(&self) -> usize {
        self.skipped_incomplete_market
            + self.skipped_invalid_price
            + self.skipped_underround
            + self.skipped_missing_true_prob
            + self.skipped_too_few_books
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParlayStats {
    pub anchors: usize,
    pub anchors_without_companions: usize,
    pub built: usize,
    pub duplicates_dropped: usize,
    /// Parlays cut by the sport's output cap.
    pub truncated: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub ingest: IngestStats,
    pub matching: MatchStats,
    pub scoring: ScoreStats,
    pub parlays: ParlayStats,
}
