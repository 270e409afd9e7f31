use chrono::{DateTime, Utc};
use tracing::info;

use crate::ingest::IngestOutcome;
use crate::matcher::{match_lines, MatchSettings};
use crate::parlay::{best_price_legs, build_parlays, select_anchors, GameLinks, ParlaySettings};
use crate::pricing::{score_bets, DevigMethod};
use crate::sport::SportRules;
use crate::types::{Parlay, RunStats, ScoredBet};

/// Stage settings shared by every sport in a run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub matching: MatchSettings,
    pub devig: DevigMethod,
    pub anchors_per_game: usize,
    pub parlay: ParlaySettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            matching: MatchSettings::default(),
            devig: DevigMethod::default(),
            anchors_per_game: 3,
            parlay: ParlaySettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub sport: String,
    pub run_at: DateTime<Utc>,
    pub scored: Vec<ScoredBet>,
    pub parlays: Vec<Parlay>,
    pub stats: RunStats,
}

/// Match, score, pick anchors and build parlays for one sport.
/// Empty results at any stage are a valid outcome.
pub fn run(input: IngestOutcome, rules: &SportRules, settings: &PipelineSettings) -> RunOutput {
    let run_at = Utc::now();
    let sport = rules.sport.clone();
    info!(
        sport = %sport,
        projections = input.projections.len(),
        odds = input.odds.len(),
        "[RUN] {sport} starting"
    );

    let matched = match_lines(&input.projections, &input.odds, &rules.synonyms, &settings.matching);
    let scored = score_bets(&matched.matched, settings.devig, rules.min_books);

    let anchors = select_anchors(&scored.scored, &rules.anchor, settings.anchors_per_game);
    let links = GameLinks::new(
        &settings.parlay.linked_games,
        rules.link_same_matchup_games,
        &best_price_legs(&scored.scored),
    );
    let parlay_settings = ParlaySettings {
        max_parlays: rules.max_parlays,
        ..settings.parlay.clone()
    };
    let built = build_parlays(
        &sport,
        &anchors,
        &scored.scored,
        &rules.correlations,
        &links,
        &parlay_settings,
    );

    let stats = RunStats {
        ingest: input.stats,
        matching: matched.stats,
        scoring: scored.stats,
        parlays: built.stats,
    };
    info!(
        sport = %sport,
        matched = stats.matching.matched,
        match_rate = stats.matching.match_rate(),
        scored = stats.scoring.scored,
        anchors = stats.parlays.anchors,
        parlays = stats.parlays.built,
        "[RUN] {sport} done: {} matched, {} scored, {} parlays",
        stats.matching.matched,
        stats.scoring.scored,
        stats.parlays.built,
    );

    RunOutput {
        sport,
        run_at,
        scored: scored.scored,
        parlays: built.parlays,
        stats,
    }
}
