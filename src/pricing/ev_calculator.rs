use tracing::{debug, info};

use crate::pricing::devig::{devig, DevigMethod};
use crate::pricing::SkipReason;
use crate::types::{MatchedBet, Price, ScoreStats, ScoredBet, Side, SideQuote};

/// EV per unit stake: win `net_payout` with `true_prob`, lose the stake otherwise.
pub fn expected_value(true_prob: f64, net_payout: f64) -> f64 {
    true_prob * net_payout - (1.0 - true_prob)
}

/// EV per unit stake at the fair (no-vig) price for the side.
/// Zero when the projection agrees with the devigged market.
pub fn fair_expected_value(true_prob: f64, no_vig_prob: f64) -> f64 {
    expected_value(true_prob, 1.0 / no_vig_prob - 1.0)
}

/// Score both sides of one matched bet.
pub fn score_bet(bet: &MatchedBet, method: DevigMethod) -> Result<ScoredBet, SkipReason> {
    let (Some(price_over), Some(price_under)) = (bet.odds.price_over, bet.odds.price_under) else {
        return Err(SkipReason::IncompleteMarket);
    };

    let (Some(implied_over), Some(implied_under)) =
        (price_over.implied_probability(), price_under.implied_probability())
    else {
        return Err(SkipReason::InvalidPrice);
    };

    let (novig_over, novig_under) = devig(method, implied_over, implied_under)?;

    let (Some(true_over), Some(true_under)) = (
        bet.projection.true_probability(Side::Over),
        bet.projection.true_probability(Side::Under),
    ) else {
        return Err(SkipReason::MissingTrueProbability);
    };

    let over = quote(price_over, implied_over, novig_over, true_over)?;
    let under = quote(price_under, implied_under, novig_under, true_under)?;

    Ok(ScoredBet {
        bet: bet.clone(),
        over,
        under,
        overround: implied_over + implied_under,
    })
}

fn quote(price: Price, implied_prob: f64, no_vig_prob: f64, true_prob: f64) -> Result<SideQuote, SkipReason> {
    let net_payout = price.net_payout().ok_or(SkipReason::InvalidPrice)?;
    Ok(SideQuote {
        price,
        implied_prob,
        no_vig_prob,
        true_prob,
        ev: expected_value(true_prob, net_payout),
        no_vig_ev: fair_expected_value(true_prob, no_vig_prob),
    })
}

#[derive(Debug, Default)]
pub struct ScoreOutcome {
    pub scored: Vec<ScoredBet>,
    pub stats: ScoreStats,
}

/// Score every matched bet, dropping the ones that cannot be priced or are
/// quoted by fewer than `min_books` sportsbooks. Negative-EV bets are kept.
pub fn score_bets(bets: &[MatchedBet], method: DevigMethod, min_books: usize) -> ScoreOutcome {
    let mut out = ScoreOutcome::default();

    for bet in bets {
        let result = if bet.books < min_books {
            Err(SkipReason::TooFewBooks)
        } else {
            score_bet(bet, method)
        };
        match result {
            Ok(scored) => {
                out.stats.positive_ev_sides +=
                    Side::BOTH.iter().filter(|s| scored.quote(**s).ev > 0.0).count();
                out.scored.push(scored);
            }
            Err(reason) => {
                debug!(
                    player = %bet.projection.player.name,
                    market = %bet.canonical_market,
                    line = bet.odds.line,
                    book = %bet.odds.sportsbook,
                    reason = reason.code(),
                    "[EV] skipped: {reason}"
                );
                let counter = match reason {
                    SkipReason::IncompleteMarket => &mut out.stats.skipped_incomplete_market,
                    SkipReason::InvalidPrice => &mut out.stats.skipped_invalid_price,
                    SkipReason::Underround => &mut out.stats.skipped_underround,
                    SkipReason::MissingTrueProbability => &mut out.stats.skipped_missing_true_prob,
                    SkipReason::TooFewBooks => &mut out.stats.skipped_too_few_books,
                };
                *counter += 1;
            }
        }
    }

    out.stats.scored = out.scored.len();
    info!(
        scored = out.stats.scored,
        positive_ev_sides = out.stats.positive_ev_sides,
        "[EV] scored {} of {} matched bets ({:?})",
        out.stats.scored,
        bets.len(),
        method,
    );
    if out.stats.skipped() > 0 {
        info!(
            "[EV] skipped: incomplete_market={} invalid_price={} underround={} missing_true_probability={} too_few_books={}",
            out.stats.skipped_incomplete_market,
            out.stats.skipped_invalid_price,
            out.stats.skipped_underround,
            out.stats.skipped_missing_true_prob,
            out.stats.skipped_too_few_books,
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OddsRecord, PlayerIdentity, ProjectionRecord};
    use chrono::Utc;

    fn matched(true_prob: Option<f64>, over: Option<Price>, under: Option<Price>) -> MatchedBet {
        let player = PlayerIdentity {
            name: "J. Smith".to_string(),
            team: Some("NYY".to_string()),
            sport: "MLB".to_string(),
        };
        MatchedBet {
            projection: ProjectionRecord {
                player: player.clone(),
                market: "Strikeouts".to_string(),
                line: 6.5,
                true_prob_over: true_prob,
                game_id: "G1".to_string(),
                fetched_at: Utc::now(),
            },
            odds: OddsRecord {
                player,
                market: "Ks".to_string(),
                line: 6.5,
                price_over: over,
                price_under: under,
                sportsbook: "fanduel".to_string(),
                game_id: "G1".to_string(),
                fetched_at: Utc::now(),
            },
            canonical_player: "j smith".to_string(),
            canonical_market: "pitcher_strikeouts".to_string(),
            books: 1,
        }
    }

    #[test]
    fn even_market_scores_like_the_worked_example() {
        let bet = matched(
            Some(0.58),
            Some(Price::American(-110.0)),
            Some(Price::American(-110.0)),
        );
        let scored = score_bet(&bet, DevigMethod::Multiplicative).unwrap();

        assert!((scored.over.no_vig_prob - 0.5).abs() < 1e-12);
        assert!((scored.under.no_vig_prob - 0.5).abs() < 1e-12);
        let expected = 0.58 * (100.0 / 110.0) - 0.42;
        assert!((scored.over.ev - expected).abs() < 1e-12);
        assert!((scored.over.ev - 0.107).abs() < 1e-3);
        // under carries the complement and is negative
        assert!((scored.under.true_prob - 0.42).abs() < 1e-12);
        assert!(scored.under.ev < 0.0);
        assert!((scored.overround - 220.0 / 210.0).abs() < 1e-12);
    }

    #[test]
    fn agreement_with_market_means_zero_fair_ev() {
        // -150 / +130: devigged over ~0.5798
        let bet = matched(None, Some(Price::American(-150.0)), Some(Price::American(130.0)));
        let implied_over = 150.0 / 250.0;
        let implied_under = 100.0 / 230.0;
        let (novig_over, _) = devig(DevigMethod::Multiplicative, implied_over, implied_under).unwrap();

        let mut at_market = bet.clone();
        at_market.projection.true_prob_over = Some(novig_over);
        let scored = score_bet(&at_market, DevigMethod::Multiplicative).unwrap();
        assert!(scored.over.no_vig_ev.abs() < 1e-12);
        assert!(scored.under.no_vig_ev.abs() < 1e-12);
        assert!((scored.over.true_prob - scored.over.no_vig_prob).abs() < 1e-12);
        // the offered price still carries the vig
        assert!(scored.over.ev < 0.0);
    }

    #[test]
    fn missing_over_price_is_an_incomplete_market() {
        let bet = matched(Some(0.58), None, Some(Price::American(-110.0)));
        assert_eq!(
            score_bet(&bet, DevigMethod::Multiplicative).unwrap_err(),
            SkipReason::IncompleteMarket
        );

        let out = score_bets(&[bet], DevigMethod::Multiplicative, 1);
        assert!(out.scored.is_empty());
        assert_eq!(out.stats.skipped_incomplete_market, 1);
    }

    #[test]
    fn skip_reasons_are_counted_separately() {
        let bets = vec![
            matched(Some(0.6), Some(Price::American(-50.0)), Some(Price::American(-110.0))),
            matched(Some(0.6), Some(Price::American(120.0)), Some(Price::American(120.0))),
            matched(None, Some(Price::American(-110.0)), Some(Price::American(-110.0))),
            matched(Some(1.4), Some(Price::American(-110.0)), Some(Price::American(-110.0))),
            matched(Some(0.45), Some(Price::Decimal(1.91)), Some(Price::Decimal(1.91))),
        ];
        let out = score_bets(&bets, DevigMethod::Multiplicative, 1);

        assert_eq!(out.stats.skipped_invalid_price, 1);
        assert_eq!(out.stats.skipped_underround, 1);
        assert_eq!(out.stats.skipped_missing_true_prob, 2);
        assert_eq!(out.stats.scored, 1);
        // negative EV on the over is kept, the under is positive
        assert!(out.scored[0].over.ev < 0.0);
        assert_eq!(out.stats.positive_ev_sides, 1);
        assert_eq!(out.scored[0].best_side(), Side::Under);
    }

    #[test]
    fn props_below_the_book_minimum_are_skipped() {
        let price = Some(Price::American(-110.0));
        let mut wide = matched(Some(0.58), price, price);
        wide.books = 3;
        let thin = matched(Some(0.58), price, price);

        let out = score_bets(&[wide, thin], DevigMethod::Multiplicative, 3);
        assert_eq!(out.stats.scored, 1);
        assert_eq!(out.scored[0].bet.books, 3);
        assert_eq!(out.stats.skipped_too_few_books, 1);
        assert_eq!(out.stats.skipped(), 1);
    }

    #[test]
    fn expected_value_formula() {
        assert!((expected_value(0.5, 1.0)).abs() < 1e-12);
        assert!((expected_value(0.6, 1.5) - 0.5).abs() < 1e-12);
        assert!((expected_value(0.25, 2.0) + 0.25).abs() < 1e-12);
    }
}
