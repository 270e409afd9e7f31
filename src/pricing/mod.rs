pub mod devig;
pub mod ev_calculator;

pub use devig::DevigMethod;
pub use ev_calculator::{expected_value, score_bets};

use serde::Serialize;

/// Why a matched bet produced no scored bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// One of the two prices is missing.
    IncompleteMarket,
    /// A price is present but not a valid odds value.
    InvalidPrice,
    /// Raw implied probabilities sum below 1.
    Underround,
    /// The projection has no usable true probability.
    MissingTrueProbability,
    /// Fewer sportsbooks quote the prop than the sport requires.
    TooFewBooks,
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::IncompleteMarket => "incomplete_market",
            SkipReason::InvalidPrice => "invalid_price",
            SkipReason::Underround => "underround",
            SkipReason::MissingTrueProbability => "missing_true_probability",
            SkipReason::TooFewBooks => "too_few_books",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::IncompleteMarket => "incomplete market",
            SkipReason::InvalidPrice => "invalid price",
            SkipReason::Underround => "probabilities sum below 1",
            SkipReason::MissingTrueProbability => "no usable true probability",
            SkipReason::TooFewBooks => "quoted by too few books",
        };
        write!(f, "{s}")
    }
}
